//! Cutline Media Cache
//!
//! Everything between a project's asset references and decoded buffers:
//! - **Decoder:** The async decode/probe collaborator contract
//! - **Cache:** Asset registry, LRU of decoded frames, derived metadata
//! - **In-flight:** At most one running job per request, shared by all callers
//! - **Backends:** `ffmpeg`/`ffprobe` subprocesses and a deterministic synthetic decoder

pub mod cache;
pub mod decoder;
pub mod ffmpeg;
pub mod inflight;
pub mod synthetic;

pub use cache::{CacheStats, FrameKey, MediaAssetCache, MetadataRequest, DEFAULT_SOURCE_FPS};
pub use decoder::{thumbnail_times, waveform_from_audio, MediaDecoder, ProbeInfo};
pub use ffmpeg::{command_exists, FfmpegDecoder};
pub use inflight::{InFlight, JobOwner};
pub use synthetic::{pattern_color, pattern_frame, SyntheticDecoder, SyntheticRequest};
