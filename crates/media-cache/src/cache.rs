//! The media asset cache.
//!
//! Holds the asset registry (metadata as it becomes known), an LRU of
//! decoded frames, and one [`InFlight`] table per request kind. Every map is
//! behind a `std::sync::Mutex` that is only held for map operations, never
//! across an `.await`.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use cutline_common::{CacheConfig, CutlineError, CutlineResult, FrameClock};
use cutline_project_model::{
    AssetId, AssetKind, AudioBuffer, FrameBuffer, MediaAssetMeta, Project, Thumbnail,
};
use lru::LruCache;

use crate::decoder::{MediaDecoder, ProbeInfo};
use crate::inflight::{InFlight, JobOwner, JobResult};

/// Frame rate assumed for sources that do not report one.
pub const DEFAULT_SOURCE_FPS: f64 = 30.0;

/// Decoded frames are keyed by source frame index, not raw time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub asset_id: AssetId,
    pub frame: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AudioKey {
    asset_id: AssetId,
    start_ms: u64,
    duration_ms: u64,
    sample_rate: u32,
}

/// Derived-metadata requests that are not retried after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataRequest {
    Thumbnails,
    Probe,
    Waveform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_frames: usize,
    pub frame_slots: usize,
    pub in_flight: usize,
    pub failures: usize,
}

type Registry = Arc<Mutex<HashMap<AssetId, MediaAssetMeta>>>;
type FrameLru = Arc<Mutex<LruCache<FrameKey, Arc<FrameBuffer>>>>;
type Failures = Arc<Mutex<HashSet<(AssetId, MetadataRequest)>>>;

/// Shared cache between the renderer, the exporter, and UI requests.
pub struct MediaAssetCache {
    decoder: Arc<dyn MediaDecoder>,
    assets: Registry,
    frames: FrameLru,
    failures: Failures,
    frame_slots: usize,
    frame_jobs: InFlight<FrameKey, Arc<FrameBuffer>>,
    audio_jobs: InFlight<AudioKey, Arc<AudioBuffer>>,
    thumbnail_jobs: InFlight<AssetId, Option<Vec<Thumbnail>>>,
    probe_jobs: InFlight<AssetId, Option<(u32, u32)>>,
    waveform_jobs: InFlight<AssetId, Option<Vec<f32>>>,
}

impl std::fmt::Debug for MediaAssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAssetCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl MediaAssetCache {
    pub fn new(decoder: Arc<dyn MediaDecoder>, config: &CacheConfig) -> Self {
        Self::with_capacity(decoder, config.frame_slots)
    }

    /// Cache with `frame_slots` decoded frames (at least one).
    pub fn with_capacity(decoder: Arc<dyn MediaDecoder>, frame_slots: usize) -> Self {
        let slots = NonZeroUsize::new(frame_slots).unwrap_or(NonZeroUsize::MIN);
        Self {
            decoder,
            assets: Arc::new(Mutex::new(HashMap::new())),
            frames: Arc::new(Mutex::new(LruCache::new(slots))),
            failures: Arc::new(Mutex::new(HashSet::new())),
            frame_slots: slots.get(),
            frame_jobs: InFlight::new(),
            audio_jobs: InFlight::new(),
            thumbnail_jobs: InFlight::new(),
            probe_jobs: InFlight::new(),
            waveform_jobs: InFlight::new(),
        }
    }

    pub fn decoder(&self) -> Arc<dyn MediaDecoder> {
        Arc::clone(&self.decoder)
    }

    /// Add or replace an asset's metadata.
    pub fn register_asset(&self, asset: MediaAssetMeta) {
        lock(&self.assets).insert(asset.id.clone(), asset);
    }

    /// Register every asset of a project, keeping metadata this cache has
    /// already derived for assets it knows.
    pub fn register_project(&self, project: &Project) {
        let mut assets = lock(&self.assets);
        for (id, incoming) in &project.media_assets {
            match assets.get_mut(id) {
                Some(known) if known.url == incoming.url => merge_missing(known, incoming),
                _ => {
                    assets.insert(id.clone(), incoming.clone());
                }
            }
        }
    }

    pub fn asset_meta(&self, asset_id: &str) -> Option<MediaAssetMeta> {
        lock(&self.assets).get(asset_id).cloned()
    }

    /// Apply `update` to an asset's metadata as one atomic read-modify-write.
    pub fn update_asset<F>(&self, asset_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut MediaAssetMeta),
    {
        update_registry(&self.assets, asset_id, update)
    }

    /// Frame already in the cache, without decoding.
    pub fn cached_frame(&self, asset_id: &str, time: f64) -> Option<Arc<FrameBuffer>> {
        let asset = self.asset_meta(asset_id)?;
        let key = frame_key(&asset, time);
        lock(&self.frames).get(&key).cloned()
    }

    /// Decoded frame of `asset_id` at source `time`.
    ///
    /// Frames are returned as `Arc`, so an evicted frame stays valid for
    /// anyone still holding it.
    pub async fn resolve_frame(&self, asset_id: &str, time: f64) -> CutlineResult<Arc<FrameBuffer>> {
        self.resolve_frame_for(JobOwner::SHARED, asset_id, time).await
    }

    /// [`resolve_frame`](Self::resolve_frame) on behalf of `owner`, whose
    /// decodes [`cancel_owned`](Self::cancel_owned) can abort.
    pub async fn resolve_frame_for(
        &self,
        owner: JobOwner,
        asset_id: &str,
        time: f64,
    ) -> CutlineResult<Arc<FrameBuffer>> {
        let asset = self.require(asset_id)?;
        if !asset.has_video() {
            return Err(CutlineError::decode(format!("asset {asset_id} has no video")));
        }
        let key = frame_key(&asset, time);
        if let Some(frame) = lock(&self.frames).get(&key).cloned() {
            return Ok(frame);
        }

        let decoder = Arc::clone(&self.decoder);
        let frames = Arc::clone(&self.frames);
        let job_key = key.clone();
        let source_time = frame_time(&asset, key.frame);
        let job = self.frame_jobs.join_or_start(key, owner, move || async move {
            let frame = Arc::new(decoder.decode_frame(&asset, source_time).await?);
            lock(&frames).put(job_key, Arc::clone(&frame));
            Ok(frame)
        });
        unshare(job.await)
    }

    /// Decode a span of audio, de-duplicated but not cached.
    pub async fn resolve_audio(
        &self,
        asset_id: &str,
        start: f64,
        duration: f64,
        sample_rate: u32,
    ) -> CutlineResult<Arc<AudioBuffer>> {
        self.resolve_audio_for(JobOwner::SHARED, asset_id, start, duration, sample_rate)
            .await
    }

    /// [`resolve_audio`](Self::resolve_audio) on behalf of `owner`.
    pub async fn resolve_audio_for(
        &self,
        owner: JobOwner,
        asset_id: &str,
        start: f64,
        duration: f64,
        sample_rate: u32,
    ) -> CutlineResult<Arc<AudioBuffer>> {
        let asset = self.require(asset_id)?;
        if !asset.has_audio() {
            return Err(CutlineError::decode(format!("asset {asset_id} has no audio")));
        }
        let key = AudioKey {
            asset_id: asset.id.clone(),
            start_ms: (start.max(0.0) * 1000.0).round() as u64,
            duration_ms: (duration.max(0.0) * 1000.0).round() as u64,
            sample_rate,
        };
        let decoder = Arc::clone(&self.decoder);
        let job = self.audio_jobs.join_or_start(key, owner, move || async move {
            let audio = decoder.decode_audio(&asset, start, duration, sample_rate).await?;
            Ok(Arc::new(audio))
        });
        unshare(job.await)
    }

    /// Make sure the asset has at least `count` thumbnails.
    ///
    /// Returns `None` when generation failed now or earlier; the asset's
    /// thumbnail field is left absent and the request is not retried until
    /// [`clear_failures`](Self::clear_failures).
    pub async fn ensure_thumbnails(
        &self,
        asset_id: &str,
        count: usize,
    ) -> CutlineResult<Option<Vec<Thumbnail>>> {
        let asset = self.require(asset_id)?;
        if let Some(existing) = asset.thumbnails.as_ref().filter(|t| t.len() >= count) {
            return Ok(Some(existing.clone()));
        }
        if self.has_failed(asset_id, MetadataRequest::Thumbnails) {
            return Ok(None);
        }

        let decoder = Arc::clone(&self.decoder);
        let assets = Arc::clone(&self.assets);
        let failures = Arc::clone(&self.failures);
        let job = self
            .thumbnail_jobs
            .join_or_start(asset.id.clone(), JobOwner::SHARED, move || async move {
            match decoder.thumbnails(&asset, count).await {
                Ok(thumbs) => {
                    update_registry(&assets, &asset.id, |meta| {
                        meta.thumbnails = Some(thumbs.clone());
                    });
                    Ok(Some(thumbs))
                }
                Err(e) => {
                    tracing::warn!(asset_id = %asset.id, error = %e, "Thumbnail generation failed");
                    lock(&failures).insert((asset.id.clone(), MetadataRequest::Thumbnails));
                    Ok(None)
                }
            }
        });
        unshare(job.await)
    }

    /// Probe width and height unless both are already known and non-zero.
    ///
    /// A successful probe also fills in missing fps, sample rate, and a
    /// non-positive duration. Failures return `None` and are not retried.
    pub async fn probe_dimensions(&self, asset_id: &str) -> CutlineResult<Option<(u32, u32)>> {
        let asset = self.require(asset_id)?;
        if asset.has_known_dimensions() {
            return Ok(asset.width.zip(asset.height));
        }
        if asset.kind == AssetKind::Audio {
            return Ok(None);
        }
        if self.has_failed(asset_id, MetadataRequest::Probe) {
            return Ok(None);
        }

        let decoder = Arc::clone(&self.decoder);
        let assets = Arc::clone(&self.assets);
        let failures = Arc::clone(&self.failures);
        let job = self
            .probe_jobs
            .join_or_start(asset.id.clone(), JobOwner::SHARED, move || async move {
            let outcome = decoder.probe(&asset).await.and_then(|info| {
                match (info.width, info.height) {
                    (Some(w), Some(h)) if w > 0 && h > 0 => Ok((info, w, h)),
                    _ => Err(CutlineError::probe("source reports no video dimensions")),
                }
            });
            match outcome {
                Ok((info, w, h)) => {
                    update_registry(&assets, &asset.id, |meta| apply_probe(meta, &info, w, h));
                    tracing::debug!(asset_id = %asset.id, width = w, height = h, "Probed dimensions");
                    Ok(Some((w, h)))
                }
                Err(e) => {
                    tracing::warn!(asset_id = %asset.id, error = %e, "Dimension probe failed");
                    lock(&failures).insert((asset.id.clone(), MetadataRequest::Probe));
                    Ok(None)
                }
            }
        });
        unshare(job.await)
    }

    /// Make sure an audio-bearing asset has a waveform of `buckets` peaks.
    pub async fn ensure_waveform(
        &self,
        asset_id: &str,
        buckets: usize,
    ) -> CutlineResult<Option<Vec<f32>>> {
        let asset = self.require(asset_id)?;
        if let Some(existing) = asset.waveform.as_ref().filter(|w| w.len() == buckets) {
            return Ok(Some(existing.clone()));
        }
        if !asset.has_audio() || self.has_failed(asset_id, MetadataRequest::Waveform) {
            return Ok(None);
        }

        let decoder = Arc::clone(&self.decoder);
        let assets = Arc::clone(&self.assets);
        let failures = Arc::clone(&self.failures);
        let job = self
            .waveform_jobs
            .join_or_start(asset.id.clone(), JobOwner::SHARED, move || async move {
            match decoder.waveform(&asset, buckets).await {
                Ok(wave) => {
                    update_registry(&assets, &asset.id, |meta| meta.waveform = Some(wave.clone()));
                    Ok(Some(wave))
                }
                Err(e) => {
                    tracing::warn!(asset_id = %asset.id, error = %e, "Waveform extraction failed");
                    lock(&failures).insert((asset.id.clone(), MetadataRequest::Waveform));
                    Ok(None)
                }
            }
        });
        unshare(job.await)
    }

    pub fn has_failed(&self, asset_id: &str, request: MetadataRequest) -> bool {
        lock(&self.failures).contains(&(asset_id.to_string(), request))
    }

    /// Forget recorded thumbnail/probe/waveform failures so they can be retried.
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Abort every running job. Returns how many were aborted.
    pub fn cancel_in_flight(&self) -> usize {
        let aborted = self.frame_jobs.cancel_all()
            + self.audio_jobs.cancel_all()
            + self.thumbnail_jobs.cancel_all()
            + self.probe_jobs.cancel_all()
            + self.waveform_jobs.cancel_all();
        if aborted > 0 {
            tracing::debug!(aborted, "Cancelled in-flight media jobs");
        }
        aborted
    }

    /// Abort the frame and audio decodes only `owner` is waiting for.
    /// Jobs another owner joined keep running.
    pub fn cancel_owned(&self, owner: JobOwner) -> usize {
        let aborted = self.frame_jobs.cancel_owner(owner) + self.audio_jobs.cancel_owner(owner);
        if aborted > 0 {
            tracing::debug!(?owner, aborted, "Cancelled owned media jobs");
        }
        aborted
    }

    /// Drop every decoded frame. Frames held elsewhere stay valid.
    pub fn clear_frames(&self) {
        lock(&self.frames).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_frames: lock(&self.frames).len(),
            frame_slots: self.frame_slots,
            in_flight: self.frame_jobs.len()
                + self.audio_jobs.len()
                + self.thumbnail_jobs.len()
                + self.probe_jobs.len()
                + self.waveform_jobs.len(),
            failures: lock(&self.failures).len(),
        }
    }

    fn require(&self, asset_id: &str) -> CutlineResult<MediaAssetMeta> {
        self.asset_meta(asset_id)
            .ok_or_else(|| CutlineError::decode(format!("asset {asset_id} is not registered")))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn update_registry<F>(assets: &Mutex<HashMap<AssetId, MediaAssetMeta>>, asset_id: &str, update: F) -> bool
where
    F: FnOnce(&mut MediaAssetMeta),
{
    match lock(assets).get_mut(asset_id) {
        Some(meta) => {
            update(meta);
            true
        }
        None => false,
    }
}

fn unshare<T>(result: JobResult<T>) -> CutlineResult<T> {
    result.map_err(|e| match &*e {
        CutlineError::Decode { message } => CutlineError::decode(message.clone()),
        CutlineError::Probe { message } => CutlineError::probe(message.clone()),
        other => CutlineError::decode(other.to_string()),
    })
}

fn source_clock(asset: &MediaAssetMeta) -> FrameClock {
    FrameClock::new(asset.fps.unwrap_or(DEFAULT_SOURCE_FPS))
}

fn frame_key(asset: &MediaAssetMeta, time: f64) -> FrameKey {
    let frame = if asset.kind == AssetKind::Image {
        0
    } else {
        let clamped = time.clamp(0.0, asset.duration.max(0.0));
        source_clock(asset).frame_at(clamped)
    };
    FrameKey {
        asset_id: asset.id.clone(),
        frame,
    }
}

fn frame_time(asset: &MediaAssetMeta, frame: u64) -> f64 {
    if asset.kind == AssetKind::Image {
        0.0
    } else {
        source_clock(asset).time_of(frame)
    }
}

fn apply_probe(meta: &mut MediaAssetMeta, info: &ProbeInfo, width: u32, height: u32) {
    meta.width = Some(width);
    meta.height = Some(height);
    if meta.fps.is_none() {
        meta.fps = info.fps;
    }
    if meta.sample_rate.is_none() {
        meta.sample_rate = info.sample_rate;
    }
    if meta.duration <= 0.0 {
        if let Some(duration) = info.duration.filter(|d| *d > 0.0) {
            meta.duration = duration;
        }
    }
}

/// Fill fields the cache has not derived yet from a project's copy.
fn merge_missing(known: &mut MediaAssetMeta, incoming: &MediaAssetMeta) {
    known.name = incoming.name.clone();
    if !known.has_known_dimensions() && incoming.has_known_dimensions() {
        known.width = incoming.width;
        known.height = incoming.height;
    }
    known.fps = known.fps.or(incoming.fps);
    known.sample_rate = known.sample_rate.or(incoming.sample_rate);
    if known.thumbnails.is_none() {
        known.thumbnails = incoming.thumbnails.clone();
    }
    if known.waveform.is_none() {
        known.waveform = incoming.waveform.clone();
    }
    if known.beat_markers.is_none() {
        known.beat_markers = incoming.beat_markers.clone();
    }
    known.bpm = known.bpm.or(incoming.bpm);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_keys_quantize_to_source_frames() {
        let mut asset = MediaAssetMeta::new("v", AssetKind::Video, "v.mp4", 10.0).with_id("v");
        asset.fps = Some(25.0);
        assert_eq!(frame_key(&asset, 1.0).frame, 25);
        assert_eq!(frame_key(&asset, 1.039).frame, 25);
        assert_eq!(frame_key(&asset, 1.04).frame, 26);
        assert_eq!(frame_key(&asset, 99.0).frame, 250);
        assert_eq!(frame_key(&asset, -3.0).frame, 0);
        assert!((frame_time(&asset, 26) - 1.04).abs() < 1e-12);

        let still = MediaAssetMeta::new("s", AssetKind::Image, "s.png", 0.0).with_id("s");
        assert_eq!(frame_key(&still, 42.0).frame, 0);
    }

    #[test]
    fn test_probe_fills_only_missing_fields() {
        let mut meta = MediaAssetMeta::new("v", AssetKind::Video, "v.mp4", 0.0).with_id("v");
        meta.fps = Some(24.0);
        let info = ProbeInfo {
            duration: Some(12.5),
            width: Some(640),
            height: Some(360),
            fps: Some(30.0),
            sample_rate: Some(44_100),
        };
        apply_probe(&mut meta, &info, 640, 360);
        assert_eq!(meta.width, Some(640));
        assert_eq!(meta.fps, Some(24.0));
        assert_eq!(meta.sample_rate, Some(44_100));
        assert_eq!(meta.duration, 12.5);
    }
}
