//! Decoded pixel and audio buffers.

/// An RGBA8 image, row-major, `width × height × 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Errors constructing a frame from raw bytes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("buffer of {actual} bytes does not match {width}x{height} RGBA ({expected} bytes)")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

impl FrameBuffer {
    /// Fully transparent black frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Frame filled with one RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Bilinear resize to `width × height`.
    pub fn resize(&self, width: u32, height: u32) -> FrameBuffer {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if self.is_empty() || width == 0 || height == 0 {
            return FrameBuffer::blank(width, height);
        }

        let mut out = FrameBuffer::blank(width, height);
        let sx = self.width as f64 / width as f64;
        let sy = self.height as f64 / height as f64;
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;

        for y in 0..height {
            let fy = ((y as f64 + 0.5) * sy - 0.5).clamp(0.0, max_y);
            let y0 = fy.floor() as u32;
            let y1 = (y0 + 1).min(self.height - 1);
            let wy = fy - y0 as f64;
            for x in 0..width {
                let fx = ((x as f64 + 0.5) * sx - 0.5).clamp(0.0, max_x);
                let x0 = fx.floor() as u32;
                let x1 = (x0 + 1).min(self.width - 1);
                let wx = fx - x0 as f64;

                let p00 = self.pixel(x0, y0);
                let p10 = self.pixel(x1, y0);
                let p01 = self.pixel(x0, y1);
                let p11 = self.pixel(x1, y1);
                let mut px = [0u8; 4];
                for c in 0..4 {
                    let top = p00[c] as f64 * (1.0 - wx) + p10[c] as f64 * wx;
                    let bottom = p01[c] as f64 * (1.0 - wx) + p11[c] as f64 * wx;
                    px[c] = (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8;
                }
                out.set_pixel(x, y, px);
            }
        }
        out
    }

    /// Scale to fit inside a `width × height` canvas preserving aspect ratio,
    /// centered on a transparent background.
    pub fn fit_into(&self, width: u32, height: u32) -> FrameBuffer {
        if self.width == width && self.height == height {
            return self.clone();
        }
        let rect = fit_rect(self.width, self.height, width, height);
        let mut canvas = FrameBuffer::blank(width, height);
        if rect.width == 0 || rect.height == 0 {
            return canvas;
        }
        let scaled = self.resize(rect.width, rect.height);
        canvas.blit_over(&scaled, rect.x as i64, rect.y as i64, 1.0);
        canvas
    }

    /// Alpha-composite `src` over this frame at `(x, y)` with extra opacity.
    ///
    /// The destination alpha is combined with the usual "over" rule.
    pub fn blit_over(&mut self, src: &FrameBuffer, x: i64, y: i64, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity <= 0.0 {
            return;
        }
        for sy in 0..src.height as i64 {
            let dy = y + sy;
            if dy < 0 || dy >= self.height as i64 {
                continue;
            }
            for sx in 0..src.width as i64 {
                let dx = x + sx;
                if dx < 0 || dx >= self.width as i64 {
                    continue;
                }
                let s = src.pixel(sx as u32, sy as u32);
                let sa = s[3] as f32 / 255.0 * opacity;
                if sa <= 0.0 {
                    continue;
                }
                let d = self.pixel(dx as u32, dy as u32);
                let da = d[3] as f32 / 255.0;
                let out_a = sa + da * (1.0 - sa);
                let mut px = [0u8; 4];
                for c in 0..3 {
                    let v = if out_a > 0.0 {
                        (s[c] as f32 * sa + d[c] as f32 * da * (1.0 - sa)) / out_a
                    } else {
                        0.0
                    };
                    px[c] = v.round().clamp(0.0, 255.0) as u8;
                }
                px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
                self.set_pixel(dx as u32, dy as u32, px);
            }
        }
    }
}

/// Placement of a scaled image inside a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest aspect-preserving rectangle of `src` that fits inside `dst`, centered.
pub fn fit_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> FitRect {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return FitRect {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        };
    }
    let scale = (dst_w as f64 / src_w as f64).min(dst_h as f64 / src_h as f64);
    let width = ((src_w as f64 * scale).round() as u32).clamp(1, dst_w);
    let height = ((src_h as f64 * scale).round() as u32).clamp(1, dst_h);
    FitRect {
        x: (dst_w - width) / 2,
        y: (dst_h - height) / 2,
        width,
        height,
    }
}

/// Interleaved `f32` PCM samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn silence(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self {
            sample_rate,
            channels,
            samples: vec![0.0; frames * channels as usize],
        }
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    /// Sample for `channel` at `frame`, mapping missing channels onto the last one.
    pub fn sample(&self, frame: usize, channel: u16) -> f32 {
        if self.channels == 0 {
            return 0.0;
        }
        let ch = channel.min(self.channels - 1) as usize;
        self.samples
            .get(frame * self.channels as usize + ch)
            .copied()
            .unwrap_or(0.0)
    }

    /// Clamp every sample into [-1, 1].
    pub fn clamp_peaks(&mut self) {
        for s in &mut self.samples {
            *s = s.clamp(-1.0, 1.0);
        }
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_checks_size() {
        assert!(FrameBuffer::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(FrameBuffer::from_rgba(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_resize_solid_stays_solid() {
        let frame = FrameBuffer::solid(4, 4, [10, 20, 30, 255]);
        let resized = frame.resize(7, 3);
        assert_eq!(resized.width(), 7);
        assert!(resized
            .data()
            .chunks(4)
            .all(|p| p == [10, 20, 30, 255]));
    }

    #[test]
    fn test_fit_rect_letterboxes() {
        let rect = fit_rect(1920, 1080, 100, 100);
        assert_eq!(rect.width, 100);
        assert_eq!(rect.height, 56);
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 22);
    }

    #[test]
    fn test_fit_into_leaves_bars_transparent() {
        let frame = FrameBuffer::solid(20, 10, [255, 0, 0, 255]);
        let fitted = frame.fit_into(10, 10);
        assert_eq!(fitted.pixel(5, 0), [0, 0, 0, 0]);
        assert_eq!(fitted.pixel(5, 5), [255, 0, 0, 255]);
    }

    #[test]
    fn test_blit_over_with_opacity() {
        let mut dst = FrameBuffer::solid(2, 2, [0, 0, 0, 255]);
        let src = FrameBuffer::solid(2, 2, [200, 100, 50, 255]);
        dst.blit_over(&src, 0, 0, 0.5);
        assert_eq!(dst.pixel(0, 0), [100, 50, 25, 255]);

        let mut untouched = FrameBuffer::solid(2, 2, [1, 2, 3, 255]);
        untouched.blit_over(&src, 0, 0, 0.0);
        assert_eq!(untouched.pixel(1, 1), [1, 2, 3, 255]);
    }

    #[test]
    fn test_audio_frames_and_duration() {
        let buf = AudioBuffer::silence(48_000, 2, 24_000);
        assert_eq!(buf.frames(), 24_000);
        assert!((buf.duration_secs() - 0.5).abs() < 1e-9);
        assert_eq!(buf.sample(10, 5), 0.0);
    }
}
