//! Random patch placement: rotation/scale/translation sampling and warping.
//!
//! A [`PatchTransform`] maps patch coordinates into image coordinates:
//! rotate about the center, scale, then shift. Warping goes the other way
//! (inverse affine mapping with bilinear sampling) so every output pixel is
//! defined, with zero fill outside the source. [`PatchTransform::inverse`]
//! gives the exact inverse placement, used to pull pixel gradients from
//! image coordinates back onto the patch canvas.

use ndarray::Array3;
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::PatchConfig;

/// A sampled rigid placement of the patch inside an image frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchTransform {
    /// Rotation about the patch center, in degrees.
    pub rotation: f32,
    /// Uniform scale factor.
    pub scale: f32,
    /// Horizontal shift of the patch center from the image center, in pixels.
    pub shift_x: f32,
    /// Vertical shift of the patch center from the image center, in pixels.
    pub shift_y: f32,
}

impl PatchTransform {
    /// The identity placement: centered, unrotated, unscaled.
    pub fn identity() -> Self {
        Self {
            rotation: 0.0,
            scale: 1.0,
            shift_x: 0.0,
            shift_y: 0.0,
        }
    }

    /// Sample a random placement for a `patch_side`-sized patch inside an
    /// (height, width) frame.
    ///
    /// Rotation is uniform in `[-rotation_max, rotation_max]`, scale uniform
    /// in `[scale_min, scale_max]`, and the shift is uniform over offsets
    /// that keep the scaled patch disc fully inside the frame.
    pub fn sample(
        config: &PatchConfig,
        frame: (usize, usize),
        patch_side: usize,
        rng: &mut StdRng,
    ) -> Self {
        let rotation = if config.rotation_max > 0.0 {
            rng.random_range(-config.rotation_max..=config.rotation_max)
        } else {
            0.0
        };
        let scale = rng.random_range(config.scale_min..=config.scale_max);

        // The patch disc has radius patch_side/2 before scaling; the center
        // may wander as long as the scaled disc stays inside the frame.
        let (span_y, span_x) = shift_spans(scale, frame, patch_side);
        let shift_x = if span_x > 0.0 {
            rng.random_range(-span_x..=span_x)
        } else {
            0.0
        };
        let shift_y = if span_y > 0.0 {
            rng.random_range(-span_y..=span_y)
        } else {
            0.0
        };

        Self {
            rotation,
            scale,
            shift_x,
            shift_y,
        }
    }

    /// Re-fit the shift so the scaled disc stays inside the frame.
    ///
    /// Needed when the scale is overridden after sampling: the sampled
    /// shift was drawn for the original radius and a larger disc could
    /// otherwise poke out of the frame.
    pub fn clamp_shift(&mut self, frame: (usize, usize), patch_side: usize) {
        let (span_y, span_x) = shift_spans(self.scale, frame, patch_side);
        self.shift_x = self.shift_x.clamp(-span_x, span_x);
        self.shift_y = self.shift_y.clamp(-span_y, span_y);
    }

    /// The exact inverse placement: `t.inverse().warp(t.warp(x))` restores
    /// interior pixels of `x` up to resampling error.
    pub fn inverse(&self) -> Self {
        let theta = self.rotation.to_radians();
        let (sin, cos) = theta.sin_cos();
        let s = self.scale;
        Self {
            rotation: -self.rotation,
            scale: 1.0 / s,
            // -R(-theta) * t / s
            shift_x: -(cos * self.shift_x + sin * self.shift_y) / s,
            shift_y: -(-sin * self.shift_x + cos * self.shift_y) / s,
        }
    }

    /// Warp `src` into an (out_h, out_w) frame under this placement.
    ///
    /// Each output pixel is mapped back into source coordinates (inverse
    /// rotation, inverse scale, both about the respective centers) and
    /// bilinearly sampled; positions outside the source read as zero.
    pub fn warp(&self, src: &Array3<f32>, out_h: usize, out_w: usize) -> Array3<f32> {
        let (src_h, src_w, channels) = src.dim();
        let theta = self.rotation.to_radians();
        let (sin, cos) = theta.sin_cos();
        let inv_scale = 1.0 / self.scale;

        let out_cx = (out_w as f32 - 1.0) / 2.0;
        let out_cy = (out_h as f32 - 1.0) / 2.0;
        let src_cx = (src_w as f32 - 1.0) / 2.0;
        let src_cy = (src_h as f32 - 1.0) / 2.0;

        let mut out = Array3::zeros((out_h, out_w, channels));
        for y in 0..out_h {
            for x in 0..out_w {
                let dx = x as f32 - out_cx - self.shift_x;
                let dy = y as f32 - out_cy - self.shift_y;
                // R(-theta) then unscale, back into source-centered coords.
                let sx = (cos * dx + sin * dy) * inv_scale + src_cx;
                let sy = (-sin * dx + cos * dy) * inv_scale + src_cy;
                for ch in 0..channels {
                    out[[y, x, ch]] = sample_bilinear(src, sy, sx, ch);
                }
            }
        }
        out
    }
}

/// Largest (vertical, horizontal) center offsets keeping the scaled disc
/// inside an (height, width) frame.
fn shift_spans(scale: f32, frame: (usize, usize), patch_side: usize) -> (f32, f32) {
    let radius = scale * patch_side as f32 / 2.0;
    let (h, w) = frame;
    let span_y = (h as f32 / 2.0 - radius).max(0.0);
    let span_x = (w as f32 / 2.0 - radius).max(0.0);
    (span_y, span_x)
}

/// Bilinear sample of one channel at fractional (y, x); zero outside.
fn sample_bilinear(src: &Array3<f32>, y: f32, x: f32, channel: usize) -> f32 {
    let (h, w, _) = src.dim();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let read = |yy: f32, xx: f32| -> f32 {
        if yy < 0.0 || xx < 0.0 {
            return 0.0;
        }
        let (yi, xi) = (yy as usize, xx as usize);
        if yi >= h || xi >= w {
            0.0
        } else {
            src[[yi, xi, channel]]
        }
    };

    let v00 = read(y0, x0);
    let v01 = read(y0, x0 + 1.0);
    let v10 = read(y0 + 1.0, x0);
    let v11 = read(y0 + 1.0, x0 + 1.0);

    let top = v00 * (1.0 - fx) + v01 * fx;
    let bottom = v10 * (1.0 - fx) + v11 * fx;
    top * (1.0 - fy) + bottom * fy
}
