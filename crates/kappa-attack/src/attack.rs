//! The adversarial patch attack: capability-checked construction and the
//! expectation-over-transformation optimization loop.

use kappa_core::{KappaError, Result};
use kappa_model::{Classifier, REQUIRED_CAPABILITIES};
use ndarray::{s, Array3, Array4, ArrayView3, Axis, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::PatchConfig;
use crate::mask::circular_mask;
use crate::transform::PatchTransform;

/// Minimum per-batch image count before rayon fan-out pays for itself.
const PARALLEL_MIN_BATCH: usize = 4;

/// Floor for probabilities entering the log loss.
const PROB_FLOOR: f32 = 1e-12;

/// Outcome of a patch optimization run.
#[derive(Debug, Clone)]
pub struct PatchResult {
    /// The optimized patch, square HWC canvas.
    pub patch: Array3<f32>,
    /// Mean targeted cross-entropy per iteration, measured before each update.
    pub loss_history: Vec<f32>,
    /// Fraction of inputs classified as the target at the last iteration.
    pub success_rate: f32,
    /// Iterations actually run (may stop early once every input is fooled).
    pub iterations_completed: usize,
}

impl PatchResult {
    /// Scalar summary for logging or persistence by a harness.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            iterations_completed: self.iterations_completed,
            final_loss: self.loss_history.last().copied().unwrap_or(f32::NAN),
            success_rate: self.success_rate,
        }
    }
}

/// Serializable scalar view of a [`PatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub iterations_completed: usize,
    pub final_loss: f32,
    pub success_rate: f32,
}

/// Adversarial patch attack runner.
///
/// Construction performs the classifier capability check and configuration
/// validation; a constructed value is guaranteed runnable against the
/// classifier it was checked against.
#[derive(Debug, Clone)]
pub struct AdversarialPatch {
    config: PatchConfig,
}

impl AdversarialPatch {
    /// Create an attack for `classifier` with the given configuration.
    ///
    /// Fails fast, before any optimization state exists:
    /// - `MissingCapability` when the classifier does not declare both
    ///   forward inference and gradient computation, naming every gap;
    /// - `InvalidConfig` for hyperparameters outside their documented
    ///   domains or a target class the classifier does not have;
    /// - `ShapeMismatch` when `clip_patch` disagrees with the channel count.
    pub fn new<C: Classifier + ?Sized>(classifier: &C, config: PatchConfig) -> Result<Self> {
        let missing = classifier.capabilities().missing(&REQUIRED_CAPABILITIES);
        if !missing.is_empty() {
            return Err(KappaError::MissingCapability {
                classifier: classifier.name().to_string(),
                missing,
            });
        }

        config.validate()?;

        if config.target >= classifier.num_classes() {
            return Err(KappaError::InvalidConfig(format!(
                "target class {} out of range for classifier '{}' with {} classes",
                config.target,
                classifier.name(),
                classifier.num_classes()
            )));
        }
        if let Some(clips) = &config.clip_patch {
            let channels = classifier.input_shape()[2];
            if clips.len() != channels {
                return Err(KappaError::ShapeMismatch {
                    expected: vec![channels],
                    got: vec![clips.len()],
                });
            }
        }

        debug!(
            classifier = classifier.name(),
            target = config.target,
            max_iter = config.max_iter,
            "constructed adversarial patch attack"
        );
        Ok(Self { config })
    }

    /// The validated configuration, stored verbatim.
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Optimize a patch against `classifier` over the given image set.
    ///
    /// Every iteration walks the images in `batch_size` chunks: each image
    /// gets a fresh random placement, the patch and its circular mask are
    /// warped in, the composite goes through the classifier's targeted loss
    /// gradient, and the masked gradient is pulled back onto the patch
    /// canvas and averaged. The patch descends that mean and is clamped to
    /// its per-channel clip ranges. Stops early once every image is
    /// classified as the target.
    pub fn generate<C: Classifier + ?Sized>(
        &self,
        classifier: &C,
        images: &Array4<f32>,
    ) -> Result<PatchResult> {
        let (n, height, width, channels) = images.dim();
        self.check_images(classifier, images)?;

        let side = height.min(width);
        let mask = circular_mask([side, side, channels]);
        let mut patch = self.initial_patch(side, channels);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut loss_history = Vec::with_capacity(self.config.max_iter);
        let mut success_rate = 0.0;
        let mut iterations_completed = 0;

        for iter in 0..self.config.max_iter {
            let mut grad_sum: Array3<f32> = Array3::zeros((side, side, channels));
            let mut loss_sum = 0.0f64;
            let mut hits = 0usize;

            for start in (0..n).step_by(self.config.batch_size) {
                let end = (start + self.config.batch_size).min(n);
                let batch = images.slice(s![start..end, .., .., ..]);
                let batch_len = end - start;
                let targets = vec![self.config.target; batch_len];

                // Transforms are drawn from the single run RNG so results
                // are identical regardless of the parallel flag.
                let transforms: Vec<PatchTransform> = (0..batch_len)
                    .map(|_| {
                        PatchTransform::sample(&self.config, (height, width), side, &mut rng)
                    })
                    .collect();

                let use_parallel = self.config.parallel && batch_len >= PARALLEL_MIN_BATCH;

                let place = |t: &PatchTransform| -> (Array3<f32>, Array3<f32>) {
                    (t.warp(&patch, height, width), t.warp(&mask, height, width))
                };
                let placements: Vec<(Array3<f32>, Array3<f32>)> = if use_parallel {
                    transforms.par_iter().map(place).collect()
                } else {
                    transforms.iter().map(place).collect()
                };

                let patched_vec: Vec<Array3<f32>> = placements
                    .iter()
                    .zip(batch.axis_iter(Axis(0)))
                    .map(|((patch_t, mask_t), image)| composite(image, patch_t, mask_t))
                    .collect();
                let patched = stack_batch(&patched_vec);

                // Metrics reflect the patch as it stood entering this iteration.
                let probs = classifier.predict(&patched)?;
                for i in 0..batch_len {
                    let p_target = probs[[i, self.config.target]];
                    loss_sum += f64::from(-(p_target.max(PROB_FLOOR)).ln());
                    let predicted = argmax_row(&probs, i);
                    if predicted == self.config.target {
                        hits += 1;
                    }
                }

                let grads = classifier.loss_gradient(&patched, &targets)?;

                // Mask the pixel gradient and pull it back through the
                // inverse placement onto the patch canvas.
                let pull = |i: usize| -> Array3<f32> {
                    let (_, mask_t) = &placements[i];
                    let masked = &grads.index_axis(Axis(0), i) * mask_t;
                    transforms[i].inverse().warp(&masked, side, side)
                };
                let grad_terms: Vec<Array3<f32>> = if use_parallel {
                    (0..batch_len).into_par_iter().map(pull).collect()
                } else {
                    (0..batch_len).map(pull).collect()
                };
                for term in &grad_terms {
                    grad_sum += term;
                }

                trace!(iter, start, batch_len, "processed patch gradient batch");
            }

            let mean_grad = grad_sum / n as f32;
            if mean_grad.iter().any(|v| !v.is_finite()) {
                return Err(KappaError::NumericalInstability(format!(
                    "non-finite patch gradient at iteration {iter}"
                )));
            }

            patch = &patch - &(&mean_grad * self.config.learning_rate);
            self.clamp_patch(&mut patch);

            let loss = (loss_sum / n as f64) as f32;
            success_rate = hits as f32 / n as f32;
            loss_history.push(loss);
            iterations_completed = iter + 1;

            debug!(iter, loss, success_rate, "patch iteration complete");

            if hits == n {
                debug!(iter, "every input classified as target; stopping early");
                break;
            }
        }

        Ok(PatchResult {
            patch,
            loss_history,
            success_rate,
            iterations_completed,
        })
    }

    /// Overlay a patch on each image under a freshly sampled random
    /// placement; the inference-time counterpart of [`generate`](Self::generate).
    ///
    /// When `scale` is given it overrides the sampled scale and must lie in
    /// (0, 1].
    pub fn apply_patch(
        &self,
        images: &Array4<f32>,
        patch: &Array3<f32>,
        scale: Option<f32>,
    ) -> Result<Array4<f32>> {
        let (n, height, width, channels) = images.dim();
        let side = height.min(width);
        let (patch_h, patch_w, patch_c) = patch.dim();
        if patch_h != side || patch_w != side || patch_c != channels {
            return Err(KappaError::ShapeMismatch {
                expected: vec![side, side, channels],
                got: vec![patch_h, patch_w, patch_c],
            });
        }
        if let Some(s) = scale {
            if !(s > 0.0 && s <= 1.0) {
                return Err(KappaError::InvalidConfig(format!(
                    "patch application scale must be in (0, 1], got {s}"
                )));
            }
        }
        // Patching nothing is a no-op, not an error.
        if n == 0 {
            return Ok(Array4::zeros((0, height, width, channels)));
        }

        let mask = circular_mask([side, side, channels]);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let patched: Vec<Array3<f32>> = images
            .axis_iter(Axis(0))
            .map(|image| {
                let mut transform =
                    PatchTransform::sample(&self.config, (height, width), side, &mut rng);
                if let Some(s) = scale {
                    // The shift was drawn for the sampled scale; re-fit it
                    // so the overridden disc still sits inside the frame.
                    transform.scale = s;
                    transform.clamp_shift((height, width), side);
                }
                let patch_t = transform.warp(patch, height, width);
                let mask_t = transform.warp(&mask, height, width);
                composite(image, &patch_t, &mask_t)
            })
            .collect();

        Ok(stack_batch(&patched))
    }

    /// Patch pixels start at the per-channel clip midpoint.
    fn initial_patch(&self, side: usize, channels: usize) -> Array3<f32> {
        let mut patch = Array3::zeros((side, side, channels));
        for ch in 0..channels {
            let mid = self.config.channel_clip(ch).midpoint();
            patch.slice_mut(s![.., .., ch]).fill(mid);
        }
        patch
    }

    fn clamp_patch(&self, patch: &mut Array3<f32>) {
        let channels = patch.dim().2;
        for ch in 0..channels {
            let clip = self.config.channel_clip(ch);
            patch
                .slice_mut(s![.., .., ch])
                .mapv_inplace(|v| clip.clamp(v));
        }
    }

    fn check_images<C: Classifier + ?Sized>(
        &self,
        classifier: &C,
        images: &Array4<f32>,
    ) -> Result<()> {
        let (n, height, width, channels) = images.dim();
        if n == 0 {
            return Err(KappaError::InvalidConfig(
                "cannot optimize a patch over an empty image set".to_string(),
            ));
        }
        let [h, w, c] = classifier.input_shape();
        if height != h || width != w || channels != c {
            return Err(KappaError::ShapeMismatch {
                expected: vec![n, h, w, c],
                got: vec![n, height, width, channels],
            });
        }
        Ok(())
    }
}

/// `image * (1 - mask) + patch * mask`, element-wise.
fn composite(image: ArrayView3<'_, f32>, patch_t: &Array3<f32>, mask_t: &Array3<f32>) -> Array3<f32> {
    let mut out = image.to_owned();
    Zip::from(&mut out)
        .and(patch_t)
        .and(mask_t)
        .for_each(|o, &p, &m| *o = *o * (1.0 - m) + p * m);
    out
}

/// Stack equally shaped HWC frames into an NHWC batch.
fn stack_batch(frames: &[Array3<f32>]) -> Array4<f32> {
    let views: Vec<_> = frames.iter().map(|f| f.view()).collect();
    ndarray::stack(Axis(0), &views).expect("frames share one shape by construction")
}

fn argmax_row(probs: &ndarray::Array2<f32>, row: usize) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in probs.row(row).iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = idx;
        }
    }
    best
}
