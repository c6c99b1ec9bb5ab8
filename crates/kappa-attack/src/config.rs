//! Attack configuration: hyperparameters, defaults, and domain validation.

use kappa_core::{ClipRange, KappaError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the adversarial patch attack.
///
/// Constructed once per attack run, validated at construction, then stored
/// verbatim: values are never clamped or rewritten. Owned by the
/// [`AdversarialPatch`](crate::AdversarialPatch) instance and immutable for
/// its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Class index the patch should cause the classifier to predict.
    pub target: usize,
    /// Maximum rotation (degrees) applied to random patch placements, in [0, 180].
    pub rotation_max: f32,
    /// Minimum scaling applied to random patch placements, in [0, 1].
    pub scale_min: f32,
    /// Maximum scaling applied to random patch placements, in [0, 1];
    /// must exceed `scale_min`.
    pub scale_max: f32,
    /// Step size of the optimization; positive.
    pub learning_rate: f32,
    /// Number of optimization iterations.
    pub max_iter: usize,
    /// Number of images per gradient batch.
    pub batch_size: usize,
    /// Per-channel clamp ranges for patch pixels. `None` means [0, 1] per channel.
    pub clip_patch: Option<Vec<ClipRange>>,
    /// Random seed for transform sampling, for reproducibility.
    pub seed: u64,
    /// Whether per-image geometry work runs in parallel via Rayon.
    pub parallel: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            target: 0,
            rotation_max: 22.5,
            scale_min: 0.1,
            scale_max: 1.0,
            learning_rate: 5.0,
            max_iter: 500,
            batch_size: 16,
            clip_patch: None,
            seed: 42,
            parallel: true,
        }
    }
}

impl PatchConfig {
    /// Create config for a fast run (few iterations, small batches).
    pub fn fast() -> Self {
        Self {
            max_iter: 20,
            batch_size: 4,
            parallel: false, // Too little work per batch to benefit
            ..Self::default()
        }
    }

    /// Create config for a thorough run (many iterations, gentler steps).
    pub fn thorough() -> Self {
        Self {
            max_iter: 2000,
            learning_rate: 1.0,
            parallel: true,
            ..Self::default()
        }
    }

    /// Verify every hyperparameter lies in its documented domain.
    ///
    /// Valid values are stored exactly as supplied; this rejects, never clamps.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=180.0).contains(&self.rotation_max) {
            return Err(KappaError::InvalidConfig(format!(
                "rotation_max must be in [0, 180] degrees, got {}",
                self.rotation_max
            )));
        }
        if !(0.0..=1.0).contains(&self.scale_min) {
            return Err(KappaError::InvalidConfig(format!(
                "scale_min must be in [0, 1], got {}",
                self.scale_min
            )));
        }
        if !(0.0..=1.0).contains(&self.scale_max) {
            return Err(KappaError::InvalidConfig(format!(
                "scale_max must be in [0, 1], got {}",
                self.scale_max
            )));
        }
        if self.scale_min >= self.scale_max {
            return Err(KappaError::InvalidConfig(format!(
                "scale_min ({}) must be strictly less than scale_max ({})",
                self.scale_min, self.scale_max
            )));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(KappaError::InvalidConfig(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if self.max_iter == 0 {
            return Err(KappaError::InvalidConfig(
                "max_iter must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(KappaError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if let Some(clips) = &self.clip_patch {
            for (channel, clip) in clips.iter().enumerate() {
                if clip.min > clip.max {
                    return Err(KappaError::InvalidConfig(format!(
                        "clip_patch channel {}: min {} exceeds max {}",
                        channel, clip.min, clip.max
                    )));
                }
            }
        }
        Ok(())
    }

    /// Clamp range for a channel: configured clip when present, [0, 1] otherwise.
    pub(crate) fn channel_clip(&self, channel: usize) -> ClipRange {
        self.clip_patch
            .as_ref()
            .and_then(|clips| clips.get(channel).copied())
            .unwrap_or(ClipRange {
                min: 0.0,
                max: 1.0,
            })
    }
}
