//! The `Classifier` trait: capability-declared model boundary.

use kappa_core::{Capability, CapabilitySet, Result};
use ndarray::{Array2, Array4};

/// Capabilities every evasion attack in this workspace requires.
pub const REQUIRED_CAPABILITIES: [Capability; 2] = [
    Capability::ForwardInference,
    Capability::GradientComputation,
];

/// A trained classifier as seen by an attack.
///
/// Images are NHWC `f32` tensors. Implementations declare their abilities
/// through [`capabilities`](Classifier::capabilities); attack constructors
/// compare that set against what they require and fail fast on a gap
/// rather than erroring mid-optimization.
///
/// `Sync` is required so classifiers can be shared across rayon scopes
/// during batched gradient work.
pub trait Classifier: Sync {
    /// Human-readable model name, used in error messages and logs.
    fn name(&self) -> &str;

    /// The abilities this model exposes.
    fn capabilities(&self) -> CapabilitySet;

    /// Expected input shape as (height, width, channels).
    fn input_shape(&self) -> [usize; 3];

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Forward inference: class probabilities of shape (N, num_classes).
    fn predict(&self, images: &Array4<f32>) -> Result<Array2<f32>>;

    /// Gradient of the targeted cross-entropy loss with respect to the
    /// input pixels, one target label per image. Same shape as `images`.
    ///
    /// Implementations without [`Capability::GradientComputation`] must
    /// return [`KappaError::MissingCapability`](kappa_core::KappaError).
    fn loss_gradient(&self, images: &Array4<f32>, targets: &[usize]) -> Result<Array4<f32>>;
}
