//! Adversarial patch generation.
//!
//! Implements the adversarial patch attack (Brown et al., arXiv:1712.09665):
//! a bounded circular image region optimized so that a classifier predicts a
//! chosen target class whenever the patch is overlaid on an input, robustly
//! across random rotation, scale, and placement.
//!
//! ## Algorithm
//!
//! 1. **Initialization**: start the patch at the per-channel clip midpoint.
//! 2. **Transform sampling**: per image, draw a random rotation/scale/shift
//!    and warp both the patch and its circular mask into image coordinates.
//! 3. **Compositing**: `patched = image * (1 - mask) + patch * mask`.
//! 4. **Gradient step**: take the classifier's targeted-loss input gradient,
//!    mask it, pull it back through the inverse transform into patch
//!    coordinates, average over the batch, and descend.
//! 5. **Projection**: clamp the patch to its per-channel clip ranges.
//! 6. **Repeat** for `max_iter` iterations or until every input is fooled.

pub mod attack;
pub mod config;
pub mod mask;
pub mod transform;

pub use attack::{AdversarialPatch, PatchResult, RunSummary};
pub use config::PatchConfig;
pub use mask::circular_mask;
pub use transform::PatchTransform;

// Re-export core and model types for tests and downstream use
pub use kappa_core::{Capability, CapabilitySet, ClipRange, KappaError, Result};
pub use kappa_model::{Classifier, DenseClassifier, REQUIRED_CAPABILITIES};
