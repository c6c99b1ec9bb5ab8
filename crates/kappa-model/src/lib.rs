//! Classifier boundary for kappa attacks.
//!
//! Attacks never see a concrete model type. They operate through the
//! [`Classifier`] trait, which declares what a model can do (its
//! [`CapabilitySet`]) and exposes the two operations patch optimization
//! needs: batched forward inference and input-space loss gradients.
//!
//! [`DenseClassifier`] is the minimal conforming implementation — a
//! flatten/linear/softmax model with analytic gradients — used by the test
//! suite and as a reference for wiring real models into the boundary.

pub mod classifier;
pub mod dense;

pub use classifier::{Classifier, REQUIRED_CAPABILITIES};
pub use dense::DenseClassifier;

pub use kappa_core::{Capability, CapabilitySet, KappaError, Result};
