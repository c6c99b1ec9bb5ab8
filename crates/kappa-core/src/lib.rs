//! Core types and traits for kappa adversarial patch generation.
//!
//! This crate provides the foundational abstractions shared by the model
//! boundary and the attack itself: the classifier capability model, clamp
//! ranges for patch pixels, and the error type used across the workspace.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// An abstract ability a classifier must expose for an attack to operate on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    /// Concrete forward passes: `predict(images) -> probabilities`.
    ForwardInference,
    /// Loss gradients with respect to the input pixels.
    GradientComputation,
}

impl Capability {
    const ALL: [Capability; 2] = [
        Capability::ForwardInference,
        Capability::GradientComputation,
    ];

    #[inline]
    fn bit(self) -> u8 {
        match self {
            Capability::ForwardInference => 1 << 0,
            Capability::GradientComputation => 1 << 1,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::ForwardInference => write!(f, "forward inference"),
            Capability::GradientComputation => write!(f, "gradient computation"),
        }
    }
}

/// Set of capabilities declared by a classifier.
///
/// Replaces runtime instance probing with an explicit, queryable contract:
/// a classifier states what it can do, and attack constructors compare that
/// against what they require.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty set.
    #[inline]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Every capability known to the toolkit.
    #[inline]
    pub fn all() -> Self {
        Capability::ALL
            .iter()
            .fold(Self::empty(), |set, &cap| set.with(cap))
    }

    /// Add a capability to the set.
    #[inline]
    pub fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    /// Check membership.
    #[inline]
    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// Capabilities in `required` that this set lacks, in declaration order.
    pub fn missing(&self, required: &[Capability]) -> Vec<Capability> {
        required
            .iter()
            .copied()
            .filter(|cap| !self.contains(*cap))
            .collect()
    }
}

/// An ordered clamp interval for one patch channel: [min, max].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRange {
    pub min: f32,
    pub max: f32,
}

impl ClipRange {
    /// Create a new clip range.
    #[inline]
    pub fn new(min: f32, max: f32) -> Self {
        debug_assert!(min <= max, "Invalid clip range: {min} > {max}");
        Self { min, max }
    }

    /// Check if a value lies within the range.
    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        self.min <= value && value <= self.max
    }

    /// Width of the interval.
    #[inline]
    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    /// Midpoint of the interval; used to initialize patch pixels.
    #[inline]
    pub fn midpoint(&self) -> f32 {
        0.5 * (self.min + self.max)
    }

    /// Clamp a value into the range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

impl From<RangeInclusive<f32>> for ClipRange {
    fn from(range: RangeInclusive<f32>) -> Self {
        Self::new(*range.start(), *range.end())
    }
}

/// Error types for kappa operations.
#[derive(Debug)]
pub enum KappaError {
    /// The supplied classifier does not declare every capability the attack
    /// requires. Raised at construction time, before any optimization runs.
    MissingCapability {
        classifier: String,
        missing: Vec<Capability>,
    },

    /// A hyperparameter lies outside its documented domain.
    InvalidConfig(String),

    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Loss or gradients became non-finite during optimization.
    NumericalInstability(String),
}

impl std::fmt::Display for KappaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KappaError::MissingCapability {
                classifier,
                missing,
            } => {
                let names: Vec<String> = missing.iter().map(|c| c.to_string()).collect();
                write!(
                    f,
                    "Classifier '{}' lacks required capabilities: {}",
                    classifier,
                    names.join(", ")
                )
            }
            KappaError::InvalidConfig(s) => write!(f, "Invalid configuration: {}", s),
            KappaError::ShapeMismatch { expected, got } => {
                write!(f, "Shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            KappaError::NumericalInstability(s) => write!(f, "Numerical instability: {}", s),
        }
    }
}

impl std::error::Error for KappaError {}

pub type Result<T> = std::result::Result<T, KappaError>;
