//! Reference dense classifier: flatten -> linear -> softmax.
//!
//! Small enough that the targeted cross-entropy input gradient has a
//! closed form, `dL/dx = W^T (p - onehot(target))`, which makes it the
//! workhorse of the attack test suite: no autodiff, no approximation, so
//! optimization behavior is attributable to the attack alone.

use kappa_core::{Capability, CapabilitySet, KappaError, Result};
use ndarray::{Array1, Array2, Array4, Axis};
use tracing::trace;

use crate::classifier::Classifier;

/// A single-layer dense classifier over flattened HWC images.
#[derive(Debug, Clone)]
pub struct DenseClassifier {
    /// Weight matrix of shape (num_classes, H * W * C).
    weights: Array2<f32>,
    /// Optional per-class bias of shape (num_classes,).
    bias: Option<Array1<f32>>,
    input_shape: [usize; 3],
    name: String,
}

impl DenseClassifier {
    /// Create a classifier from weights and an optional bias.
    ///
    /// Fails with `ShapeMismatch` when the weight columns disagree with the
    /// flattened input shape or the bias length disagrees with the class count.
    pub fn new(
        weights: Array2<f32>,
        bias: Option<Array1<f32>>,
        input_shape: [usize; 3],
    ) -> Result<Self> {
        let [h, w, c] = input_shape;
        let flat = h * w * c;
        if weights.ncols() != flat {
            return Err(KappaError::ShapeMismatch {
                expected: vec![weights.nrows(), flat],
                got: vec![weights.nrows(), weights.ncols()],
            });
        }
        if let Some(b) = &bias {
            if b.len() != weights.nrows() {
                return Err(KappaError::ShapeMismatch {
                    expected: vec![weights.nrows()],
                    got: vec![b.len()],
                });
            }
        }
        Ok(Self {
            weights,
            bias,
            input_shape,
            name: "dense".to_string(),
        })
    }

    /// Override the model name reported in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Check a batch against the declared input shape.
    fn check_batch(&self, images: &Array4<f32>) -> Result<()> {
        let shape = images.shape();
        let [h, w, c] = self.input_shape;
        if shape[1] != h || shape[2] != w || shape[3] != c {
            return Err(KappaError::ShapeMismatch {
                expected: vec![shape[0], h, w, c],
                got: shape.to_vec(),
            });
        }
        Ok(())
    }

    /// Flatten a batch to (N, H*W*C) rows.
    fn flatten(&self, images: &Array4<f32>) -> Array2<f32> {
        let n = images.shape()[0];
        let flat: usize = self.input_shape.iter().product();
        // Clone into a row-major owned copy so the reshape holds for any
        // input layout.
        images
            .to_owned()
            .into_shape_with_order((n, flat))
            .expect("batch size times flattened shape matches element count")
    }

    /// Logits for a flattened batch: rows of `W x + b`.
    fn logits(&self, flat: &Array2<f32>) -> Array2<f32> {
        let mut logits = flat.dot(&self.weights.t());
        if let Some(b) = &self.bias {
            logits += b;
        }
        logits
    }

    /// Softmax probabilities for a batch of logits.
    fn probabilities(&self, images: &Array4<f32>) -> Result<Array2<f32>> {
        self.check_batch(images)?;
        let flat = self.flatten(images);
        let mut probs = self.logits(&flat);
        for mut row in probs.axis_iter_mut(Axis(0)) {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum: f32 = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        Ok(probs)
    }
}

impl Classifier for DenseClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty()
            .with(Capability::ForwardInference)
            .with(Capability::GradientComputation)
    }

    fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    fn num_classes(&self) -> usize {
        self.weights.nrows()
    }

    fn predict(&self, images: &Array4<f32>) -> Result<Array2<f32>> {
        self.probabilities(images)
    }

    fn loss_gradient(&self, images: &Array4<f32>, targets: &[usize]) -> Result<Array4<f32>> {
        let n = images.shape()[0];
        if targets.len() != n {
            return Err(KappaError::ShapeMismatch {
                expected: vec![n],
                got: vec![targets.len()],
            });
        }
        for &t in targets {
            if t >= self.num_classes() {
                return Err(KappaError::InvalidConfig(format!(
                    "target class {} out of range for {} classes",
                    t,
                    self.num_classes()
                )));
            }
        }

        // Softmax + cross-entropy collapses to p - onehot(target) at the
        // logits, so the input gradient is W^T (p - y) per image.
        let mut delta = self.probabilities(images)?;
        for (i, &t) in targets.iter().enumerate() {
            delta[[i, t]] -= 1.0;
        }
        let grad_flat = delta.dot(&self.weights);
        trace!(batch = n, "computed dense loss gradient");

        let [h, w, c] = self.input_shape;
        let grad = grad_flat
            .into_shape_with_order((n, h, w, c))
            .expect("gradient rows reshape back to the input batch shape");
        Ok(grad)
    }
}
