//! Generate an adversarial patch against a toy dense classifier and print
//! the run summary.
//!
//! Run with: `cargo run --example generate_patch -p kappa-attack`

use kappa_attack::{AdversarialPatch, Classifier, DenseClassifier, PatchConfig, Result};
use ndarray::{Array1, Array2, Array4};

fn main() -> Result<()> {
    let height = 16;
    let width = 16;
    let channels = 1;
    let classes = 4;
    let target = 3;

    // Toy model: the target class rewards bright pixels, class 0 carries a
    // bias that wins on mid-gray inputs.
    let flat = height * width * channels;
    let mut weights = Array2::zeros((classes, flat));
    weights.row_mut(target).fill(1.0);
    let mut bias = Array1::zeros(classes);
    bias[0] = flat as f32 * 0.5 + 20.0;
    let model = DenseClassifier::new(weights, Some(bias), [height, width, channels])?
        .with_name("toy-brightness");

    let config = PatchConfig {
        target,
        max_iter: 50,
        batch_size: 8,
        learning_rate: 2.0,
        scale_min: 0.5,
        scale_max: 1.0,
        ..PatchConfig::default()
    };

    let images = Array4::from_elem((16, height, width, channels), 0.5);
    let attack = AdversarialPatch::new(&model, config)?;
    let result = attack.generate(&model, &images)?;
    let summary = result.summary();

    println!(
        "finished after {} iterations: loss {:.4}, success rate {:.0}%",
        summary.iterations_completed,
        summary.final_loss,
        summary.success_rate * 100.0
    );

    let patched = attack.apply_patch(&images, &result.patch, Some(0.8))?;
    let probs = model.predict(&patched)?;
    println!(
        "mean target probability on patched images: {:.4}",
        probs.column(target).sum() / probs.nrows() as f32
    );
    Ok(())
}
