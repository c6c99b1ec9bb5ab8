//! End-to-end attack run against the reference dense classifier.

use kappa_attack::{AdversarialPatch, Classifier, ClipRange, DenseClassifier, PatchConfig};
use ndarray::{Array1, Array2, Array4};

const HEIGHT: usize = 8;
const WIDTH: usize = 8;
const CHANNELS: usize = 3;
const CLASSES: usize = 3;
const TARGET: usize = 2;

/// Class 2 rewards brightness in channel 0; class 0 is a bias that wins on
/// mid-gray inputs. The attack must brighten channel 0 inside the disc.
fn classifier() -> DenseClassifier {
    let flat = HEIGHT * WIDTH * CHANNELS;
    let mut weights = Array2::zeros((CLASSES, flat));
    for pixel in 0..(HEIGHT * WIDTH) {
        weights[[TARGET, pixel * CHANNELS]] = 1.0;
    }
    let bias = Array1::from_vec(vec![40.0, 0.0, 0.0]);
    DenseClassifier::new(weights, Some(bias), [HEIGHT, WIDTH, CHANNELS])
        .unwrap()
        .with_name("brightness-3ch")
}

fn config() -> PatchConfig {
    PatchConfig {
        target: TARGET,
        rotation_max: 15.0,
        scale_min: 0.8,
        scale_max: 1.0,
        learning_rate: 2.0,
        max_iter: 40,
        batch_size: 4,
        clip_patch: Some(vec![
            ClipRange::new(0.0, 1.0),
            ClipRange::new(0.0, 1.0),
            ClipRange::new(0.0, 1.0),
        ]),
        seed: 7,
        parallel: true,
    }
}

fn gray_batch(n: usize) -> Array4<f32> {
    Array4::from_elem((n, HEIGHT, WIDTH, CHANNELS), 0.5)
}

#[test]
fn attack_fools_dense_classifier() {
    let model = classifier();
    let images = gray_batch(8);

    // Sanity: unpatched gray images classify as class 0.
    let clean = model.predict(&images).unwrap();
    assert!(clean[[0, 0]] > clean[[0, TARGET]]);

    let attack = AdversarialPatch::new(&model, config()).unwrap();
    let result = attack.generate(&model, &images).unwrap();

    assert!(
        result.success_rate > 0.9,
        "success rate {} too low",
        result.success_rate
    );
    let first = result.loss_history[0];
    let last = *result.loss_history.last().unwrap();
    assert!(last < first, "loss did not improve: {first} -> {last}");

    // Clip ranges hold on every channel.
    for &v in result.patch.iter() {
        assert!((0.0..=1.0).contains(&v));
    }

    // Applying the patch at a fixed scale flips predictions to the target.
    let patched = attack
        .apply_patch(&images, &result.patch, Some(0.9))
        .unwrap();
    let probs = model.predict(&patched).unwrap();
    let mut fooled = 0;
    for i in 0..8 {
        let row = probs.row(i);
        let argmax = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
            .unwrap();
        if argmax == TARGET {
            fooled += 1;
        }
    }
    assert!(fooled >= 7, "only {fooled}/8 patched images fooled");
}

#[test]
fn attack_is_reproducible_across_runs() {
    let model = classifier();
    let images = gray_batch(4);
    let cfg = PatchConfig {
        max_iter: 5,
        ..config()
    };

    let first = AdversarialPatch::new(&model, cfg.clone())
        .unwrap()
        .generate(&model, &images)
        .unwrap();
    let second = AdversarialPatch::new(&model, cfg)
        .unwrap()
        .generate(&model, &images)
        .unwrap();

    assert_eq!(first.patch, second.patch);
    assert_eq!(first.loss_history, second.loss_history);
    assert_eq!(first.iterations_completed, second.iterations_completed);
}

#[test]
fn run_summary_reports_final_state() {
    let model = classifier();
    let attack = AdversarialPatch::new(&model, config()).unwrap();
    let result = attack.generate(&model, &gray_batch(4)).unwrap();

    let summary = result.summary();
    assert_eq!(summary.iterations_completed, result.iterations_completed);
    assert_eq!(summary.success_rate, result.success_rate);
    assert_eq!(summary.final_loss, *result.loss_history.last().unwrap());
}
