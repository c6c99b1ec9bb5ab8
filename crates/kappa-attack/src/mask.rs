//! Circular patch masking.
//!
//! The printable patch is a disc: pixels inside the centered circle belong
//! to the patch, pixels outside stay untouched. The mask is carried as f32
//! weights so it can be warped with the same transform as the patch and
//! used directly in compositing and gradient masking.

use ndarray::Array3;

/// Build a centered circular mask: 1.0 inside the disc of radius
/// `min(h, w) / 2`, 0.0 outside, identical across channels.
pub fn circular_mask(shape: [usize; 3]) -> Array3<f32> {
    let [h, w, channels] = shape;
    let cy = (h as f32 - 1.0) / 2.0;
    let cx = (w as f32 - 1.0) / 2.0;
    let radius = h.min(w) as f32 / 2.0;
    let radius_sq = radius * radius;

    let mut mask = Array3::zeros((h, w, channels));
    for y in 0..h {
        for x in 0..w {
            let dy = y as f32 - cy;
            let dx = x as f32 - cx;
            if dy * dy + dx * dx <= radius_sq {
                for ch in 0..channels {
                    mask[[y, x, ch]] = 1.0;
                }
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_center_inside_corners_outside() {
        let mask = circular_mask([9, 9, 3]);

        assert_eq!(mask[[4, 4, 0]], 1.0);
        assert_eq!(mask[[0, 0, 0]], 0.0);
        assert_eq!(mask[[0, 8, 0]], 0.0);
        assert_eq!(mask[[8, 0, 0]], 0.0);
        assert_eq!(mask[[8, 8, 0]], 0.0);
    }

    #[test]
    fn test_mask_identical_across_channels() {
        let mask = circular_mask([7, 7, 3]);
        for y in 0..7 {
            for x in 0..7 {
                assert_eq!(mask[[y, x, 0]], mask[[y, x, 1]]);
                assert_eq!(mask[[y, x, 0]], mask[[y, x, 2]]);
            }
        }
    }

    #[test]
    fn test_mask_is_binary_and_nonempty() {
        let mask = circular_mask([16, 16, 1]);
        let mut inside = 0usize;
        for &v in mask.iter() {
            assert!(v == 0.0 || v == 1.0);
            if v == 1.0 {
                inside += 1;
            }
        }
        // Disc area is roughly pi * r^2; well between empty and full.
        assert!(inside > 100 && inside < 256);
    }

    #[test]
    fn test_mask_rect_frame_uses_short_side() {
        let mask = circular_mask([4, 10, 1]);
        // Disc radius 2: far left/right columns stay uncovered.
        assert_eq!(mask[[2, 0, 0]], 0.0);
        assert_eq!(mask[[2, 9, 0]], 0.0);
        assert_eq!(mask[[2, 5, 0]], 1.0);
    }
}
