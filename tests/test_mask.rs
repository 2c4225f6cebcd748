// tests/test_mask.rs — Integration tests for the mask cleanup chain:
// morphology → blur → threshold → readback → contours.

use approx::assert_abs_diff_eq;
use footfall::blur::GaussianBlur;
use footfall::config::{BlurConfig, MAX_TAPS};
use footfall::contour::{ContourSource, OuterContours};
use footfall::image::Image;
use footfall::morphology::{erode, PingPong};
use footfall::readback::HostReadback;
use footfall::threshold::Threshold;
use proptest::prelude::*;

/// A solid 14×12 block at (20, 10) plus isolated single-pixel noise.
fn noisy_block(w: usize, h: usize) -> Image<f32> {
    Image::from_fn(w, h, |x, y| {
        let block = (20..34).contains(&x) && (10..22).contains(&y);
        let noise = (x * 31 + y * 17) % 53 == 0;
        if block || noise { 1.0 } else { 0.0 }
    })
}

fn clean(mask: &Image<f32>) -> Image<f32> {
    let blur = GaussianBlur::from_config(&BlurConfig::default()).unwrap();
    let cleaned = PingPong::new(mask.width(), mask.height()).load(mask).erode(2).dilate(3);
    Threshold::default().apply(&blur.blur(cleaned.read()))
}

#[test]
fn isolated_pixels_vanish_after_one_erode() {
    let mut mask: Image<f32> = Image::new(30, 30);
    for &(x, y) in &[(3, 3), (15, 8), (27, 20), (8, 26)] {
        mask.set(x, y, 1.0);
    }
    assert_eq!(erode(&mask, 1, PingPong::new(30, 30)).read().count_above(0.0), 0);
}

#[test]
fn cleanup_chain_removes_noise_and_keeps_block() {
    let mask = noisy_block(64, 40);
    let out = clean(&mask);

    // Noise far from the block is gone.
    for (x, y, v) in out.pixels() {
        let near_block = (14..40).contains(&x) && (4..28).contains(&y);
        if !near_block {
            assert_eq!(v, 0.0, "stray foreground at ({x}, {y})");
        }
    }
    // The block interior survives.
    assert_eq!(out.get(27, 16), 1.0);
    assert!(out.count_above(0.0) > 100);
}

#[test]
fn cleaned_mask_yields_one_contour() {
    let out = clean(&noisy_block(64, 40));
    let mut hb = HostReadback::new(64, 40);
    hb.apply(&out);
    hb.apply(&Image::new(64, 40));

    let contours = OuterContours::new().find_contours(hb.output());
    assert_eq!(contours.len(), 1);
}

#[test]
fn readback_publishes_previous_frame_only() {
    let mut hb = HostReadback::new(4, 4);
    let full = Image::filled(4, 4, 1.0f32);
    let empty: Image<f32> = Image::new(4, 4);

    assert_eq!(hb.apply(&full), None);
    assert!(hb.output().as_slice().iter().all(|&v| v == 0));

    assert_eq!(hb.apply(&empty), Some(0));
    assert!(hb.output().as_slice().iter().all(|&v| v == 255));

    assert_eq!(hb.apply(&full), Some(1));
    assert!(hb.output().as_slice().iter().all(|&v| v == 0));
}

proptest! {
    #[test]
    fn prop_kernel_normalized_for_any_config(sigma in prop_oneof![1e-30f32..1e-3, 0.1f32..8.0], taps in 1usize..=MAX_TAPS, stride in 1usize..4) {
        let g = GaussianBlur::configure(sigma, taps, stride).unwrap();
        let w = g.weights();
        let total = w[0] + 2.0 * w[1..].iter().sum::<f32>();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn prop_blur_stays_in_unit_range(sigma in 0.3f32..4.0, taps in 1usize..12, seed in 0usize..1000) {
        let g = GaussianBlur::configure(sigma, taps, 1).unwrap();
        let mask = Image::from_fn(17, 13, |x, y| if (x * 7 + y * 3 + seed) % 5 < 2 { 1.0 } else { 0.0 });
        for &v in g.blur(&mask).as_slice() {
            prop_assert!((-1e-6..=1.0 + 1e-5).contains(&v));
        }
    }
}
