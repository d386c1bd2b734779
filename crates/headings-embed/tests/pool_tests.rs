use candle_core::{Device, Tensor};
use headings_embed::masked_mean_l2;

fn pooled(values: &[f32], shape: (usize, usize, usize), mask: &[u32]) -> Vec<Vec<f32>> {
    let dev = Device::Cpu;
    let hidden = Tensor::from_slice(values, shape, &dev).unwrap();
    let mask = Tensor::from_slice(mask, (shape.0, shape.1), &dev).unwrap();
    masked_mean_l2(&hidden, &mask).unwrap().to_vec2().unwrap()
}

#[test]
fn padding_positions_do_not_move_the_vector() {
    // "Tea" padded to three positions vs. the same states unpadded.
    let padded = pooled(&[3.0, 4.0, 1.0, 1.0, 50.0, -7.0], (1, 3, 2), &[1, 1, 0]);
    let unpadded = pooled(&[3.0, 4.0, 1.0, 1.0], (1, 2, 2), &[1, 1]);
    for (a, b) in padded[0].iter().zip(&unpadded[0]) {
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }
}

#[test]
fn every_row_has_unit_length() {
    let rows = pooled(&[3.0, 4.0, 0.0, 0.0, 1.0, 2.0, 2.0, 1.0], (2, 2, 2), &[1, 0, 1, 1]);
    assert!((rows[0][0] - 0.6).abs() < 1e-5 && (rows[0][1] - 0.8).abs() < 1e-5);
    for row in rows {
        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}

#[test]
fn fully_masked_row_is_zero_not_nan() {
    let rows = pooled(&[1.0, 2.0, 3.0, 4.0], (1, 2, 2), &[0, 0]);
    assert!(rows[0].iter().all(|x| *x == 0.0));
}

#[test]
fn mismatched_mask_is_an_error() {
    let dev = Device::Cpu;
    let hidden = Tensor::zeros((1, 3, 2), candle_core::DType::F32, &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 1], (1, 2), &dev).unwrap();
    assert!(masked_mean_l2(&hidden, &mask).is_err());
}
