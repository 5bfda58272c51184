use rand::{rngs::StdRng, Rng, SeedableRng};
use tensor_ir::Tensor;

pub const ATOL: f64 = 1e-4;
pub const RTOL: f64 = 1e-5;

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_vec(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

pub fn tensor_f32(dims: &[usize], values: &[f32]) -> Tensor {
    Tensor::from_f32(dims, values.to_vec()).expect("static f32 tensor")
}

pub fn random_tensor(rng: &mut StdRng, dims: &[usize]) -> Tensor {
    let len = dims.iter().product();
    tensor_f32(dims, &random_vec(rng, len))
}

pub fn assert_close(expected: &[f32], actual: &[f32]) {
    assert_eq!(expected.len(), actual.len());
    for (idx, (&e, &a)) in expected.iter().zip(actual.iter()).enumerate() {
        let diff = (e as f64 - a as f64).abs();
        let thresh = ATOL + RTOL * e.abs().max(a.abs()) as f64;
        assert!(
            diff <= thresh,
            "value mismatch at index {idx}: expected {e}, actual {a}, diff {diff}, thresh {thresh}"
        );
    }
}
