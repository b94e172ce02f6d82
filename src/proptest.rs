//! Strategies for property-based testing of forms.
//!
//! The functional strategies describe fields on the two-slot layout
//! `[FieldBasis::Scalar, FieldBasis::Vector]` in two dimensions, see [`two_field_layout`].
use crate::evaluation::FieldBasis;
use crate::field::FieldFunction;
use crate::shape::Shape;
use crate::tensor::Tensor;
use crate::vector::BlockVector;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::DVector;

/// The slot bases the functional strategies refer to.
pub fn two_field_layout() -> [FieldBasis; 2] {
    [FieldBasis::Scalar, FieldBasis::Vector]
}

pub fn coefficient() -> impl Strategy<Value = f64> {
    // Keep coefficients moderate so that tolerances in comparisons stay meaningful
    prop_oneof![-10.0..-0.1, 0.1..10.0]
}

fn scalar_field() -> FieldFunction<f64> {
    FieldFunction::named("p", 0, Shape::scalar(2))
}

fn vector_field() -> FieldFunction<f64> {
    FieldFunction::named("u", 1, Shape::vector(2))
}

/// Scaled scalar-valued functionals.
pub fn scalar_functional() -> impl Strategy<Value = FieldFunction<f64>> {
    let candidates = vec![
        Ok(scalar_field()),
        vector_field().divergence(),
        vector_field().curl(),
        scalar_field().laplacian(),
    ];
    let candidates: Vec<_> = candidates.into_iter().filter_map(Result::ok).collect();
    (0..candidates.len(), coefficient()).prop_map(move |(i, c)| candidates[i].scale(c))
}

/// Scaled vector-valued functionals.
pub fn vector_functional() -> impl Strategy<Value = FieldFunction<f64>> {
    let candidates = vec![
        Ok(vector_field()),
        scalar_field().gradient(),
        scalar_field().diagonal_hessian(),
        vector_field().laplacian(),
    ];
    let candidates: Vec<_> = candidates.into_iter().filter_map(Result::ok).collect();
    (0..candidates.len(), coefficient()).prop_map(move |(i, c)| candidates[i].scale(c))
}

/// Dof vectors with one block per slot, with the given block sizes.
pub fn dof_vector(block_sizes: Vec<usize>) -> impl Strategy<Value = BlockVector<f64>> {
    let blocks: Vec<_> = block_sizes
        .into_iter()
        .map(|n| vec(-1.0..1.0, n).prop_map(DVector::from_vec))
        .collect();
    blocks.prop_map(BlockVector::from_blocks)
}

pub fn tensor(rank: usize, dim: usize) -> impl Strategy<Value = Tensor<f64>> {
    vec(-10.0..10.0, dim.pow(rank as u32)).prop_map(move |components| Tensor::from_slice(rank, dim, &components))
}
