//! Gauss quadrature on the reference hypercube `[-1, 1]^dim`.
use crate::Real;
use eyre::eyre;
use fenris_quadrature::univariate;
use itertools::izip;
use nalgebra::{convert, DVector};

/// A quadrature rule with weights and points on the reference hypercube.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule<T: Real> {
    weights: Vec<T>,
    points: Vec<DVector<T>>,
}

impl<T: Real> QuadratureRule<T> {
    pub fn from_weights_and_points(weights: Vec<T>, points: Vec<DVector<T>>) -> eyre::Result<Self> {
        if weights.len() != points.len() {
            return Err(eyre!("number of weights and points must agree"));
        }
        Ok(Self { weights, points })
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn points(&self) -> &[DVector<T>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Approximates the integral of `f` over the reference domain.
    pub fn integrate(&self, f: impl Fn(&DVector<T>) -> T) -> T {
        izip!(&self.weights, &self.points).fold(T::zero(), |integral, (&w, p)| integral + w * f(p))
    }
}

/// The `num_points` Gauss-Legendre rule on `[-1, 1]`.
pub fn gauss<T: Real>(num_points: usize) -> (Vec<T>, Vec<T>) {
    let (weights, points) = univariate::gauss(num_points);
    let weights: Vec<T> = weights.into_iter().map(convert).collect();
    let points: Vec<T> = points.into_iter().map(|[x]| convert(x)).collect();
    (weights, points)
}

/// Tensor product of the `num_points_per_dim` Gauss rule on `[-1, 1]^dim`.
///
/// Points are ordered lexicographically with the first coordinate varying fastest.
pub fn tensor_gauss<T: Real>(dim: usize, num_points_per_dim: usize) -> eyre::Result<QuadratureRule<T>> {
    if !(1..=3).contains(&dim) {
        return Err(eyre!("tensor Gauss rules are available in dimension 1, 2 and 3, got {}", dim));
    }
    if num_points_per_dim == 0 {
        return Err(eyre!("a quadrature rule needs at least one point per dimension"));
    }
    let (weights_1d, points_1d) = gauss::<T>(num_points_per_dim);
    let n = num_points_per_dim;
    let num_points = n.pow(dim as u32);

    let mut weights = Vec::with_capacity(num_points);
    let mut points = Vec::with_capacity(num_points);
    for q in 0..num_points {
        let mut weight = T::one();
        let mut point = DVector::zeros(dim);
        let mut remainder = q;
        for d in 0..dim {
            let i = remainder % n;
            remainder /= n;
            weight *= weights_1d[i];
            point[d] = points_1d[i];
        }
        weights.push(weight);
        points.push(point);
    }
    QuadratureRule::from_weights_and_points(weights, points)
}
