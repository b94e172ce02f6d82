//! Dense tensors of small rank, the values produced and consumed at quadrature points.
use crate::shape::{Shape, MAX_RANK};
use crate::Real;
use nalgebra::{DMatrix, DVector};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// A dense tensor of rank at most [`MAX_RANK`] over a `dim`-dimensional index space.
///
/// Components are stored in row-major order, i.e. the last index varies fastest.
/// Gradients follow the convention `grad u [i][j] = d u_i / d x_j`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Real> {
    rank: usize,
    dim: usize,
    components: DVector<T>,
}

impl<T: Real> Tensor<T> {
    pub fn zeros(rank: usize, dim: usize) -> Self {
        assert!(rank <= MAX_RANK, "Rank must not exceed {}", MAX_RANK);
        assert!(dim >= 1, "Dimension must be at least 1");
        Self {
            rank,
            dim,
            components: DVector::zeros(dim.pow(rank as u32)),
        }
    }

    /// A zero tensor with the given shape.
    pub fn zeros_like_shape(shape: &Shape) -> Self {
        Self::zeros(shape.rank(), shape.dim())
    }

    pub fn from_scalar(dim: usize, value: T) -> Self {
        Self::from_components(0, dim, DVector::from_element(1, value))
    }

    /// Creates a tensor from its components in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if the number of components is not `dim^rank`.
    pub fn from_components(rank: usize, dim: usize, components: DVector<T>) -> Self {
        assert!(rank <= MAX_RANK, "Rank must not exceed {}", MAX_RANK);
        assert_eq!(
            components.len(),
            dim.pow(rank as u32),
            "Number of components does not match rank and dimension"
        );
        Self { rank, dim, components }
    }

    pub fn from_slice(rank: usize, dim: usize, components: &[T]) -> Self {
        Self::from_components(rank, dim, DVector::from_column_slice(components))
    }

    /// The rank-2 identity tensor.
    pub fn identity(dim: usize) -> Self {
        let mut identity = Self::zeros(2, dim);
        for i in 0..dim {
            identity.components[i * dim + i] = T::one();
        }
        identity
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.rank, self.dim)
    }

    pub fn components(&self) -> &DVector<T> {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut DVector<T> {
        &mut self.components
    }

    pub fn into_components(self) -> DVector<T> {
        self.components
    }

    /// Returns the value of a rank-0 tensor.
    pub fn as_scalar(&self) -> Option<T> {
        (self.rank == 0).then(|| self.components[0])
    }

    fn flat_index(&self, index: &[usize]) -> usize {
        assert_eq!(index.len(), self.rank, "Multi-index length must equal tensor rank");
        index.iter().fold(0, |flat, &i| {
            assert!(i < self.dim, "Index out of bounds");
            flat * self.dim + i
        })
    }

    pub fn entry(&self, index: &[usize]) -> T {
        self.components[self.flat_index(index)]
    }

    pub fn entry_mut(&mut self, index: &[usize]) -> &mut T {
        let flat = self.flat_index(index);
        &mut self.components[flat]
    }

    pub fn scale(&self, factor: T) -> Self {
        Self {
            rank: self.rank,
            dim: self.dim,
            components: &self.components * factor,
        }
    }

    pub fn norm(&self) -> T {
        self.components.norm()
    }

    /// Tensor product with contraction over one index.
    ///
    /// If either operand has rank 0 it scales the other. Otherwise the last index of `self`
    /// is contracted with the first index of `other`.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions differ or if the result would exceed [`MAX_RANK`].
    pub fn contract(&self, other: &Tensor<T>) -> Tensor<T> {
        assert_eq!(self.dim, other.dim, "Tensor dimensions must agree");
        if let Some(s) = self.as_scalar() {
            return other.scale(s);
        }
        if let Some(s) = other.as_scalar() {
            return self.scale(s);
        }

        let d = self.dim;
        let rank = self.rank + other.rank - 2;
        assert!(rank <= MAX_RANK, "Rank of tensor product must not exceed {}", MAX_RANK);
        let m = d.pow(self.rank as u32 - 1);
        let n = d.pow(other.rank as u32 - 1);
        let a = DMatrix::from_row_slice(m, d, self.components.as_slice());
        let b = DMatrix::from_row_slice(d, n, other.components.as_slice());
        // The transpose stores the product in row-major order
        let c = (a * b).transpose();
        Tensor::from_slice(rank, d, c.as_slice())
    }

    /// The double contraction `A : B = A_ij B_ij` of two rank-2 tensors.
    ///
    /// # Panics
    ///
    /// Panics if either operand is not a rank-2 tensor, or if the dimensions differ.
    pub fn double_contract(&self, other: &Tensor<T>) -> Tensor<T> {
        assert!(
            self.rank == 2 && other.rank == 2,
            "Double contraction requires rank-2 operands"
        );
        assert_eq!(self.dim, other.dim, "Tensor dimensions must agree");
        Tensor::from_scalar(self.dim, self.components.dot(&other.components))
    }

    /// Sums the diagonal of the last two indices, reducing the rank by two.
    pub fn trace_last_two(&self) -> Tensor<T> {
        assert!(self.rank >= 2, "Trace requires rank of at least 2");
        let d = self.dim;
        let mut result = Tensor::zeros(self.rank - 2, d);
        for (outer, value) in result.components.iter_mut().enumerate() {
            for i in 0..d {
                *value += self.components[outer * d * d + i * d + i];
            }
        }
        result
    }

    /// Extracts the diagonal of the last two indices, reducing the rank by one.
    pub fn diagonal_last_two(&self) -> Tensor<T> {
        assert!(self.rank >= 2, "Diagonal requires rank of at least 2");
        let d = self.dim;
        let mut result = Tensor::zeros(self.rank - 1, d);
        let num_outer = d.pow(self.rank as u32 - 2);
        for outer in 0..num_outer {
            for i in 0..d {
                result.components[outer * d + i] = self.components[outer * d * d + i * d + i];
            }
        }
        result
    }

    pub fn transpose_last_two(&self) -> Tensor<T> {
        assert!(self.rank >= 2, "Transpose requires rank of at least 2");
        let d = self.dim;
        let mut result = self.clone();
        let num_outer = d.pow(self.rank as u32 - 2);
        for outer in 0..num_outer {
            for i in 0..d {
                for j in 0..d {
                    result.components[outer * d * d + j * d + i] = self.components[outer * d * d + i * d + j];
                }
            }
        }
        result
    }

    /// The symmetric part with respect to the last two indices.
    pub fn symmetrize_last_two(&self) -> Tensor<T> {
        let half = T::one() / (T::one() + T::one());
        (self + &self.transpose_last_two()).scale(half)
    }

    /// Embeds this tensor on the diagonal of a tensor whose rank is two higher.
    ///
    /// The result `L` satisfies `L[i][i][..] = self[..]` for every `i`, and is zero elsewhere.
    pub fn lift_diagonal(&self) -> Tensor<T> {
        let d = self.dim;
        let mut result = Tensor::zeros(self.rank + 2, d);
        let inner = self.components.len();
        for i in 0..d {
            let offset = (i * d + i) * inner;
            result
                .components
                .rows_mut(offset, inner)
                .copy_from(&self.components);
        }
        result
    }

    fn assert_same_shape(&self, other: &Tensor<T>) {
        assert_eq!(
            (self.rank, self.dim),
            (other.rank, other.dim),
            "Tensor shapes must agree"
        );
    }
}

impl<'a, T: Real> Add<&'a Tensor<T>> for &'a Tensor<T> {
    type Output = Tensor<T>;

    fn add(self, rhs: &'a Tensor<T>) -> Self::Output {
        self.assert_same_shape(rhs);
        Tensor {
            rank: self.rank,
            dim: self.dim,
            components: &self.components + &rhs.components,
        }
    }
}

impl<T: Real> Add for Tensor<T> {
    type Output = Tensor<T>;

    fn add(mut self, rhs: Tensor<T>) -> Self::Output {
        self += &rhs;
        self
    }
}

impl<'a, T: Real> AddAssign<&'a Tensor<T>> for Tensor<T> {
    fn add_assign(&mut self, rhs: &'a Tensor<T>) {
        self.assert_same_shape(rhs);
        self.components += &rhs.components;
    }
}

impl<'a, T: Real> Sub<&'a Tensor<T>> for &'a Tensor<T> {
    type Output = Tensor<T>;

    fn sub(self, rhs: &'a Tensor<T>) -> Self::Output {
        self.assert_same_shape(rhs);
        Tensor {
            rank: self.rank,
            dim: self.dim,
            components: &self.components - &rhs.components,
        }
    }
}

impl<T: Real> Neg for Tensor<T> {
    type Output = Tensor<T>;

    fn neg(self) -> Self::Output {
        Tensor {
            rank: self.rank,
            dim: self.dim,
            components: -self.components,
        }
    }
}

impl<T: Real> Mul<T> for Tensor<T> {
    type Output = Tensor<T>;

    fn mul(mut self, rhs: T) -> Self::Output {
        self.components *= rhs;
        self
    }
}

impl<'a, T: Real> Mul<&'a Tensor<T>> for &'a Tensor<T> {
    type Output = Tensor<T>;

    fn mul(self, rhs: &'a Tensor<T>) -> Self::Output {
        self.contract(rhs)
    }
}
