//! Shape descriptors for symbolic tensor quantities.
use crate::error::FormError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// The highest tensor rank supported by forms.
pub const MAX_RANK: usize = 4;

/// The algebraic type of a tensor quantity: its rank and the dimension of each index.
///
/// A symmetric tensor is compatible with a general tensor of the same rank and dimension,
/// see [`Shape::compatible`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    rank: usize,
    dim: usize,
    symmetric: bool,
}

impl Shape {
    /// Creates a general (non-symmetric) shape.
    ///
    /// # Panics
    ///
    /// Panics if `dim == 0` or `rank > MAX_RANK`.
    pub fn new(rank: usize, dim: usize) -> Self {
        assert!(dim >= 1, "Spatial dimension must be at least 1");
        assert!(rank <= MAX_RANK, "Rank must not exceed {}", MAX_RANK);
        Self {
            rank,
            dim,
            symmetric: false,
        }
    }

    pub fn scalar(dim: usize) -> Self {
        Self::new(0, dim)
    }

    pub fn vector(dim: usize) -> Self {
        Self::new(1, dim)
    }

    /// A symmetric rank-2 tensor shape.
    pub fn symmetric_tensor(dim: usize) -> Self {
        Self {
            symmetric: true,
            ..Self::new(2, dim)
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Number of scalar components of a tensor with this shape.
    pub fn num_components(&self) -> usize {
        self.dim.pow(self.rank as u32)
    }

    /// Whether two quantities of these shapes may be combined.
    ///
    /// Rank and dimension must match exactly. Symmetry is ignored, so that a symmetric tensor
    /// and a general tensor of equal rank and dimension are mutually compatible.
    pub fn compatible(&self, other: &Shape) -> bool {
        self.rank == other.rank && self.dim == other.dim
    }

    /// Returns a shape with the rank changed by the given amount.
    ///
    /// The result is never symmetric.
    pub fn with_rank_offset(&self, offset: isize, operation: &'static str) -> Result<Shape, FormError> {
        let new_rank = self.rank as isize + offset;
        if new_rank < 0 || new_rank > MAX_RANK as isize {
            Err(FormError::ShapeMismatch {
                left: *self,
                right: None,
                operation,
            })
        } else {
            Ok(Shape::new(new_rank as usize, self.dim))
        }
    }

    /// Whether the product of two tensors with these shapes contracts both of their indices.
    ///
    /// This is the case for two symmetric rank-2 tensors, whose product is the scalar
    /// `A : B = A_ij B_ij`.
    pub fn is_double_contraction(&self, other: &Shape) -> bool {
        self.symmetric && other.symmetric && self.rank == 2 && other.rank == 2 && self.dim == other.dim
    }

    /// The shape of the tensor product of tensors with shapes `self` and `other`.
    ///
    /// A rank-0 operand scales the other operand. Two symmetric rank-2 operands are contracted
    /// over both indices to a scalar, see [`is_double_contraction`](Self::is_double_contraction).
    /// Otherwise the last index of `self` is contracted with the first index of `other`, so
    /// the result has rank `self.rank() + other.rank() - 2`.
    pub fn contract(&self, other: &Shape) -> Result<Shape, FormError> {
        let mismatch = || FormError::ShapeMismatch {
            left: *self,
            right: Some(*other),
            operation: "tensor product",
        };
        if self.dim != other.dim {
            return Err(mismatch());
        }
        if self.is_double_contraction(other) {
            return Ok(Shape::scalar(self.dim));
        }
        match (self.rank, other.rank) {
            (0, _) => Ok(Shape::new(other.rank, other.dim)),
            (_, 0) => Ok(Shape::new(self.rank, self.dim)),
            (r1, r2) if r1 + r2 - 2 <= MAX_RANK => Ok(Shape::new(r1 + r2 - 2, self.dim)),
            _ => Err(mismatch()),
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = if self.symmetric { "symmetric tensor" } else { "tensor" };
        write!(f, "{} of rank {} in dimension {}", kind, self.rank, self.dim)
    }
}
