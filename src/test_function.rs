//! Test functionals: the destinations that computed quantities are integrated against.
use crate::accessor::{CellAccessor, IntegrationFlags};
use crate::error::FormError;
use crate::expression::{Expression, Product, Sum};
use crate::field::FieldFunction;
use crate::form::FormTerm;
use crate::shape::Shape;
use crate::tensor::Tensor;
use crate::Real;
use eyre::eyre;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::Mul;

/// The derivative of the test function that a submitted quantity is tested against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TestKind {
    Value,
    Divergence,
    Gradient,
    SymmetricGradient,
    Curl,
    Hessian,
}

impl TestKind {
    /// Whether quantities submitted through this kind are integrated against basis values.
    pub fn integrates_value(&self) -> bool {
        matches!(self, Self::Value)
    }

    /// Whether quantities submitted through this kind are integrated against basis gradients.
    pub fn integrates_gradient(&self) -> bool {
        matches!(
            self,
            Self::Divergence | Self::Gradient | Self::SymmetricGradient | Self::Curl
        )
    }

    pub fn integration_flags(&self) -> IntegrationFlags {
        IntegrationFlags {
            values: self.integrates_value(),
            gradients: self.integrates_gradient(),
        }
    }
}

impl Display for TestKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Value => "test value",
            Self::Divergence => "test divergence",
            Self::Gradient => "test gradient",
            Self::SymmetricGradient => "test symmetric gradient",
            Self::Curl => "test curl",
            Self::Hessian => "test Hessian",
        };
        write!(f, "{}", name)
    }
}

/// A test functional applied to the test function of a given slot.
///
/// The functional carries the shape of the quantity it expects to receive, together with the
/// shape of the test function itself (its *base* shape), which determines whether the slot
/// must be backed by a scalar- or vector-valued basis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TestFunction {
    kind: TestKind,
    slot: usize,
    shape: Shape,
    base: Shape,
}

impl TestFunction {
    /// The test function itself at the given slot, with the given value shape.
    pub fn value(slot: usize, shape: Shape) -> Self {
        Self {
            kind: TestKind::Value,
            slot,
            shape,
            base: shape,
        }
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The shape of the quantity that must be submitted through this functional.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The shape of the underlying test function.
    pub fn base_shape(&self) -> &Shape {
        &self.base
    }

    fn derived(&self, kind: TestKind, shape: Shape) -> Self {
        Self {
            kind,
            shape,
            ..*self
        }
    }

    fn require_value(&self, operation: &'static str) -> Result<(), FormError> {
        if self.kind == TestKind::Value {
            Ok(())
        } else {
            Err(FormError::ShapeMismatch {
                left: self.shape,
                right: None,
                operation,
            })
        }
    }

    fn require_vector_valued(&self) -> Result<(), FormError> {
        if self.base.rank() > 0 {
            Ok(())
        } else {
            Err(FormError::unsupported(
                "Unsupported operator for scalar-valued test function.",
            ))
        }
    }

    /// `div v` for a vector-valued test function `v`.
    pub fn divergence(&self) -> Result<Self, FormError> {
        self.require_value("test divergence")?;
        self.require_vector_valued()?;
        let shape = self.shape.with_rank_offset(-1, "test divergence")?;
        Ok(self.derived(TestKind::Divergence, shape))
    }

    /// `grad v`, or the Hessian of `v` when applied to a test gradient.
    pub fn gradient(&self) -> Result<Self, FormError> {
        let kind = match self.kind {
            TestKind::Value => TestKind::Gradient,
            TestKind::Gradient => TestKind::Hessian,
            _ => {
                return Err(FormError::ShapeMismatch {
                    left: self.shape,
                    right: None,
                    operation: "test gradient",
                })
            }
        };
        let shape = self.shape.with_rank_offset(1, "test gradient")?;
        Ok(self.derived(kind, shape))
    }

    pub fn symmetric_gradient(&self) -> Result<Self, FormError> {
        self.require_value("test symmetric gradient")?;
        self.require_vector_valued()?;
        if self.shape.rank() != 1 {
            return Err(FormError::ShapeMismatch {
                left: self.shape,
                right: None,
                operation: "test symmetric gradient",
            });
        }
        Ok(self.derived(TestKind::SymmetricGradient, Shape::symmetric_tensor(self.shape.dim())))
    }

    /// `curl v`: a scalar in 2D and a vector in 3D.
    pub fn curl(&self) -> Result<Self, FormError> {
        self.require_value("test curl")?;
        self.require_vector_valued()?;
        let shape = match (self.shape.rank(), self.shape.dim()) {
            (1, 2) => Shape::scalar(2),
            (1, 3) => Shape::vector(3),
            _ => {
                return Err(FormError::ShapeMismatch {
                    left: self.shape,
                    right: None,
                    operation: "test curl",
                })
            }
        };
        Ok(self.derived(TestKind::Curl, shape))
    }

    pub fn integration_flags(&self) -> IntegrationFlags {
        self.kind.integration_flags()
    }

    /// Checks that this functional can be submitted into the given accessor.
    pub fn validate<T, A>(&self, accessor: &A) -> Result<(), FormError>
    where
        T: Real,
        A: ?Sized + CellAccessor<T>,
    {
        if self.slot >= accessor.n_slots() {
            return Err(FormError::InternalConsistency(format!(
                "{} refers to slot {}, but the accessor only provides {} slots",
                self.kind,
                self.slot,
                accessor.n_slots()
            )));
        }
        if self.base.dim() != accessor.dim() {
            return Err(FormError::ShapeMismatch {
                left: self.base,
                right: Some(Shape::new(self.base.rank(), accessor.dim())),
                operation: "binding a test function to an accessor",
            });
        }
        let basis_rank = accessor.rank(self.slot);
        if basis_rank != self.base.rank() {
            return Err(FormError::BasisMismatch {
                slot: self.slot,
                functional: self.kind.to_string(),
                basis_rank,
            });
        }
        if self.kind == TestKind::Hessian {
            return Err(FormError::unsupported("submitting into a test Hessian is not implemented yet"));
        }
        Ok(())
    }

    /// Submits a computed quantity at quadrature point `q` into the accumulation buffer that
    /// corresponds to this functional.
    pub fn submit<T, A>(&self, accessor: &mut A, q: usize, value: &Tensor<T>) -> eyre::Result<()>
    where
        T: Real,
        A: ?Sized + CellAccessor<T>,
    {
        match self.kind {
            TestKind::Value => accessor.submit_value(self.slot, value, q),
            TestKind::Divergence => accessor.submit_divergence(self.slot, value, q),
            TestKind::Gradient => accessor.submit_gradient(self.slot, value, q),
            TestKind::SymmetricGradient => accessor.submit_symmetric_gradient(self.slot, value, q),
            TestKind::Curl => accessor.submit_curl(self.slot, value, q),
            TestKind::Hessian => Err(eyre!(FormError::unsupported(
                "submitting into a test Hessian is not implemented yet"
            ))),
        }
    }
}

impl<T: Real> Mul<Expression<T>> for TestFunction {
    type Output = FormTerm<T>;

    /// Pairs this test functional with an expression.
    ///
    /// # Panics
    ///
    /// Panics if the shape of the expression is not compatible with the shape of the functional.
    /// Use [`FormTerm::new`] for a fallible alternative.
    fn mul(self, rhs: Expression<T>) -> Self::Output {
        match FormTerm::new(self, rhs) {
            Ok(term) => term,
            Err(err) => panic!("{}", err),
        }
    }
}

macro_rules! impl_test_mul {
    ($($operand:ident),*) => {
        $(
            impl<T: Real> Mul<$operand<T>> for TestFunction {
                type Output = FormTerm<T>;

                fn mul(self, rhs: $operand<T>) -> Self::Output {
                    self * Expression::from(rhs)
                }
            }
        )*
    };
}

impl_test_mul!(FieldFunction, Sum, Product);
