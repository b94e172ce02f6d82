//! Field functionals: coefficient-scaled derivatives of solution fields at quadrature points.
use crate::accessor::{CellAccessor, EvaluationFlags};
use crate::error::FormError;
use crate::shape::Shape;
use crate::tensor::Tensor;
use crate::Real;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// The derivative of a solution field that a field functional extracts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Value,
    Divergence,
    Gradient,
    SymmetricGradient,
    Curl,
    Laplacian,
    Hessian,
    DiagonalHessian,
}

impl FieldKind {
    /// The evaluation flags an accessor must honor to retrieve this quantity.
    pub fn requirements(&self) -> EvaluationFlags {
        match self {
            Self::Value => EvaluationFlags::VALUES,
            Self::Divergence
            | Self::Gradient
            | Self::SymmetricGradient
            | Self::Curl => EvaluationFlags::GRADIENTS,
            Self::Laplacian | Self::Hessian | Self::DiagonalHessian => EvaluationFlags::HESSIANS,
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Value => "value",
            Self::Divergence => "divergence",
            Self::Gradient => "gradient",
            Self::SymmetricGradient => "symmetric gradient",
            Self::Curl => "curl",
            Self::Laplacian => "Laplacian",
            Self::Hessian => "Hessian",
            Self::DiagonalHessian => "Hessian diagonal",
        };
        write!(f, "{}", name)
    }
}

/// A derivative of the solution field at a given slot, scaled by a coefficient.
///
/// Field functionals are immutable. Derivative operators, negation and scaling all return new
/// functionals that inherit the name and coefficient of their source.
///
/// A functional may be *lifted* with [`lift_divergence`](Self::lift_divergence), in which case
/// the retrieved quantity is embedded on the diagonal of a tensor whose rank is two higher.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFunction<T: Real> {
    kind: FieldKind,
    lifted: bool,
    slot: usize,
    name: Option<String>,
    coefficient: T,
    shape: Shape,
    base: Shape,
}

impl<T: Real> FieldFunction<T> {
    /// The unnamed field at the given slot, with the given value shape.
    pub fn new(slot: usize, shape: Shape) -> Self {
        Self {
            kind: FieldKind::Value,
            lifted: false,
            slot,
            name: None,
            coefficient: T::one(),
            shape,
            base: shape,
        }
    }

    pub fn named(name: impl Into<String>, slot: usize, shape: Shape) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(slot, shape)
        }
    }

    pub fn with_coefficient(self, coefficient: T) -> Self {
        Self { coefficient, ..self }
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether the retrieved quantity is embedded on a diagonal, see
    /// [`lift_divergence`](Self::lift_divergence).
    pub fn is_lifted(&self) -> bool {
        self.lifted
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn coefficient(&self) -> T {
        self.coefficient
    }

    /// The shape of the retrieved quantity.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The shape of the underlying solution field.
    pub fn base_shape(&self) -> &Shape {
        &self.base
    }

    /// A copy of this functional with its coefficient multiplied by `factor`.
    pub fn scale(&self, factor: T) -> Self {
        Self {
            coefficient: self.coefficient * factor,
            ..self.clone()
        }
    }

    fn derived(&self, kind: FieldKind, shape: Shape) -> Self {
        Self {
            kind,
            shape,
            ..self.clone()
        }
    }

    fn not_applicable(&self, operation: &'static str) -> FormError {
        FormError::ShapeMismatch {
            left: self.shape,
            right: None,
            operation,
        }
    }

    /// `grad u`, or the Hessian of `u` when applied to a gradient.
    pub fn gradient(&self) -> Result<Self, FormError> {
        if self.lifted {
            return Err(self.not_applicable("gradient"));
        }
        let kind = match self.kind {
            FieldKind::Value => FieldKind::Gradient,
            FieldKind::Gradient => FieldKind::Hessian,
            _ => return Err(self.not_applicable("gradient")),
        };
        let shape = self.shape.with_rank_offset(1, "gradient")?;
        Ok(self.derived(kind, shape))
    }

    /// `div u` for a vector field, or the Laplacian of `u` when applied to a gradient.
    pub fn divergence(&self) -> Result<Self, FormError> {
        if self.lifted {
            return Err(self.not_applicable("divergence"));
        }
        let kind = match self.kind {
            FieldKind::Value if self.shape.rank() > 0 => FieldKind::Divergence,
            FieldKind::Gradient => FieldKind::Laplacian,
            _ => return Err(self.not_applicable("divergence")),
        };
        let shape = self.shape.with_rank_offset(-1, "divergence")?;
        Ok(self.derived(kind, shape))
    }

    pub fn symmetric_gradient(&self) -> Result<Self, FormError> {
        if self.lifted || self.kind != FieldKind::Value || self.shape.rank() != 1 {
            return Err(self.not_applicable("symmetric gradient"));
        }
        let shape = Shape::symmetric_tensor(self.shape.dim());
        Ok(self.derived(FieldKind::SymmetricGradient, shape))
    }

    /// `curl u`: a scalar in 2D and a vector in 3D.
    pub fn curl(&self) -> Result<Self, FormError> {
        if self.lifted || self.kind != FieldKind::Value {
            return Err(self.not_applicable("curl"));
        }
        let shape = match (self.shape.rank(), self.shape.dim()) {
            (1, 2) => Shape::scalar(2),
            (1, 3) => Shape::vector(3),
            _ => return Err(self.not_applicable("curl")),
        };
        Ok(self.derived(FieldKind::Curl, shape))
    }

    /// Shorthand for `div grad u`.
    pub fn laplacian(&self) -> Result<Self, FormError> {
        self.gradient()?.divergence()
    }

    /// Shorthand for `grad grad u`.
    pub fn hessian(&self) -> Result<Self, FormError> {
        self.gradient()?.gradient()
    }

    /// The diagonal entries `d^2 u / d x_i^2` of the Hessian.
    pub fn diagonal_hessian(&self) -> Result<Self, FormError> {
        if self.lifted {
            return Err(self.not_applicable("Hessian diagonal"));
        }
        let shape = match self.kind {
            FieldKind::Value => self.shape.with_rank_offset(1, "Hessian diagonal")?,
            FieldKind::Hessian => self.shape.with_rank_offset(-1, "Hessian diagonal")?,
            _ => return Err(self.not_applicable("Hessian diagonal")),
        };
        Ok(self.derived(FieldKind::DiagonalHessian, shape))
    }

    /// Lifts this functional `f` to the isotropic tensor `f I`, embedding the retrieved quantity
    /// on the diagonal of a tensor whose rank is two higher.
    ///
    /// Typical uses are `(div u) I` and, for a scalar pressure `p`, the stress contribution `p I`.
    /// Fails if the functional is already lifted or if the lifted rank would exceed
    /// [`MAX_RANK`](crate::shape::MAX_RANK).
    pub fn lift_divergence(&self) -> Result<Self, FormError> {
        if self.lifted {
            return Err(self.not_applicable("divergence lift"));
        }
        let shape = self.shape.with_rank_offset(2, "divergence lift")?;
        Ok(Self {
            lifted: true,
            shape,
            ..self.clone()
        })
    }

    pub fn requirements(&self) -> EvaluationFlags {
        self.kind.requirements()
    }

    /// Checks that the accessor provides a basis of matching valuedness for this functional.
    pub fn validate<A>(&self, accessor: &A) -> Result<(), FormError>
    where
        A: ?Sized + CellAccessor<T>,
    {
        if self.slot >= accessor.n_slots() {
            return Err(FormError::InternalConsistency(format!(
                "field {} refers to slot {}, but the accessor only provides {} slots",
                self,
                self.slot,
                accessor.n_slots()
            )));
        }
        if self.base.dim() != accessor.dim() {
            return Err(FormError::ShapeMismatch {
                left: self.base,
                right: Some(Shape::new(self.base.rank(), accessor.dim())),
                operation: "binding a field to an accessor",
            });
        }
        let basis_rank = accessor.rank(self.slot);
        if basis_rank != self.base.rank() {
            return Err(FormError::BasisMismatch {
                slot: self.slot,
                functional: self.to_string(),
                basis_rank,
            });
        }
        Ok(())
    }

    /// The coefficient times the quantity retrieved from the accessor at quadrature point `q`.
    pub fn retrieve<A>(&self, accessor: &A, q: usize) -> eyre::Result<Tensor<T>>
    where
        A: ?Sized + CellAccessor<T>,
    {
        let slot = self.slot;
        let value = match self.kind {
            FieldKind::Value => accessor.get_value(slot, q)?,
            FieldKind::Divergence => accessor.get_divergence(slot, q)?,
            FieldKind::Gradient => accessor.get_gradient(slot, q)?,
            FieldKind::SymmetricGradient => accessor.get_symmetric_gradient(slot, q)?,
            FieldKind::Curl => accessor.get_curl(slot, q)?,
            FieldKind::Laplacian => accessor.get_laplacian(slot, q)?,
            FieldKind::Hessian => accessor.get_hessian(slot, q)?,
            FieldKind::DiagonalHessian => accessor.get_hessian_diagonal(slot, q)?,
        };
        let value = if self.lifted { value.lift_diagonal() } else { value };
        Ok(value * self.coefficient)
    }
}

impl<T: Real> Display for FieldFunction<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.lifted {
            write!(f, "lifted ")?;
        }
        match &self.name {
            Some(name) => write!(f, "{} of '{}' (slot {})", self.kind, name, self.slot),
            None => write!(f, "{} (slot {})", self.kind, self.slot),
        }
    }
}

impl<T: Real> Neg for FieldFunction<T> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            coefficient: -self.coefficient,
            ..self
        }
    }
}

impl<'a, T: Real> Neg for &'a FieldFunction<T> {
    type Output = FieldFunction<T>;

    fn neg(self) -> Self::Output {
        -self.clone()
    }
}
