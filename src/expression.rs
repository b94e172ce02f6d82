//! Sums and products of field functionals.
//!
//! Expressions are built once when a weak form is authored. All shape checks happen while an
//! expression is constructed, so evaluation at quadrature points never fails because of
//! incompatible shapes.
use crate::accessor::{CellAccessor, EvaluationFlags};
use crate::error::FormError;
use crate::field::FieldFunction;
use crate::shape::Shape;
use crate::tensor::Tensor;
use crate::Real;
use std::collections::BTreeMap;
use std::ops::{Add, Mul, Neg, Sub};

/// Evaluation flags required per slot.
pub type SlotRequirements = BTreeMap<usize, EvaluationFlags>;

/// A symbolic expression over field functionals.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression<T: Real> {
    Field(FieldFunction<T>),
    Sum(Sum<T>),
    Product(Product<T>),
}

/// A non-empty list of terms sharing one shape, evaluated by tensor addition.
#[derive(Debug, Clone, PartialEq)]
pub struct Sum<T: Real> {
    terms: Vec<Expression<T>>,
    shape: Shape,
}

/// A non-empty list of factors sharing one shape, evaluated as a left fold of tensor products.
///
/// The shape of each partial product decides how the next factor is contracted, following
/// [`Shape::contract`].
#[derive(Debug, Clone, PartialEq)]
pub struct Product<T: Real> {
    factors: Vec<Expression<T>>,
    factor_shape: Shape,
    shape: Shape,
}

fn mismatch(left: &Shape, right: &Shape, operation: &'static str) -> FormError {
    FormError::ShapeMismatch {
        left: *left,
        right: Some(*right),
        operation,
    }
}

/// The shape of a combination of two compatible shapes.
///
/// Symmetry survives only if both operands are symmetric.
fn combined_shape(a: &Shape, b: &Shape) -> Shape {
    if a.is_symmetric() && b.is_symmetric() {
        *a
    } else {
        Shape::new(a.rank(), a.dim())
    }
}

impl<T: Real> Sum<T> {
    /// Creates a sum from the given terms.
    ///
    /// Returns an error if there are no terms or if any two terms have incompatible shapes.
    /// Nested sums are flattened.
    pub fn new(terms: Vec<Expression<T>>) -> Result<Self, FormError> {
        let mut iter = terms.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| FormError::InternalConsistency("a sum needs at least one term".to_string()))?;
        let mut sum = Self::from_expression(first);
        for term in iter {
            sum.push(term)?;
        }
        Ok(sum)
    }

    fn from_expression(expression: Expression<T>) -> Self {
        match expression {
            Expression::Sum(sum) => sum,
            other => Self {
                shape: *other.shape(),
                terms: vec![other],
            },
        }
    }

    fn push(&mut self, term: Expression<T>) -> Result<(), FormError> {
        if !self.shape.compatible(term.shape()) {
            return Err(mismatch(&self.shape, term.shape(), "sum"));
        }
        self.shape = combined_shape(&self.shape, term.shape());
        match term {
            Expression::Sum(sum) => self.terms.extend(sum.terms),
            other => self.terms.push(other),
        }
        Ok(())
    }

    pub fn terms(&self) -> &[Expression<T>] {
        &self.terms
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn value<A>(&self, accessor: &A, q: usize) -> eyre::Result<Tensor<T>>
    where
        A: ?Sized + CellAccessor<T>,
    {
        let (first, rest) = self.terms.split_first().ok_or_else(empty_composite)?;
        let mut result = first.value(accessor, q)?;
        for term in rest {
            result += &term.value(accessor, q)?;
        }
        Ok(result)
    }

    /// Multiplies the coefficient of every term by `factor`.
    pub fn scale(&self, factor: T) -> Self {
        Self {
            terms: self.terms.iter().map(|term| term.scale(factor)).collect(),
            shape: self.shape,
        }
    }
}

impl<T: Real> Product<T> {
    /// Creates a product from the given factors.
    ///
    /// All factors must have compatible shapes, and the contraction of the factors must not
    /// exceed the maximum supported rank.
    pub fn new(factors: Vec<Expression<T>>) -> Result<Self, FormError> {
        let mut iter = factors.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| FormError::InternalConsistency("a product needs at least one factor".to_string()))?;
        let mut product = Self {
            factor_shape: *first.shape(),
            shape: *first.shape(),
            factors: vec![first],
        };
        for factor in iter {
            product.push(factor)?;
        }
        Ok(product)
    }

    fn push(&mut self, factor: Expression<T>) -> Result<(), FormError> {
        if !self.factor_shape.compatible(factor.shape()) {
            return Err(mismatch(&self.factor_shape, factor.shape(), "product"));
        }
        self.shape = self.shape.contract(factor.shape())?;
        self.factor_shape = combined_shape(&self.factor_shape, factor.shape());
        self.factors.push(factor);
        Ok(())
    }

    pub fn factors(&self) -> &[Expression<T>] {
        &self.factors
    }

    /// The shape shared by all factors.
    pub fn factor_shape(&self) -> &Shape {
        &self.factor_shape
    }

    /// The shape of the evaluated product.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn value<A>(&self, accessor: &A, q: usize) -> eyre::Result<Tensor<T>>
    where
        A: ?Sized + CellAccessor<T>,
    {
        let (first, rest) = self.factors.split_first().ok_or_else(empty_composite)?;
        let mut result = first.value(accessor, q)?;
        let mut shape = *first.shape();
        for factor in rest {
            let value = factor.value(accessor, q)?;
            result = if shape.is_double_contraction(factor.shape()) {
                result.double_contract(&value)
            } else {
                result.contract(&value)
            };
            shape = shape.contract(factor.shape())?;
        }
        Ok(result)
    }

    /// Scales the product by transforming the coefficient of its first factor only.
    pub fn scale(&self, factor: T) -> Self {
        let mut factors = self.factors.clone();
        if let Some(first) = factors.first_mut() {
            *first = first.scale(factor);
        }
        Self { factors, ..*self }
    }
}

fn empty_composite() -> eyre::Report {
    eyre::Report::new(FormError::InternalConsistency(
        "encountered an empty composite expression".to_string(),
    ))
}

impl<T: Real> Expression<T> {
    pub fn shape(&self) -> &Shape {
        match self {
            Self::Field(field) => field.shape(),
            Self::Sum(sum) => sum.shape(),
            Self::Product(product) => product.shape(),
        }
    }

    /// Evaluates the expression at quadrature point `q` of the accessor's current cell.
    pub fn value<A>(&self, accessor: &A, q: usize) -> eyre::Result<Tensor<T>>
    where
        A: ?Sized + CellAccessor<T>,
    {
        match self {
            Self::Field(field) => field.retrieve(accessor, q),
            Self::Sum(sum) => sum.value(accessor, q),
            Self::Product(product) => product.value(accessor, q),
        }
    }

    /// All field functionals appearing in the expression, in authoring order.
    pub fn fields(&self) -> Vec<&FieldFunction<T>> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, fields: &mut Vec<&'a FieldFunction<T>>) {
        match self {
            Self::Field(field) => fields.push(field),
            Self::Sum(Sum { terms: children, .. }) | Self::Product(Product { factors: children, .. }) => {
                for child in children {
                    child.collect_fields(fields);
                }
            }
        }
    }

    /// The union over all field functionals of the evaluation flags they need, per slot.
    pub fn requirements(&self) -> SlotRequirements {
        let mut requirements = SlotRequirements::new();
        for field in self.fields() {
            *requirements.entry(field.slot()).or_default() |= field.requirements();
        }
        requirements
    }

    pub fn scale(&self, factor: T) -> Self {
        match self {
            Self::Field(field) => Self::Field(field.scale(factor)),
            Self::Sum(sum) => Self::Sum(sum.scale(factor)),
            Self::Product(product) => Self::Product(product.scale(factor)),
        }
    }

    /// The sum of two expressions with compatible shapes.
    ///
    /// Term lists of sums are concatenated, so a field appearing in both operands appears twice
    /// in the result.
    pub fn try_add(self, rhs: impl Into<Expression<T>>) -> Result<Expression<T>, FormError> {
        let mut sum = Sum::from_expression(self);
        sum.push(rhs.into())?;
        Ok(Self::Sum(sum))
    }

    pub fn try_sub(self, rhs: impl Into<Expression<T>>) -> Result<Expression<T>, FormError> {
        self.try_add(-rhs.into())
    }

    /// The tensor product of two expressions whose shapes are compatible.
    ///
    /// If `self` is a product whose factors share the shape of `rhs`, `rhs` is appended as its
    /// last factor. Otherwise a new product of the two operands is created.
    pub fn try_mul(self, rhs: impl Into<Expression<T>>) -> Result<Expression<T>, FormError> {
        let rhs = rhs.into();
        match self {
            Self::Product(mut product) if product.factor_shape.compatible(rhs.shape()) => {
                product.push(rhs)?;
                Ok(Self::Product(product))
            }
            lhs => Ok(Self::Product(Product::new(vec![lhs, rhs])?)),
        }
    }
}

impl<T: Real> From<FieldFunction<T>> for Expression<T> {
    fn from(field: FieldFunction<T>) -> Self {
        Self::Field(field)
    }
}

impl<T: Real> From<Sum<T>> for Expression<T> {
    fn from(sum: Sum<T>) -> Self {
        Self::Sum(sum)
    }
}

impl<T: Real> From<Product<T>> for Expression<T> {
    fn from(product: Product<T>) -> Self {
        Self::Product(product)
    }
}

impl<T: Real> Neg for Expression<T> {
    type Output = Expression<T>;

    fn neg(self) -> Self::Output {
        self.scale(-T::one())
    }
}

impl<T: Real> Neg for Sum<T> {
    type Output = Sum<T>;

    fn neg(self) -> Self::Output {
        self.scale(-T::one())
    }
}

impl<T: Real> Neg for Product<T> {
    type Output = Product<T>;

    fn neg(self) -> Self::Output {
        self.scale(-T::one())
    }
}

fn unwrap_or_panic<T: Real>(result: Result<Expression<T>, FormError>) -> Expression<T> {
    match result {
        Ok(expression) => expression,
        Err(err) => panic!("{}", err),
    }
}

// The operators panic on shape mismatches. `try_add`, `try_sub` and `try_mul` report them instead.
macro_rules! impl_expression_ops {
    ($lhs:ident: $($rhs:ident),*) => {
        $(
            impl<T: Real> Add<$rhs<T>> for $lhs<T> {
                type Output = Expression<T>;

                fn add(self, rhs: $rhs<T>) -> Self::Output {
                    unwrap_or_panic(Expression::from(self).try_add(rhs))
                }
            }

            impl<T: Real> Sub<$rhs<T>> for $lhs<T> {
                type Output = Expression<T>;

                fn sub(self, rhs: $rhs<T>) -> Self::Output {
                    unwrap_or_panic(Expression::from(self).try_sub(rhs))
                }
            }

            impl<T: Real> Mul<$rhs<T>> for $lhs<T> {
                type Output = Expression<T>;

                fn mul(self, rhs: $rhs<T>) -> Self::Output {
                    unwrap_or_panic(Expression::from(self).try_mul(rhs))
                }
            }
        )*
    };
}

impl_expression_ops!(Expression: Expression, FieldFunction, Sum, Product);
impl_expression_ops!(FieldFunction: Expression, FieldFunction, Sum, Product);
impl_expression_ops!(Sum: Expression, FieldFunction, Sum, Product);
impl_expression_ops!(Product: Expression, FieldFunction, Sum, Product);

macro_rules! impl_scalar_mul {
    ($($operand:ident),*) => {
        $(
            impl<T: Real> Mul<T> for $operand<T> {
                type Output = $operand<T>;

                fn mul(self, rhs: T) -> Self::Output {
                    self.scale(rhs)
                }
            }

            impl Mul<$operand<f64>> for f64 {
                type Output = $operand<f64>;

                fn mul(self, rhs: $operand<f64>) -> Self::Output {
                    rhs.scale(self)
                }
            }

            impl Mul<$operand<f32>> for f32 {
                type Output = $operand<f32>;

                fn mul(self, rhs: $operand<f32>) -> Self::Output {
                    rhs.scale(self)
                }
            }
        )*
    };
}

impl_scalar_mul!(Expression, FieldFunction, Sum, Product);
