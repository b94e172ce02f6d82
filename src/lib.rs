//! Symbolic weak forms evaluated by matrix-free finite element operators.
//!
//! A weak form is authored once as an algebraic expression over *field functionals*
//! (derivatives of solution fields, see [`field`]) paired with *test functionals*
//! (see [`test_function`]). The [`integrator`] then evaluates the unmodified expression at every
//! quadrature point of every cell during a matrix-free operator application, driven by a
//! per-cell accessor implementing [`accessor::CellAccessor`].
//!
//! ```
//! use fenris_forms::evaluation::{FieldBasis, LagrangeEvaluation};
//! use fenris_forms::field::FieldFunction;
//! use fenris_forms::grid::CartesianGrid;
//! use fenris_forms::integrator::MatrixFreeIntegrator;
//! use fenris_forms::matrix_free::MatrixFreeData;
//! use fenris_forms::shape::Shape;
//! use fenris_forms::test_function::TestFunction;
//!
//! # fn main() -> eyre::Result<()> {
//! let grid = CartesianGrid::unit_cube(2, 4)?;
//! let evaluation = LagrangeEvaluation::new(grid, &[FieldBasis::Scalar], 2)?;
//!
//! // The Laplace operator: (grad v, grad u)
//! let u = FieldFunction::<f64>::named("u", 0, Shape::scalar(2));
//! let v = TestFunction::value(0, Shape::scalar(2));
//! let form = (v.gradient()? * u.gradient()?).into_form();
//!
//! let data = MatrixFreeData::from_accessor(&evaluation, Default::default());
//! let operator = MatrixFreeIntegrator::initialize(data, form, evaluation)?;
//! let x = operator.initialize_dof_vector();
//! let mut y = operator.initialize_dof_vector();
//! operator.vmult(&mut y, &x)?;
//! # Ok(())
//! # }
//! ```
use nalgebra::RealField;

pub mod accessor;
pub mod error;
pub mod evaluation;
pub mod expression;
pub mod field;
pub mod form;
pub mod grid;
pub mod integrator;
pub mod matrix_free;
pub mod quadrature;
pub mod shape;
pub mod solver;
pub mod tensor;
pub mod test_function;
pub mod vector;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;

/// Scalar types usable in forms and operators.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
