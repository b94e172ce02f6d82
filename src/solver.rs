//! Preconditioned conjugate gradients for matrix-free operators.
use crate::accessor::CellAccessor;
use crate::integrator::MatrixFreeIntegrator;
use crate::vector::BlockVector;
use crate::Real;
use eyre::eyre;
use log::debug;
use nalgebra::convert;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// A linear operator acting on block vectors.
pub trait LinearOperator<T: Real> {
    /// `y = A x`
    fn apply(&self, y: &mut BlockVector<T>, x: &BlockVector<T>) -> eyre::Result<()>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Real,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: &mut BlockVector<T>, x: &BlockVector<T>) -> eyre::Result<()> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T, A> LinearOperator<T> for MatrixFreeIntegrator<T, A>
where
    T: Real,
    A: CellAccessor<T> + Clone + Send + Sync,
{
    fn apply(&self, y: &mut BlockVector<T>, x: &BlockVector<T>) -> eyre::Result<()> {
        self.vmult(y, x)
    }
}

pub struct IdentityOperator;

impl<T: Real> LinearOperator<T> for IdentityOperator {
    fn apply(&self, y: &mut BlockVector<T>, x: &BlockVector<T>) -> eyre::Result<()> {
        y.copy_from(x);
        Ok(())
    }
}

/// Multiplication with a stored inverse diagonal.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T: Real> {
    inverse_diagonal: BlockVector<T>,
}

impl<T: Real> JacobiPreconditioner<T> {
    pub fn new(inverse_diagonal: BlockVector<T>) -> Self {
        Self { inverse_diagonal }
    }

    /// Uses the inverse diagonal of an operator on which
    /// [`compute_diagonal`](MatrixFreeIntegrator::compute_diagonal) has been called.
    pub fn from_integrator<A>(integrator: &MatrixFreeIntegrator<T, A>) -> eyre::Result<Self>
    where
        A: CellAccessor<T> + Clone + Send + Sync,
    {
        integrator
            .inverse_diagonal()
            .cloned()
            .map(Self::new)
            .ok_or_else(|| eyre!("the diagonal of the operator has not been computed"))
    }

    pub fn inverse_diagonal(&self) -> &BlockVector<T> {
        &self.inverse_diagonal
    }
}

impl<T: Real> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, y: &mut BlockVector<T>, x: &BlockVector<T>) -> eyre::Result<()> {
        *y = self.inverse_diagonal.component_mul(x);
        Ok(())
    }
}

/// Settings for [`ConjugateGradient`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgSettings {
    pub max_iterations: usize,
    /// Relative residual tolerance `||r|| <= tol * ||b||`.
    ///
    /// Note that the residual is the *approximate* residual updated by the CG recurrence.
    pub tolerance: f64,
}

impl Default for CgSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-8,
        }
    }
}

impl CgSettings {
    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self { max_iterations, ..self }
    }

    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self { tolerance, ..self }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(eyre::Report),
    PreconditionerError(eyre::Report),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => write!(f, "Error applying operator: {}", err),
            Self::PreconditionerError(err) => write!(f, "Error applying preconditioner: {}", err),
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached.", max_iter)
            }
        }
    }
}

#[derive(Debug)]
pub struct SolveError {
    pub output: CgOutput,
    pub kind: SolveErrorKind,
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CG solve failed after {} iterations. Error: {}",
            self.output.num_iterations, self.kind
        )
    }
}

impl Error for SolveError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgOutput {
    /// Number of updates made to the initial guess.
    pub num_iterations: usize,
}

/// Preconditioned conjugate gradients for symmetric positive definite operators.
#[derive(Debug)]
pub struct ConjugateGradient<A, P> {
    operator: A,
    preconditioner: P,
    settings: CgSettings,
}

impl<A> ConjugateGradient<A, IdentityOperator> {
    pub fn new(operator: A) -> Self {
        Self {
            operator,
            preconditioner: IdentityOperator,
            settings: CgSettings::default(),
        }
    }
}

impl<A, P> ConjugateGradient<A, P> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<A, P2> {
        ConjugateGradient {
            operator: self.operator,
            preconditioner,
            settings: self.settings,
        }
    }

    pub fn with_settings(self, settings: CgSettings) -> Self {
        Self { settings, ..self }
    }

    pub fn settings(&self) -> &CgSettings {
        &self.settings
    }
}

impl<A, P> ConjugateGradient<A, P> {
    /// Solves `A x = b`, using the given `x` as initial guess.
    #[allow(non_snake_case)]
    pub fn solve_with_guess<T>(&self, b: &BlockVector<T>, x: &mut BlockVector<T>) -> Result<CgOutput, SolveError>
    where
        T: Real,
        A: LinearOperator<T>,
        P: LinearOperator<T>,
    {
        use SolveErrorKind::*;
        assert!(b.has_same_structure(x), "Right-hand side and solution must have the same structure");

        let mut output = CgOutput { num_iterations: 0 };
        let tol: T = convert(self.settings.tolerance);

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            return Ok(output);
        }

        let mut Ax = b.zeros_like();
        let mut z = b.zeros_like();
        let mut Ap = b.zeros_like();

        // r = b - Ax
        if let Err(err) = self.operator.apply(&mut Ax, x) {
            return Err(SolveError {
                output,
                kind: OperatorError(err),
            });
        }
        let mut r = b.clone();
        r.axpy(-T::one(), &Ax);

        // z = Pr
        if let Err(err) = self.preconditioner.apply(&mut z, &r) {
            return Err(SolveError {
                output,
                kind: PreconditionerError(err),
            });
        }

        let mut p = z.clone();
        let mut zTr = z.dot(&r);

        loop {
            let r_norm = r.norm();
            debug!(
                "CG iteration {}: relative residual {}",
                output.num_iterations,
                r_norm / b_norm
            );
            if r_norm <= tol * b_norm {
                break;
            } else if output.num_iterations >= self.settings.max_iterations {
                return Err(SolveError {
                    output,
                    kind: MaxIterationsReached {
                        max_iter: self.settings.max_iterations,
                    },
                });
            }

            // Ap = A * p
            if let Err(err) = self.operator.apply(&mut Ap, &p) {
                return Err(SolveError {
                    output,
                    kind: OperatorError(err),
                });
            }
            let pAp = p.dot(&Ap);

            if pAp <= T::zero() {
                return Err(SolveError {
                    output,
                    kind: IndefiniteOperator,
                });
            }
            if zTr <= T::zero() {
                return Err(SolveError {
                    output,
                    kind: IndefinitePreconditioner,
                });
            }

            let alpha = zTr / pAp;
            x.axpy(alpha, &p);
            r.axpy(-alpha, &Ap);

            // Number of iterations corresponds to number of updates to the x vector
            output.num_iterations += 1;

            // z <- P r
            if let Err(err) = self.preconditioner.apply(&mut z, &r) {
                return Err(SolveError {
                    output,
                    kind: PreconditionerError(err),
                });
            }
            let zTr_next = z.dot(&r);
            let beta = zTr_next / zTr;

            // p <- z + beta * p
            let mut p_next = z.clone();
            p_next.axpy(beta, &p);
            p = p_next;

            zTr = zTr_next;
        }

        Ok(output)
    }
}
