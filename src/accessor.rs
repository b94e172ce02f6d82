//! The per-cell data provider consumed by forms and operators.
use crate::tensor::Tensor;
use crate::vector::BlockVector;
use crate::Real;
use eyre::eyre;
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Which quantities an accessor must compute for a slot when evaluating a cell.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationFlags {
    pub values: bool,
    pub gradients: bool,
    pub hessians: bool,
}

impl EvaluationFlags {
    pub const NONE: Self = Self {
        values: false,
        gradients: false,
        hessians: false,
    };
    pub const VALUES: Self = Self {
        values: true,
        ..Self::NONE
    };
    pub const GRADIENTS: Self = Self {
        gradients: true,
        ..Self::NONE
    };
    pub const HESSIANS: Self = Self {
        hessians: true,
        ..Self::NONE
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

impl BitOr for EvaluationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self {
            values: self.values || rhs.values,
            gradients: self.gradients || rhs.gradients,
            hessians: self.hessians || rhs.hessians,
        }
    }
}

impl BitOrAssign for EvaluationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Which submitted quantities an accessor must integrate for a slot.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationFlags {
    pub values: bool,
    pub gradients: bool,
}

impl IntegrationFlags {
    pub const NONE: Self = Self {
        values: false,
        gradients: false,
    };
    pub const VALUES: Self = Self {
        values: true,
        gradients: false,
    };
    pub const GRADIENTS: Self = Self {
        values: false,
        gradients: true,
    };
}

impl BitOr for IntegrationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self {
            values: self.values || rhs.values,
            gradients: self.gradients || rhs.gradients,
        }
    }
}

impl BitOrAssign for IntegrationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Per-cell access to finite element data for one or more fields ("slots").
///
/// The life cycle for a single cell is
///
/// 1. [`reinit`](Self::reinit) to select the cell,
/// 2. [`read_dof_values`](Self::read_dof_values) (or direct writes through
///    [`dof_values_mut`](Self::dof_values_mut)) to fill the local coefficients,
/// 3. [`evaluate`](Self::evaluate) to compute the quantities requested by the evaluation flags
///    and clear all submission buffers,
/// 4. `get_*` and `submit_*` calls at each quadrature point,
/// 5. [`integrate`](Self::integrate), which overwrites the local coefficients with the integral
///    of the submitted quantities tested against every basis function,
/// 6. [`distribute_local_to_global`](Self::distribute_local_to_global) to add the local
///    coefficients into a global vector.
///
/// Submissions *accumulate*: submitting twice at the same quadrature point adds the values.
///
/// Gradients follow the convention `grad u [i][j] = d u_i / d x_j`. The provided derived
/// getters and submitters (divergence, symmetric gradient, curl, Laplacian, Hessian diagonal)
/// are expressed through gradients and Hessians, and may be overridden by implementors
/// with a more efficient path.
///
/// An accessor holds mutable per-cell state and must not be shared between concurrent cell
/// invocations. Operators obtain one accessor per worker by cloning a configured template.
pub trait CellAccessor<T: Real> {
    /// Number of fields this accessor provides.
    fn n_slots(&self) -> usize;

    fn n_cells(&self) -> usize;

    fn n_q_points(&self) -> usize;

    /// The spatial dimension.
    fn dim(&self) -> usize;

    /// The rank of the basis at the given slot: 0 for scalar-valued, 1 for vector-valued.
    fn rank(&self, slot: usize) -> usize;

    /// The number of global degrees of freedom of the field at the given slot.
    fn n_dofs(&self, slot: usize) -> usize;

    fn dofs_per_cell(&self, slot: usize) -> usize;

    fn tensor_dofs_per_cell(&self, slot: usize) -> usize {
        self.dofs_per_cell(slot)
    }

    fn set_evaluation_flags(&mut self, slot: usize, flags: EvaluationFlags);

    fn set_integration_flags(&mut self, slot: usize, flags: IntegrationFlags);

    fn reinit(&mut self, cell: usize);

    fn read_dof_values(&mut self, src: &BlockVector<T>);

    /// The local coefficients of the field at the given slot.
    fn dof_values(&self, slot: usize) -> &[T];

    fn dof_values_mut(&mut self, slot: usize) -> &mut [T];

    fn evaluate(&mut self);

    fn integrate(&mut self);

    fn distribute_local_to_global(&self, dst: &mut BlockVector<T>);

    fn get_value(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>>;

    fn get_gradient(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>>;

    fn get_hessian(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>>;

    fn submit_value(&mut self, slot: usize, value: &Tensor<T>, q: usize) -> eyre::Result<()>;

    fn submit_gradient(&mut self, slot: usize, gradient: &Tensor<T>, q: usize) -> eyre::Result<()>;

    fn get_divergence(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>> {
        require_vector_valued(self, slot, "divergence")?;
        Ok(self.get_gradient(slot, q)?.trace_last_two())
    }

    fn get_symmetric_gradient(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>> {
        require_vector_valued(self, slot, "symmetric gradient")?;
        Ok(self.get_gradient(slot, q)?.symmetrize_last_two())
    }

    /// The curl of a vector field: a scalar in 2D and a vector in 3D.
    fn get_curl(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>> {
        require_vector_valued(self, slot, "curl")?;
        let g = self.get_gradient(slot, q)?;
        match self.dim() {
            2 => Ok(Tensor::from_scalar(2, g.entry(&[1, 0]) - g.entry(&[0, 1]))),
            3 => Ok(Tensor::from_slice(
                1,
                3,
                &[
                    g.entry(&[2, 1]) - g.entry(&[1, 2]),
                    g.entry(&[0, 2]) - g.entry(&[2, 0]),
                    g.entry(&[1, 0]) - g.entry(&[0, 1]),
                ],
            )),
            dim => Err(eyre!("curl is not defined in dimension {}", dim)),
        }
    }

    fn get_laplacian(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>> {
        Ok(self.get_hessian(slot, q)?.trace_last_two())
    }

    fn get_hessian_diagonal(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>> {
        Ok(self.get_hessian(slot, q)?.diagonal_last_two())
    }

    fn submit_divergence(&mut self, slot: usize, value: &Tensor<T>, q: usize) -> eyre::Result<()> {
        require_vector_valued(self, slot, "divergence")?;
        // (s, div v) = (s I, grad v)
        let gradient = value.lift_diagonal();
        self.submit_gradient(slot, &gradient, q)
    }

    fn submit_symmetric_gradient(&mut self, slot: usize, value: &Tensor<T>, q: usize) -> eyre::Result<()> {
        require_vector_valued(self, slot, "symmetric gradient")?;
        self.submit_gradient(slot, &value.symmetrize_last_two(), q)
    }

    fn submit_curl(&mut self, slot: usize, value: &Tensor<T>, q: usize) -> eyre::Result<()> {
        require_vector_valued(self, slot, "curl")?;
        let dim = self.dim();
        let mut gradient = Tensor::zeros(2, dim);
        match dim {
            2 => {
                let c = value
                    .as_scalar()
                    .ok_or_else(|| eyre!("curl in 2D must be submitted as a scalar"))?;
                *gradient.entry_mut(&[1, 0]) += c;
                *gradient.entry_mut(&[0, 1]) -= c;
            }
            3 => {
                let c = |i: usize| value.entry(&[i]);
                *gradient.entry_mut(&[2, 1]) += c(0);
                *gradient.entry_mut(&[1, 2]) -= c(0);
                *gradient.entry_mut(&[0, 2]) += c(1);
                *gradient.entry_mut(&[2, 0]) -= c(1);
                *gradient.entry_mut(&[1, 0]) += c(2);
                *gradient.entry_mut(&[0, 1]) -= c(2);
            }
            dim => return Err(eyre!("curl is not defined in dimension {}", dim)),
        }
        self.submit_gradient(slot, &gradient, q)
    }
}

fn require_vector_valued<T, A>(accessor: &A, slot: usize, operation: &str) -> eyre::Result<()>
where
    T: Real,
    A: ?Sized + CellAccessor<T>,
{
    if accessor.rank(slot) > 0 {
        Ok(())
    } else {
        Err(eyre!(
            "the finite element in slot {} must be vector valued to compute its {}",
            slot,
            operation
        ))
    }
}
