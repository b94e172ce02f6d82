//! Matrix-free operators defined by weak forms.
use crate::accessor::CellAccessor;
use crate::error::FormError;
use crate::form::Form;
use crate::matrix_free::MatrixFreeData;
use crate::vector::BlockVector;
use crate::Real;
use eyre::eyre;
use log::{debug, warn};
use std::sync::Arc;

/// A linear operator whose action is computed cell by cell from a weak form, without ever
/// assembling a matrix.
///
/// The form and the loop data are shared immutably between all workers of a cell loop. Each
/// worker evaluates the form with its own clone of the accessor.
#[derive(Debug, Clone)]
pub struct MatrixFreeIntegrator<T: Real, A> {
    data: Arc<MatrixFreeData<T>>,
    form: Arc<Form<T>>,
    accessor: A,
    inverse_diagonal: Option<BlockVector<T>>,
    nonlinear_blocks: Vec<bool>,
    frozen: Option<BlockVector<T>>,
}

/// Evaluates and integrates the form on the accessor's current cell.
///
/// The local degrees of freedom must already hold the input values. On return they hold
/// the integrated result.
fn do_operation_on_cell<T, A>(form: &Form<T>, accessor: &mut A) -> eyre::Result<()>
where
    T: Real,
    A: ?Sized + CellAccessor<T>,
{
    accessor.evaluate();
    for q in 0..accessor.n_q_points() {
        form.evaluate(accessor, q)?;
    }
    accessor.integrate();
    Ok(())
}

impl<T, A> MatrixFreeIntegrator<T, A>
where
    T: Real,
    A: CellAccessor<T> + Clone + Send + Sync,
{
    /// Binds a form and an accessor to the given loop data.
    ///
    /// The form is validated against the accessor, and the accessor's evaluation and
    /// integration flags are configured from the form. Fails with a [`FormError`] if the form
    /// does not fit the accessor, or if the loop data does not match the accessor.
    pub fn initialize(data: MatrixFreeData<T>, form: Form<T>, mut accessor: A) -> eyre::Result<Self> {
        form.validate(&accessor)?;

        if data.n_cells() != accessor.n_cells() {
            return Err(eyre!(FormError::InternalConsistency(format!(
                "loop data has {} cells, but the accessor has {} cells",
                data.n_cells(),
                accessor.n_cells()
            ))));
        }
        let accessor_block_sizes: Vec<_> = (0..accessor.n_slots()).map(|slot| accessor.n_dofs(slot)).collect();
        if data.block_sizes() != accessor_block_sizes.as_slice() {
            return Err(eyre!(FormError::InternalConsistency(format!(
                "loop data has block sizes {:?}, but the accessor has block sizes {:?}",
                data.block_sizes(),
                accessor_block_sizes
            ))));
        }

        form.set_evaluation_flags(&mut accessor);
        form.set_integration_flags(&mut accessor);
        debug!(
            "Initialized matrix-free integrator: {} cells in {} ranges, {} blocks, evaluation flags {:?}, \
             integration flags {:?}",
            data.n_cells(),
            data.cell_ranges().len(),
            data.n_blocks(),
            form.evaluation_flags(),
            form.integration_flags()
        );

        Ok(Self {
            data: Arc::new(data),
            form: Arc::new(form),
            accessor,
            inverse_diagonal: None,
            nonlinear_blocks: Vec::new(),
            frozen: None,
        })
    }

    pub fn data(&self) -> &MatrixFreeData<T> {
        &self.data
    }

    pub fn form(&self) -> &Form<T> {
        &self.form
    }

    /// The configured accessor that workers are cloned from.
    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    /// A zero vector with the block structure the operator acts on.
    pub fn initialize_dof_vector(&self) -> BlockVector<T> {
        self.data.create_vector()
    }

    fn check_vector(&self, vector: &BlockVector<T>, name: &str) -> eyre::Result<()> {
        if vector.block_sizes() != self.data.block_sizes() {
            Err(eyre!(
                "{} has block sizes {:?}, but the operator expects {:?}",
                name,
                vector.block_sizes(),
                self.data.block_sizes()
            ))
        } else {
            Ok(())
        }
    }

    /// `dst += A src`, ignoring constraints.
    pub fn apply_add(&self, dst: &mut BlockVector<T>, src: &BlockVector<T>) -> eyre::Result<()> {
        self.check_vector(dst, "destination")?;
        self.check_vector(src, "source")?;
        let form = &*self.form;
        self.data.cell_loop(&self.accessor, dst, |accessor, _cell| {
            accessor.read_dof_values(src);
            do_operation_on_cell(form, accessor)
        })
    }

    /// `dst += A src`, with constrained entries passed through.
    fn vmult_add_linear(&self, dst: &mut BlockVector<T>, src: &BlockVector<T>) -> eyre::Result<()> {
        if self.data.has_constraints() {
            let mut unconstrained_src = src.clone();
            self.data.zero_constrained_entries(&mut unconstrained_src);
            let mut result = self.initialize_dof_vector();
            self.apply_add(&mut result, &unconstrained_src)?;
            self.data.zero_constrained_entries(&mut result);
            self.data.add_constrained_entries(&mut result, src);
            dst.add_assign(&result);
            Ok(())
        } else {
            self.apply_add(dst, src)
        }
    }

    /// The source actually fed to the cell loop when nonlinear blocks are set.
    fn effective_source<'a>(&'a self, src: &'a BlockVector<T>) -> std::borrow::Cow<'a, BlockVector<T>> {
        match &self.frozen {
            Some(frozen) => {
                let mut source = frozen.clone();
                for (block, &nonlinear) in self.nonlinear_blocks.iter().enumerate() {
                    if !nonlinear {
                        source.block_mut(block).copy_from(src.block(block));
                    }
                }
                std::borrow::Cow::Owned(source)
            }
            None => std::borrow::Cow::Borrowed(src),
        }
    }

    /// `dst = A src`.
    ///
    /// Constrained entries are passed through, i.e. `dst[c] = src[c]`, and the values of
    /// constrained source entries do not contribute to other entries. If nonlinear blocks
    /// have been declared with [`set_nonlinearities`](Self::set_nonlinearities), those blocks of
    /// `dst` are copied from `src`, and all other blocks are computed with the nonlinear blocks
    /// of the input replaced by the frozen reference values.
    pub fn vmult(&self, dst: &mut BlockVector<T>, src: &BlockVector<T>) -> eyre::Result<()> {
        self.check_vector(dst, "destination")?;
        self.check_vector(src, "source")?;
        dst.fill(T::zero());
        let source = self.effective_source(src);
        self.vmult_add_linear(dst, &source)?;
        self.copy_nonlinear_blocks(dst, src);
        Ok(())
    }

    /// `dst += A src`, with the same treatment of constraints and nonlinear blocks as
    /// [`vmult`](Self::vmult).
    pub fn vmult_add(&self, dst: &mut BlockVector<T>, src: &BlockVector<T>) -> eyre::Result<()> {
        self.check_vector(dst, "destination")?;
        self.check_vector(src, "source")?;
        let source = self.effective_source(src);
        if self.frozen.is_some() {
            let mut result = self.initialize_dof_vector();
            self.vmult_add_linear(&mut result, &source)?;
            self.copy_nonlinear_blocks(&mut result, src);
            dst.add_assign(&result);
            Ok(())
        } else {
            self.vmult_add_linear(dst, &source)
        }
    }

    fn copy_nonlinear_blocks(&self, dst: &mut BlockVector<T>, src: &BlockVector<T>) {
        for (block, &nonlinear) in self.nonlinear_blocks.iter().enumerate() {
            if nonlinear {
                dst.block_mut(block).copy_from(src.block(block));
            }
        }
    }

    /// Declares which blocks are held fixed at the given reference values.
    ///
    /// After this call, [`vmult`](Self::vmult) copies flagged blocks straight from its input
    /// to its output. The remaining blocks are computed with the flagged blocks of the input
    /// replaced by the corresponding blocks of `reference`.
    pub fn set_nonlinearities(&mut self, nonlinear_blocks: Vec<bool>, reference: BlockVector<T>) -> eyre::Result<()> {
        if nonlinear_blocks.len() != self.data.n_blocks() {
            return Err(eyre!(FormError::unsupported(format!(
                "expected one nonlinearity flag per block ({}), got {}",
                self.data.n_blocks(),
                nonlinear_blocks.len()
            ))));
        }
        self.check_vector(&reference, "reference")?;
        let mut frozen = self.initialize_dof_vector();
        for (block, &nonlinear) in nonlinear_blocks.iter().enumerate() {
            if nonlinear {
                frozen.block_mut(block).copy_from(reference.block(block));
            }
        }
        debug!("Set nonlinear blocks {:?}", nonlinear_blocks);
        self.nonlinear_blocks = nonlinear_blocks;
        self.frozen = Some(frozen);
        Ok(())
    }

    /// Removes any nonlinear blocks, so that the operator acts on all blocks again.
    pub fn clear_nonlinearities(&mut self) {
        self.nonlinear_blocks.clear();
        self.frozen = None;
    }

    pub fn nonlinear_blocks(&self) -> &[bool] {
        &self.nonlinear_blocks
    }

    /// Computes the inverse of the operator's diagonal by probing every local degree of freedom
    /// with a unit impulse.
    ///
    /// Constrained entries are set to one. Entries whose magnitude does not exceed
    /// `sqrt(eps)` are replaced by one, all others are inverted. Only operators on a single
    /// field are supported; for other configurations an
    /// [`UnsupportedConfiguration`](FormError::UnsupportedConfiguration) error is returned.
    pub fn compute_diagonal(&mut self) -> eyre::Result<()> {
        if self.accessor.n_slots() != 1 {
            return Err(eyre!(FormError::unsupported(format!(
                "diagonal computation requires a single field, but the operator has {} fields",
                self.accessor.n_slots()
            ))));
        }

        let mut diagonal = self.initialize_dof_vector();
        let form = &*self.form;
        self.data.cell_loop(&self.accessor, &mut diagonal, |accessor, _cell| {
            let n = accessor.dofs_per_cell(0);
            let mut local_diagonal = vec![T::zero(); accessor.tensor_dofs_per_cell(0)];
            for i in 0..n {
                let dofs = accessor.dof_values_mut(0);
                dofs.fill(T::zero());
                dofs[i] = T::one();
                do_operation_on_cell(form, accessor)?;
                local_diagonal[i] = accessor.dof_values(0)[i];
            }
            accessor.dof_values_mut(0).copy_from_slice(&local_diagonal);
            Ok(())
        })?;

        self.data.set_constrained_entries_to_one(&mut diagonal);

        let threshold = T::default_epsilon().sqrt();
        let mut num_replaced = 0;
        for (i, entry) in diagonal.block_mut(0).iter_mut().enumerate() {
            if entry.abs() > threshold {
                *entry = T::one() / *entry;
            } else {
                if !self.data.is_constrained(0, i) {
                    warn!("Diagonal entry {} is below the noise threshold, replacing its inverse by one", i);
                }
                *entry = T::one();
                num_replaced += 1;
            }
        }
        debug!(
            "Computed inverse diagonal with {} entries, {} entries replaced by one",
            diagonal.len(),
            num_replaced
        );

        self.inverse_diagonal = Some(diagonal);
        Ok(())
    }

    /// The inverse diagonal computed by [`compute_diagonal`](Self::compute_diagonal).
    pub fn inverse_diagonal(&self) -> Option<&BlockVector<T>> {
        self.inverse_diagonal.as_ref()
    }

    /// `dst = D^-1 src`, where `D` is the diagonal of the operator.
    pub fn precondition_jacobi(&self, dst: &mut BlockVector<T>, src: &BlockVector<T>) -> eyre::Result<()> {
        let inverse_diagonal = self
            .inverse_diagonal
            .as_ref()
            .ok_or_else(|| eyre!("the diagonal has not been computed"))?;
        self.check_vector(src, "source")?;
        *dst = inverse_diagonal.component_mul(src);
        Ok(())
    }
}
