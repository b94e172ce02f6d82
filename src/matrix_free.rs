//! The cell loop driver for matrix-free operators.
use crate::accessor::CellAccessor;
use crate::vector::BlockVector;
use crate::Real;
use eyre::eyre;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::ops::Range;
use thread_local::ThreadLocal;

/// Settings for the cell loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixFreeSettings {
    /// Whether cell ranges are processed in parallel.
    pub parallel: bool,
    /// The number of consecutive cells handed to a worker at a time.
    pub cells_per_range: usize,
}

impl Default for MatrixFreeSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            cells_per_range: 64,
        }
    }
}

impl MatrixFreeSettings {
    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }

    pub fn with_cells_per_range(self, cells_per_range: usize) -> Self {
        Self {
            cells_per_range,
            ..self
        }
    }
}

/// Cell loop data for a matrix-free operator: the number of cells, their partition into
/// ranges, the block structure of the vectors the operator acts on, and the constrained
/// degrees of freedom of every block.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixFreeData<T: Real> {
    n_cells: usize,
    block_sizes: Vec<usize>,
    constrained_dofs: Vec<Vec<usize>>,
    ranges: Vec<Range<usize>>,
    settings: MatrixFreeSettings,
    marker: std::marker::PhantomData<T>,
}

/// The state each worker holds during a parallel cell loop.
struct Worker<A, T: Real> {
    accessor: A,
    dst: BlockVector<T>,
}

impl<T: Real> MatrixFreeData<T> {
    pub fn new(n_cells: usize, block_sizes: Vec<usize>, settings: MatrixFreeSettings) -> Self {
        let cells_per_range = settings.cells_per_range.max(1);
        let ranges = (0..n_cells)
            .step_by(cells_per_range)
            .map(|start| start..usize::min(start + cells_per_range, n_cells))
            .collect();
        Self {
            n_cells,
            constrained_dofs: vec![Vec::new(); block_sizes.len()],
            block_sizes,
            ranges,
            settings,
            marker: Default::default(),
        }
    }

    /// Creates loop data matching the cells and slots of the given accessor.
    pub fn from_accessor<A>(accessor: &A, settings: MatrixFreeSettings) -> Self
    where
        A: ?Sized + CellAccessor<T>,
    {
        let block_sizes = (0..accessor.n_slots())
            .map(|slot| accessor.n_dofs(slot))
            .collect();
        Self::new(accessor.n_cells(), block_sizes, settings)
    }

    /// Declares the given degrees of freedom of a block as constrained.
    ///
    /// Constrained degrees of freedom are passed through unchanged by operators.
    pub fn with_constrained_dofs(mut self, block: usize, mut dofs: Vec<usize>) -> eyre::Result<Self> {
        let block_size = *self
            .block_sizes
            .get(block)
            .ok_or_else(|| eyre!("block {} out of range", block))?;
        if let Some(&dof) = dofs.iter().find(|&&dof| dof >= block_size) {
            return Err(eyre!("constrained dof {} out of range for block {} of size {}", dof, block, block_size));
        }
        dofs.sort_unstable();
        dofs.dedup();
        self.constrained_dofs[block] = dofs;
        Ok(self)
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn n_blocks(&self) -> usize {
        self.block_sizes.len()
    }

    pub fn block_sizes(&self) -> &[usize] {
        &self.block_sizes
    }

    pub fn settings(&self) -> &MatrixFreeSettings {
        &self.settings
    }

    pub fn cell_ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn constrained_dofs(&self, block: usize) -> &[usize] {
        &self.constrained_dofs[block]
    }

    pub fn has_constraints(&self) -> bool {
        self.constrained_dofs.iter().any(|dofs| !dofs.is_empty())
    }

    pub fn is_constrained(&self, block: usize, dof: usize) -> bool {
        self.constrained_dofs[block].binary_search(&dof).is_ok()
    }

    /// A zero vector with the block structure of this data.
    pub fn create_vector(&self) -> BlockVector<T> {
        BlockVector::zeros(&self.block_sizes)
    }

    pub fn set_constrained_entries_to_one(&self, vector: &mut BlockVector<T>) {
        self.for_each_constrained(vector, |entry| *entry = T::one());
    }

    pub fn zero_constrained_entries(&self, vector: &mut BlockVector<T>) {
        self.for_each_constrained(vector, |entry| *entry = T::zero());
    }

    /// Sets `dst[c] = src[c]` for every constrained entry `c`.
    pub fn copy_constrained_entries(&self, dst: &mut BlockVector<T>, src: &BlockVector<T>) {
        for (block, dofs) in self.constrained_dofs.iter().enumerate() {
            for &dof in dofs {
                dst.block_mut(block)[dof] = src.block(block)[dof];
            }
        }
    }

    /// Adds `src[c]` to `dst[c]` for every constrained entry `c`.
    pub fn add_constrained_entries(&self, dst: &mut BlockVector<T>, src: &BlockVector<T>) {
        for (block, dofs) in self.constrained_dofs.iter().enumerate() {
            for &dof in dofs {
                dst.block_mut(block)[dof] += src.block(block)[dof];
            }
        }
    }

    fn for_each_constrained(&self, vector: &mut BlockVector<T>, mut f: impl FnMut(&mut T)) {
        for (block, dofs) in self.constrained_dofs.iter().enumerate() {
            for &dof in dofs {
                f(&mut vector.block_mut(block)[dof]);
            }
        }
    }

    /// Runs `body` for every cell and adds the local results into `dst`.
    ///
    /// For each cell the accessor is reinitialized, `body` is called (typically reading
    /// source values, evaluating and integrating) and the accessor's local values are then
    /// distributed into an accumulator. In parallel mode, each worker thread owns a clone of
    /// `template` and a private accumulator. The accumulators are added into `dst` once all
    /// cells have been processed, so `dst` is left unchanged if `body` fails for any cell.
    pub fn cell_loop<A, F>(&self, template: &A, dst: &mut BlockVector<T>, body: F) -> eyre::Result<()>
    where
        A: CellAccessor<T> + Clone + Send + Sync,
        F: Fn(&mut A, usize) -> eyre::Result<()> + Sync,
    {
        if dst.block_sizes() != self.block_sizes {
            return Err(eyre!(
                "destination has block sizes {:?}, expected {:?}",
                dst.block_sizes(),
                self.block_sizes
            ));
        }

        if !self.settings.parallel || self.ranges.len() <= 1 {
            let mut accessor = template.clone();
            let mut accumulator = self.create_vector();
            for cell in 0..self.n_cells {
                accessor.reinit(cell);
                body(&mut accessor, cell)?;
                accessor.distribute_local_to_global(&mut accumulator);
            }
            dst.add_assign(&accumulator);
            return Ok(());
        }

        let workers: ThreadLocal<RefCell<Worker<A, T>>> = ThreadLocal::new();
        self.ranges.par_iter().try_for_each(|range| -> eyre::Result<()> {
            let mut worker = workers
                .get_or(|| {
                    RefCell::new(Worker {
                        accessor: template.clone(),
                        dst: self.create_vector(),
                    })
                })
                .borrow_mut();
            let Worker { accessor, dst } = &mut *worker;
            for cell in range.clone() {
                accessor.reinit(cell);
                body(accessor, cell)?;
                accessor.distribute_local_to_global(dst);
            }
            Ok(())
        })?;

        for worker in workers.into_iter() {
            dst.add_assign(&worker.into_inner().dst);
        }
        Ok(())
    }
}
