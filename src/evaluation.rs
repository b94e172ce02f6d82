//! Cell evaluation of continuous multilinear Lagrange fields on Cartesian grids.
use crate::accessor::{CellAccessor, EvaluationFlags, IntegrationFlags};
use crate::grid::CartesianGrid;
use crate::quadrature::{tensor_gauss, QuadratureRule};
use crate::tensor::Tensor;
use crate::vector::BlockVector;
use crate::Real;
use eyre::eyre;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The valuedness of the finite element in a slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldBasis {
    /// One multilinear function per vertex.
    Scalar,
    /// `dim` components per vertex, each discretized like a scalar field.
    Vector,
}

impl FieldBasis {
    pub fn rank(&self) -> usize {
        match self {
            Self::Scalar => 0,
            Self::Vector => 1,
        }
    }

    pub fn num_components(&self, dim: usize) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector => dim,
        }
    }
}

/// Q1 shape functions and their derivatives tabulated at the quadrature points of the
/// reference cell `[-1, 1]^dim`.
#[derive(Debug)]
struct ReferenceTables<T: Real> {
    dim: usize,
    n_nodes: usize,
    n_q: usize,
    /// `[q][node]`
    values: Vec<T>,
    /// `[q][node][d]`
    gradients: Vec<T>,
    /// `[q][node][d][e]`
    hessians: Vec<T>,
}

impl<T: Real> ReferenceTables<T> {
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn tabulate(dim: usize, quadrature: &QuadratureRule<T>) -> Self {
        let n_nodes = 1 << dim;
        let n_q = quadrature.len();
        let mut values = Vec::with_capacity(n_q * n_nodes);
        let mut gradients = Vec::with_capacity(n_q * n_nodes * dim);
        let mut hessians = Vec::with_capacity(n_q * n_nodes * dim * dim);

        // 1D linear functions and derivatives for the lower (0) and upper (1) vertex
        let phi = |upper: bool, x: T| if upper { 0.5 * (1.0 + x) } else { 0.5 * (1.0 - x) };
        let dphi = |upper: bool| if upper { 0.5 } else { -0.5 };

        for xi in quadrature.points() {
            for node in 0..n_nodes {
                let upper = |d: usize| (node >> d) & 1 == 1;
                // Product over all axes, where the axes in `differentiated` contribute derivatives
                let product = |differentiated: &[usize]| {
                    (0..dim).fold(T::one(), |acc, d| {
                        let count = differentiated.iter().filter(|&&a| a == d).count();
                        let factor = match count {
                            0 => phi(upper(d), xi[d]),
                            1 => dphi(upper(d)),
                            _ => T::zero(),
                        };
                        acc * factor
                    })
                };
                values.push(product(&[]));
                for d in 0..dim {
                    gradients.push(product(&[d]));
                }
                for d in 0..dim {
                    for e in 0..dim {
                        hessians.push(product(&[d, e]));
                    }
                }
            }
        }

        Self {
            dim,
            n_nodes,
            n_q,
            values,
            gradients,
            hessians,
        }
    }

    fn value(&self, q: usize, node: usize) -> T {
        self.values[q * self.n_nodes + node]
    }

    fn gradient(&self, q: usize, node: usize, d: usize) -> T {
        self.gradients[(q * self.n_nodes + node) * self.dim + d]
    }

    fn hessian(&self, q: usize, node: usize, d: usize, e: usize) -> T {
        self.hessians[((q * self.n_nodes + node) * self.dim + d) * self.dim + e]
    }
}

/// Data shared between all clones of an evaluation.
#[derive(Debug)]
struct SharedData<T: Real> {
    grid: CartesianGrid<T>,
    bases: Vec<FieldBasis>,
    quadrature: QuadratureRule<T>,
    tables: ReferenceTables<T>,
    /// Derivative scaling from reference to physical coordinates, `2 / h`.
    inverse_jacobian: T,
    /// `w_q * det J` for every quadrature point.
    jxw: Vec<T>,
}

/// Per-slot buffers for the current cell.
#[derive(Debug, Clone)]
struct SlotBuffers<T: Real> {
    n_components: usize,
    evaluation_flags: EvaluationFlags,
    integration_flags: IntegrationFlags,
    /// Local coefficients, `n_components * node + component`.
    dof_values: Vec<T>,
    /// `[q][component]`
    values: Vec<T>,
    /// `[q][component][d]`
    gradients: Vec<T>,
    /// `[q][component][d][e]`
    hessians: Vec<T>,
    submitted_values: Vec<T>,
    submitted_gradients: Vec<T>,
}

/// A [`CellAccessor`] for continuous Q1 Lagrange fields on a [`CartesianGrid`].
///
/// Each slot holds one field, scalar- or vector-valued as declared by its [`FieldBasis`].
/// The global degrees of freedom of a slot are numbered node-major, i.e. component `c` of the
/// field at vertex `v` has index `n_components * v + c` in the corresponding block.
///
/// Reference tables are shared between clones, so cloning an evaluation for each worker
/// thread is cheap.
#[derive(Debug, Clone)]
pub struct LagrangeEvaluation<T: Real> {
    shared: Arc<SharedData<T>>,
    cell: usize,
    cell_vertices: Vec<usize>,
    slots: Vec<SlotBuffers<T>>,
}

impl<T: Real> LagrangeEvaluation<T> {
    /// Creates an evaluation for the given fields, using a tensor Gauss rule with
    /// `num_quadrature_points_1d` points per axis.
    pub fn new(grid: CartesianGrid<T>, bases: &[FieldBasis], num_quadrature_points_1d: usize) -> eyre::Result<Self> {
        if bases.is_empty() {
            return Err(eyre!("an evaluation needs at least one field"));
        }
        let dim = grid.dim();
        let quadrature = tensor_gauss(dim, num_quadrature_points_1d)?;
        let tables = ReferenceTables::tabulate(dim, &quadrature);

        let two = T::one() + T::one();
        let half_size = grid.cell_size() / two;
        let det_jacobian = (0..dim).fold(T::one(), |det, _| det * half_size);
        let jxw = quadrature.weights().iter().map(|&w| w * det_jacobian).collect();

        let n_q = tables.n_q;
        let n_nodes = tables.n_nodes;
        let slots = bases
            .iter()
            .map(|basis| {
                let nc = basis.num_components(dim);
                SlotBuffers {
                    n_components: nc,
                    evaluation_flags: EvaluationFlags::NONE,
                    integration_flags: IntegrationFlags::NONE,
                    dof_values: vec![T::zero(); n_nodes * nc],
                    values: vec![T::zero(); n_q * nc],
                    gradients: vec![T::zero(); n_q * nc * dim],
                    hessians: vec![T::zero(); n_q * nc * dim * dim],
                    submitted_values: vec![T::zero(); n_q * nc],
                    submitted_gradients: vec![T::zero(); n_q * nc * dim],
                }
            })
            .collect();

        let shared = SharedData {
            inverse_jacobian: T::one() / half_size,
            grid,
            bases: bases.to_vec(),
            quadrature,
            tables,
            jxw,
        };

        let mut evaluation = Self {
            shared: Arc::new(shared),
            cell: 0,
            cell_vertices: vec![0; n_nodes],
            slots,
        };
        evaluation.reinit(0);
        Ok(evaluation)
    }

    pub fn grid(&self) -> &CartesianGrid<T> {
        &self.shared.grid
    }

    pub fn bases(&self) -> &[FieldBasis] {
        &self.shared.bases
    }

    pub fn quadrature(&self) -> &QuadratureRule<T> {
        &self.shared.quadrature
    }

    /// The cell the evaluation is currently initialized for.
    pub fn current_cell(&self) -> usize {
        self.cell
    }

    /// `w_q * det J` at quadrature point `q` of the current cell.
    pub fn jxw(&self, q: usize) -> T {
        self.shared.jxw[q]
    }

    /// The indices in block `slot` of all degrees of freedom located on the boundary of the grid.
    pub fn boundary_dofs(&self, slot: usize) -> Vec<usize> {
        let nc = self.slots[slot].n_components;
        self.shared
            .grid
            .boundary_vertices()
            .into_iter()
            .flat_map(|v| (0..nc).map(move |c| nc * v + c))
            .collect()
    }

    fn slot_buffers(&self, slot: usize) -> eyre::Result<&SlotBuffers<T>> {
        self.slots
            .get(slot)
            .ok_or_else(|| eyre!("slot {} out of range, the evaluation has {} slots", slot, self.slots.len()))
    }

    fn slot_buffers_mut(&mut self, slot: usize) -> eyre::Result<&mut SlotBuffers<T>> {
        let n_slots = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or_else(|| eyre!("slot {} out of range, the evaluation has {} slots", slot, n_slots))
    }

    fn check_q(&self, q: usize) -> eyre::Result<()> {
        if q < self.shared.tables.n_q {
            Ok(())
        } else {
            Err(eyre!("quadrature point {} out of range", q))
        }
    }

    fn check_tensor(&self, slot: usize, tensor: &Tensor<T>, expected_rank: usize, what: &str) -> eyre::Result<()> {
        if tensor.rank() != expected_rank || tensor.dim() != self.dim() {
            Err(eyre!(
                "submitted {} for slot {} has rank {} in dimension {}, expected rank {} in dimension {}",
                what,
                slot,
                tensor.rank(),
                tensor.dim(),
                expected_rank,
                self.dim()
            ))
        } else {
            Ok(())
        }
    }

    fn evaluate_slot(shared: &SharedData<T>, slot: &mut SlotBuffers<T>) {
        let tables = &shared.tables;
        let dim = tables.dim;
        let nc = slot.n_components;
        let flags = slot.evaluation_flags;
        let s = shared.inverse_jacobian;

        if flags.values {
            for q in 0..tables.n_q {
                for c in 0..nc {
                    slot.values[q * nc + c] = (0..tables.n_nodes)
                        .fold(T::zero(), |acc, node| acc + tables.value(q, node) * slot.dof_values[nc * node + c]);
                }
            }
        }
        if flags.gradients {
            for q in 0..tables.n_q {
                for c in 0..nc {
                    for d in 0..dim {
                        let g = (0..tables.n_nodes).fold(T::zero(), |acc, node| {
                            acc + tables.gradient(q, node, d) * slot.dof_values[nc * node + c]
                        });
                        slot.gradients[(q * nc + c) * dim + d] = g * s;
                    }
                }
            }
        }
        if flags.hessians {
            for q in 0..tables.n_q {
                for c in 0..nc {
                    for d in 0..dim {
                        for e in 0..dim {
                            let h = (0..tables.n_nodes).fold(T::zero(), |acc, node| {
                                acc + tables.hessian(q, node, d, e) * slot.dof_values[nc * node + c]
                            });
                            slot.hessians[((q * nc + c) * dim + d) * dim + e] = h * s * s;
                        }
                    }
                }
            }
        }

        slot.submitted_values.fill(T::zero());
        slot.submitted_gradients.fill(T::zero());
    }

    fn integrate_slot(shared: &SharedData<T>, slot: &mut SlotBuffers<T>) {
        let tables = &shared.tables;
        let dim = tables.dim;
        let nc = slot.n_components;
        let flags = slot.integration_flags;
        let s = shared.inverse_jacobian;

        slot.dof_values.fill(T::zero());
        for q in 0..tables.n_q {
            let jxw = shared.jxw[q];
            for node in 0..tables.n_nodes {
                for c in 0..nc {
                    let mut contribution = T::zero();
                    if flags.values {
                        contribution += tables.value(q, node) * slot.submitted_values[q * nc + c];
                    }
                    if flags.gradients {
                        for d in 0..dim {
                            let submitted = slot.submitted_gradients[(q * nc + c) * dim + d];
                            contribution += tables.gradient(q, node, d) * s * submitted;
                        }
                    }
                    slot.dof_values[nc * node + c] += contribution * jxw;
                }
            }
        }
    }
}

impl<T: Real> CellAccessor<T> for LagrangeEvaluation<T> {
    fn n_slots(&self) -> usize {
        self.slots.len()
    }

    fn n_cells(&self) -> usize {
        self.shared.grid.num_cells()
    }

    fn n_q_points(&self) -> usize {
        self.shared.tables.n_q
    }

    fn dim(&self) -> usize {
        self.shared.grid.dim()
    }

    fn rank(&self, slot: usize) -> usize {
        self.shared.bases[slot].rank()
    }

    fn n_dofs(&self, slot: usize) -> usize {
        self.shared.grid.num_vertices() * self.slots[slot].n_components
    }

    fn dofs_per_cell(&self, slot: usize) -> usize {
        self.slots[slot].dof_values.len()
    }

    fn set_evaluation_flags(&mut self, slot: usize, flags: EvaluationFlags) {
        self.slots[slot].evaluation_flags = flags;
    }

    fn set_integration_flags(&mut self, slot: usize, flags: IntegrationFlags) {
        self.slots[slot].integration_flags = flags;
    }

    fn reinit(&mut self, cell: usize) {
        self.cell = cell;
        self.shared.grid.cell_vertices(cell, &mut self.cell_vertices);
    }

    fn read_dof_values(&mut self, src: &BlockVector<T>) {
        assert_eq!(src.n_blocks(), self.slots.len(), "Source must have one block per slot");
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let block = src.block(index);
            let nc = slot.n_components;
            for (node, &vertex) in self.cell_vertices.iter().enumerate() {
                for c in 0..nc {
                    slot.dof_values[nc * node + c] = block[nc * vertex + c];
                }
            }
        }
    }

    fn dof_values(&self, slot: usize) -> &[T] {
        &self.slots[slot].dof_values
    }

    fn dof_values_mut(&mut self, slot: usize) -> &mut [T] {
        &mut self.slots[slot].dof_values
    }

    fn evaluate(&mut self) {
        let shared = &self.shared;
        for slot in &mut self.slots {
            Self::evaluate_slot(shared, slot);
        }
    }

    fn integrate(&mut self) {
        let shared = &self.shared;
        for slot in &mut self.slots {
            Self::integrate_slot(shared, slot);
        }
    }

    fn distribute_local_to_global(&self, dst: &mut BlockVector<T>) {
        assert_eq!(dst.n_blocks(), self.slots.len(), "Destination must have one block per slot");
        for (index, slot) in self.slots.iter().enumerate() {
            let block = dst.block_mut(index);
            let nc = slot.n_components;
            for (node, &vertex) in self.cell_vertices.iter().enumerate() {
                for c in 0..nc {
                    block[nc * vertex + c] += slot.dof_values[nc * node + c];
                }
            }
        }
    }

    fn get_value(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>> {
        self.check_q(q)?;
        let buffers = self.slot_buffers(slot)?;
        if !buffers.evaluation_flags.values {
            return Err(eyre!("values were not requested for slot {}", slot));
        }
        let nc = buffers.n_components;
        let rank = self.rank(slot);
        Ok(Tensor::from_slice(rank, self.dim(), &buffers.values[q * nc..(q + 1) * nc]))
    }

    fn get_gradient(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>> {
        self.check_q(q)?;
        let buffers = self.slot_buffers(slot)?;
        if !buffers.evaluation_flags.gradients {
            return Err(eyre!("gradients were not requested for slot {}", slot));
        }
        let n = buffers.n_components * self.dim();
        let rank = self.rank(slot) + 1;
        Ok(Tensor::from_slice(rank, self.dim(), &buffers.gradients[q * n..(q + 1) * n]))
    }

    fn get_hessian(&self, slot: usize, q: usize) -> eyre::Result<Tensor<T>> {
        self.check_q(q)?;
        let buffers = self.slot_buffers(slot)?;
        if !buffers.evaluation_flags.hessians {
            return Err(eyre!("Hessians were not requested for slot {}", slot));
        }
        let n = buffers.n_components * self.dim() * self.dim();
        let rank = self.rank(slot) + 2;
        Ok(Tensor::from_slice(rank, self.dim(), &buffers.hessians[q * n..(q + 1) * n]))
    }

    fn submit_value(&mut self, slot: usize, value: &Tensor<T>, q: usize) -> eyre::Result<()> {
        self.check_q(q)?;
        self.slot_buffers(slot)?;
        self.check_tensor(slot, value, self.rank(slot), "value")?;
        let buffers = self.slot_buffers_mut(slot)?;
        if !buffers.integration_flags.values {
            return Err(eyre!("value integration is not enabled for slot {}", slot));
        }
        let nc = buffers.n_components;
        for (target, &v) in buffers.submitted_values[q * nc..(q + 1) * nc]
            .iter_mut()
            .zip(value.components().iter())
        {
            *target += v;
        }
        Ok(())
    }

    fn submit_gradient(&mut self, slot: usize, gradient: &Tensor<T>, q: usize) -> eyre::Result<()> {
        self.check_q(q)?;
        self.slot_buffers(slot)?;
        self.check_tensor(slot, gradient, self.rank(slot) + 1, "gradient")?;
        let dim = self.dim();
        let buffers = self.slot_buffers_mut(slot)?;
        if !buffers.integration_flags.gradients {
            return Err(eyre!("gradient integration is not enabled for slot {}", slot));
        }
        let n = buffers.n_components * dim;
        for (target, &g) in buffers.submitted_gradients[q * n..(q + 1) * n]
            .iter_mut()
            .zip(gradient.components().iter())
        {
            *target += g;
        }
        Ok(())
    }
}
