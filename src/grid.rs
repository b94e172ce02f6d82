//! Uniform axis-aligned grids of hypercube cells.
use crate::Real;
use eyre::eyre;
use nalgebra::DVector;

/// A uniform grid of `dim`-dimensional hypercube cells with edge length `cell_size`.
///
/// Cells and vertices are numbered lexicographically, with the first coordinate varying
/// fastest. The local vertices of a cell are numbered the same way: bit `d` of the local
/// index selects the upper vertex along axis `d`.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianGrid<T: Real> {
    cells_per_dim: Vec<usize>,
    cell_size: T,
    origin: DVector<T>,
}

impl<T: Real> CartesianGrid<T> {
    pub fn new(cells_per_dim: &[usize], cell_size: T) -> eyre::Result<Self> {
        let dim = cells_per_dim.len();
        if !(1..=3).contains(&dim) {
            return Err(eyre!("grid dimension must be 1, 2 or 3, got {}", dim));
        }
        if cells_per_dim.iter().any(|&n| n == 0) {
            return Err(eyre!("grid must have at least one cell along every axis"));
        }
        if cell_size <= T::zero() {
            return Err(eyre!("cell size must be positive"));
        }
        Ok(Self {
            cells_per_dim: cells_per_dim.to_vec(),
            cell_size,
            origin: DVector::zeros(dim),
        })
    }

    /// The unit hypercube `[0, 1]^dim` divided into `cells_per_dim` cells along each axis.
    pub fn unit_cube(dim: usize, cells_per_dim: usize) -> eyre::Result<Self> {
        let n = T::from_usize(cells_per_dim).ok_or_else(|| eyre!("number of cells does not fit in scalar type"))?;
        Self::new(&vec![cells_per_dim; dim], T::one() / n)
    }

    pub fn with_origin(self, origin: DVector<T>) -> eyre::Result<Self> {
        if origin.len() != self.dim() {
            return Err(eyre!(
                "origin has dimension {}, but the grid has dimension {}",
                origin.len(),
                self.dim()
            ));
        }
        Ok(Self { origin, ..self })
    }

    pub fn dim(&self) -> usize {
        self.cells_per_dim.len()
    }

    pub fn cells_per_dim(&self) -> &[usize] {
        &self.cells_per_dim
    }

    pub fn cell_size(&self) -> T {
        self.cell_size
    }

    pub fn origin(&self) -> &DVector<T> {
        &self.origin
    }

    pub fn num_cells(&self) -> usize {
        self.cells_per_dim.iter().product()
    }

    pub fn num_vertices(&self) -> usize {
        self.cells_per_dim.iter().map(|n| n + 1).product()
    }

    /// Number of vertices of a single cell, `2^dim`.
    pub fn vertices_per_cell(&self) -> usize {
        1 << self.dim()
    }

    pub fn cell_volume(&self) -> T {
        (0..self.dim()).fold(T::one(), |volume, _| volume * self.cell_size)
    }

    /// Writes the global indices of the vertices of `cell` into `vertices`.
    ///
    /// # Panics
    ///
    /// Panics if `vertices.len()` differs from [`vertices_per_cell`](Self::vertices_per_cell)
    /// or if the cell index is out of bounds.
    pub fn cell_vertices(&self, cell: usize, vertices: &mut [usize]) {
        assert!(cell < self.num_cells(), "Cell index out of bounds");
        assert_eq!(vertices.len(), self.vertices_per_cell());

        let mut cell_index = [0; 3];
        let mut remainder = cell;
        for (d, &n) in self.cells_per_dim.iter().enumerate() {
            cell_index[d] = remainder % n;
            remainder /= n;
        }

        for (local, vertex) in vertices.iter_mut().enumerate() {
            let mut global = 0;
            let mut stride = 1;
            for (d, &n) in self.cells_per_dim.iter().enumerate() {
                let offset = (local >> d) & 1;
                global += (cell_index[d] + offset) * stride;
                stride *= n + 1;
            }
            *vertex = global;
        }
    }

    pub fn vertex_position(&self, vertex: usize) -> DVector<T> {
        let mut position = self.origin.clone();
        let mut remainder = vertex;
        for (d, &n) in self.cells_per_dim.iter().enumerate() {
            let i = remainder % (n + 1);
            remainder /= n + 1;
            position[d] += T::from_usize(i).unwrap_or_else(T::zero) * self.cell_size;
        }
        position
    }

    /// The indices of all vertices on the boundary of the grid, in ascending order.
    pub fn boundary_vertices(&self) -> Vec<usize> {
        (0..self.num_vertices())
            .filter(|&vertex| {
                let mut remainder = vertex;
                self.cells_per_dim.iter().any(|&n| {
                    let i = remainder % (n + 1);
                    remainder /= n + 1;
                    i == 0 || i == n
                })
            })
            .collect()
    }
}
