//! Block-structured vectors holding the degrees of freedom of one or more fields.
use crate::Real;
use nalgebra::DVector;

/// An ordered list of vector blocks, one block per field.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockVector<T: Real> {
    blocks: Vec<DVector<T>>,
}

impl<T: Real> BlockVector<T> {
    pub fn zeros(block_sizes: &[usize]) -> Self {
        Self {
            blocks: block_sizes.iter().map(|&n| DVector::zeros(n)).collect(),
        }
    }

    pub fn from_blocks(blocks: Vec<DVector<T>>) -> Self {
        Self { blocks }
    }

    pub fn from_single(block: DVector<T>) -> Self {
        Self { blocks: vec![block] }
    }

    /// A zero vector with the same block structure as `self`.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(&self.block_sizes())
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_sizes(&self) -> Vec<usize> {
        self.blocks.iter().map(|block| block.len()).collect()
    }

    pub fn block(&self, index: usize) -> &DVector<T> {
        &self.blocks[index]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut DVector<T> {
        &mut self.blocks[index]
    }

    pub fn blocks(&self) -> &[DVector<T>] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<DVector<T>> {
        self.blocks
    }

    /// Total number of entries over all blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|block| block.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_same_structure(&self, other: &BlockVector<T>) -> bool {
        self.n_blocks() == other.n_blocks()
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.len() == b.len())
    }

    pub fn fill(&mut self, value: T) {
        for block in &mut self.blocks {
            block.fill(value);
        }
    }

    /// Adds `other` to `self`.
    ///
    /// # Panics
    ///
    /// Panics if the block structures differ.
    pub fn add_assign(&mut self, other: &BlockVector<T>) {
        self.assert_same_structure(other);
        for (a, b) in self.blocks.iter_mut().zip(&other.blocks) {
            *a += b;
        }
    }

    pub fn copy_from(&mut self, other: &BlockVector<T>) {
        self.assert_same_structure(other);
        for (a, b) in self.blocks.iter_mut().zip(&other.blocks) {
            a.copy_from(b);
        }
    }

    /// `self <- alpha * x + self`.
    pub fn axpy(&mut self, alpha: T, x: &BlockVector<T>) {
        self.assert_same_structure(x);
        for (a, b) in self.blocks.iter_mut().zip(&x.blocks) {
            a.axpy(alpha, b, T::one());
        }
    }

    pub fn dot(&self, other: &BlockVector<T>) -> T {
        self.assert_same_structure(other);
        self.blocks
            .iter()
            .zip(&other.blocks)
            .fold(T::zero(), |acc, (a, b)| acc + a.dot(b))
    }

    pub fn norm(&self) -> T {
        self.dot(self).sqrt()
    }

    /// Entry-wise product of two block vectors.
    pub fn component_mul(&self, other: &BlockVector<T>) -> BlockVector<T> {
        self.assert_same_structure(other);
        Self {
            blocks: self
                .blocks
                .iter()
                .zip(&other.blocks)
                .map(|(a, b)| a.component_mul(b))
                .collect(),
        }
    }

    fn assert_same_structure(&self, other: &BlockVector<T>) {
        assert!(
            self.has_same_structure(other),
            "Block vectors must have the same block structure"
        );
    }
}
