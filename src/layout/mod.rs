//! File layout table: simulation decomposition coordinates to part IDs

use ndarray::{s, Array3};

use crate::{Error, Result};

/// Inclusive index range along one axis
pub type AxisRange = [usize; 2];

/// 3D table of file part IDs, indexed `(i, j, k)` with `i` fastest varying
/// in the ID numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayoutTable {
    table: Array3<usize>,
}

impl FileLayoutTable {
    /// Table of the full simulation layout:
    /// `table[i][j][k] = k * (nx * ny) + j * nx + i`.
    pub fn build(layout_size: [usize; 3]) -> Result<Self> {
        if layout_size.iter().any(|&n| n == 0) {
            return Err(Error::InvalidArgument(format!(
                "layout size must be positive in every dimension, got {layout_size:?}"
            )));
        }
        let [nx, ny, nz] = layout_size;
        let table = Array3::from_shape_fn((nx, ny, nz), |(i, j, k)| k * nx * ny + j * nx + i);
        Ok(Self { table })
    }

    /// Replace this table with the full table for `layout_size`.
    pub fn rebuild(&mut self, layout_size: [usize; 3]) -> Result<()> {
        *self = Self::build(layout_size)?;
        Ok(())
    }

    /// Files per dimension
    pub fn layout_size(&self) -> [usize; 3] {
        let (nx, ny, nz) = self.table.dim();
        [nx, ny, nz]
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Part ID at layout position `(i, j, k)`
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<usize> {
        self.table.get((i, j, k)).copied()
    }

    /// Table restricted to the inclusive ranges, keeping the original part IDs
    /// and their relative order.
    pub fn sub_layout(&self, x: AxisRange, y: AxisRange, z: AxisRange) -> Result<Self> {
        let size = self.layout_size();
        for (dim, range) in [x, y, z].iter().enumerate() {
            if range[0] > range[1] || range[1] >= size[dim] {
                return Err(Error::InvalidArgument(format!(
                    "range {range:?} outside layout dimension {dim} of size {}",
                    size[dim]
                )));
            }
        }

        let table = self
            .table
            .slice(s![x[0]..=x[1], y[0]..=y[1], z[0]..=z[1]])
            .to_owned();
        Ok(Self { table })
    }

    /// Full range of every axis
    pub fn full_extent(&self) -> [AxisRange; 3] {
        self.layout_size().map(|n| [0, n - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_numbers_i_fastest() {
        let table = FileLayoutTable::build([3, 2, 2]).unwrap();
        assert_eq!(table.layout_size(), [3, 2, 2]);
        assert_eq!(table.len(), 12);
        assert_eq!(table.get(0, 0, 0), Some(0));
        assert_eq!(table.get(1, 0, 0), Some(1));
        assert_eq!(table.get(0, 1, 0), Some(3));
        assert_eq!(table.get(0, 0, 1), Some(6));
        assert_eq!(table.get(2, 1, 1), Some(11));
        assert_eq!(table.get(3, 0, 0), None);
    }

    #[test]
    fn test_sub_layout_keeps_ids() {
        let table = FileLayoutTable::build([4, 3, 2]).unwrap();
        let sub = table.sub_layout([1, 2], [1, 2], [1, 1]).unwrap();

        assert_eq!(sub.layout_size(), [2, 2, 1]);
        assert_eq!(sub.get(0, 0, 0), table.get(1, 1, 1));
        assert_eq!(sub.get(1, 0, 0), Some(12 + 4 + 2));
        assert_eq!(sub.get(0, 1, 0), Some(12 + 8 + 1));
        assert_eq!(sub.get(1, 1, 0), Some(22));
    }

    #[test]
    fn test_sub_layout_rejects_bad_ranges() {
        let table = FileLayoutTable::build([2, 2, 2]).unwrap();
        assert!(table.sub_layout([0, 2], [0, 1], [0, 1]).is_err());
        assert!(table.sub_layout([1, 0], [0, 1], [0, 1]).is_err());
    }

    #[test]
    fn test_zero_layout_is_error() {
        assert!(FileLayoutTable::build([2, 0, 1]).is_err());
    }

    #[test]
    fn test_rebuild_replaces_table() {
        let mut table = FileLayoutTable::build([2, 2, 2]).unwrap();
        table.rebuild([5, 1, 1]).unwrap();
        assert_eq!(table.layout_size(), [5, 1, 1]);
        assert_eq!(table.get(4, 0, 0), Some(4));
        assert_eq!(table.full_extent(), [[0, 4], [0, 0], [0, 0]]);
    }
}
