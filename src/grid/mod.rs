//! Assembles strided part blocks into one rank's ghosted sub-grid

use ndarray::{s, Array3, ArrayView3, ArrayViewMut3};

use crate::part::Part;
use crate::{Error, Result};

/// Shape of one rank's output buffer
///
/// The buffer is the rank's sub-grid grown by `low_ghost` points below and
/// `high_ghost` points above along every axis, stored with `x` fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridAssembler {
    subdimension: [usize; 3],
    low_ghost: [usize; 3],
    high_ghost: [usize; 3],
}

impl GridAssembler {
    pub fn new(subdimension: [usize; 3], low_ghost: [usize; 3], high_ghost: [usize; 3]) -> Self {
        Self {
            subdimension,
            low_ghost,
            high_ghost,
        }
    }

    pub fn subdimension(&self) -> [usize; 3] {
        self.subdimension
    }

    pub fn low_ghost(&self) -> [usize; 3] {
        self.low_ghost
    }

    pub fn high_ghost(&self) -> [usize; 3] {
        self.high_ghost
    }

    /// Points per axis including ghosts
    pub fn ghosted_dimensions(&self) -> [usize; 3] {
        std::array::from_fn(|d| self.low_ghost[d] + self.subdimension[d] + self.high_ghost[d])
    }

    /// Required buffer length
    pub fn len(&self) -> usize {
        self.ghosted_dimensions().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the first [`len`](Self::len) values of `grid` as a `(z, y, x)`
    /// array.
    pub fn view_mut<'a>(&self, grid: &'a mut [f32]) -> Result<ArrayViewMut3<'a, f32>> {
        let [nx, ny, nz] = self.ghosted_dimensions();
        let required = self.len();
        if grid.len() < required {
            return Err(Error::InvalidArgument(format!(
                "grid buffer holds {} values, {nx}x{ny}x{nz} = {required} required",
                grid.len()
            )));
        }
        ArrayViewMut3::from_shape((nz, ny, nx), &mut grid[..required])
            .map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    pub fn view<'a>(&self, grid: &'a [f32]) -> Result<ArrayView3<'a, f32>> {
        let [nx, ny, nz] = self.ghosted_dimensions();
        let required = self.len();
        if grid.len() < required {
            return Err(Error::InvalidArgument(format!(
                "grid buffer holds {} values, {required} required",
                grid.len()
            )));
        }
        ArrayView3::from_shape((nz, ny, nx), &grid[..required]).map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    /// Copy a part's block to its place inside the interior of the grid.
    pub fn place(&self, grid: &mut ArrayViewMut3<'_, f32>, part: &Part, block: &Array3<f32>) -> Result<()> {
        let [cx, cy, cz] = part.counts;
        if block.dim() != (cz, cy, cx) {
            return Err(Error::InvalidArgument(format!(
                "block of part {} is {:?}, expected {:?}",
                part.id,
                block.dim(),
                (cz, cy, cx)
            )));
        }
        let start: [usize; 3] = std::array::from_fn(|d| self.low_ghost[d] + part.grid_offset[d]);
        for d in 0..3 {
            if part.grid_offset[d] + part.counts[d] > self.subdimension[d] {
                return Err(Error::InvalidArgument(format!(
                    "part {} overruns the sub-grid along axis {d}",
                    part.id
                )));
            }
        }
        grid.slice_mut(s![
            start[2]..start[2] + cz,
            start[1]..start[1] + cy,
            start[0]..start[0] + cx
        ])
        .assign(block);
        Ok(())
    }

    /// Fill `grid` from every loaded block.
    pub fn assemble<'p>(
        &self,
        grid: &mut [f32],
        blocks: impl IntoIterator<Item = (&'p Part, Array3<f32>)>,
    ) -> Result<()> {
        let mut view = self.view_mut(grid)?;
        for (part, block) in blocks {
            self.place(&mut view, part, &block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::view::OwnedPart;

    fn part(id: usize, part_offset: [usize; 3], files: [usize; 3], subdimension: [usize; 3]) -> Part {
        Part::new(OwnedPart { id, part_offset }, [2, 2, 1], files, subdimension)
    }

    fn block(part: &Part, base: f32) -> Array3<f32> {
        let [cx, cy, cz] = part.counts;
        Array3::from_shape_fn((cz, cy, cx), |(z, y, x)| base + (x + 10 * y + 100 * z) as f32)
    }

    #[test]
    fn test_dimensions_include_ghosts() {
        let assembler = GridAssembler::new([5, 4, 2], [1, 0, 0], [0, 1, 0]);
        assert_eq!(assembler.ghosted_dimensions(), [6, 5, 2]);
        assert_eq!(assembler.len(), 60);
    }

    #[test]
    fn test_parts_tile_the_interior() {
        // two parts along x, the second carries the overlap point
        let subdimension = [5, 2, 1];
        let first = part(0, [0, 0, 0], [2, 1, 1], subdimension);
        let second = part(1, [1, 0, 0], [2, 1, 1], subdimension);
        assert_eq!(second.counts, [3, 2, 1]);

        let assembler = GridAssembler::new(subdimension, [1, 1, 0], [0, 0, 0]);
        let mut grid = vec![-1.0; assembler.len()];
        let blocks = vec![
            (&first, block(&first, 0.0)),
            (&second, block(&second, 1000.0)),
        ];
        assembler.assemble(&mut grid, blocks).unwrap();

        let view = assembler.view(&grid).unwrap();
        // ghost rows stay untouched
        assert_eq!(view[[0, 0, 3]], -1.0);
        assert_eq!(view[[0, 1, 0]], -1.0);
        assert_eq!(view[[0, 1, 1]], 0.0);
        assert_eq!(view[[0, 2, 2]], 11.0);
        assert_eq!(view[[0, 1, 3]], 1000.0);
        assert_eq!(view[[0, 2, 5]], 1012.0);
    }

    #[test]
    fn test_wrong_buffer_size_is_error() {
        let assembler = GridAssembler::new([2, 2, 2], [0; 3], [0; 3]);
        let mut grid = vec![0.0; 7];
        assert!(assembler.assemble(&mut grid, Vec::<(&Part, Array3<f32>)>::new()).is_err());
    }

    #[test]
    fn test_mismatched_block_is_error() {
        let subdimension = [2, 2, 1];
        let p = part(0, [0, 0, 0], [1, 1, 1], subdimension);
        let assembler = GridAssembler::new(subdimension, [0; 3], [0; 3]);
        let mut grid = vec![0.0; assembler.len()];
        let wrong = Array3::zeros((1, 1, 1));
        assert!(assembler.assemble(&mut grid, vec![(&p, wrong)]).is_err());
    }
}
