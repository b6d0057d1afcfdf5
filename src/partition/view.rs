//! Active view: spatial sub-layout, partition and strided grid extents

use crate::layout::{AxisRange, FileLayoutTable};
use crate::partition::{Extent, Partition, EMPTY_EXTENT};
use crate::Result;

/// One file part owned by a rank and where it sits among the rank's parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedPart {
    /// Part ID in the simulation layout (the writer's rank)
    pub id: usize,
    pub part_offset: [usize; 3],
}

/// The restricted layout seen by the reader, distributed over its ranks
#[derive(Debug, Clone)]
pub struct View {
    extent: [AxisRange; 3],
    layout: FileLayoutTable,
    partition: Partition,
    part_size: [usize; 3],
    stride: [usize; 3],
    grid_size: [usize; 3],
    subextents: Vec<Extent>,
    subdimensions: Vec<[usize; 3]>,
    current_time_step: Option<usize>,
    needs_grid_calculation: bool,
}

impl View {
    /// Build the view of `extent` (inclusive file index ranges of `full`)
    /// for `total_rank` readers. Grid extents still need calculating.
    pub fn new(
        full: &FileLayoutTable,
        extent: [AxisRange; 3],
        part_size: [usize; 3],
        total_rank: usize,
        stride: [usize; 3],
    ) -> Result<Self> {
        let layout = full.sub_layout(extent[0], extent[1], extent[2])?;
        let partition = Partition::new(layout.layout_size(), total_rank);
        let total_rank = partition.total_rank();

        Ok(Self {
            extent,
            layout,
            partition,
            part_size,
            stride: clamp_stride(stride, part_size),
            grid_size: [0; 3],
            subextents: vec![EMPTY_EXTENT; total_rank],
            subdimensions: vec![[0; 3]; total_rank],
            current_time_step: None,
            needs_grid_calculation: true,
        })
    }

    /// Change the stride. Returns whether the clamped stride differs.
    pub fn set_stride(&mut self, stride: [usize; 3]) -> bool {
        let stride = clamp_stride(stride, self.part_size);
        if stride == self.stride {
            return false;
        }
        self.stride = stride;
        self.needs_grid_calculation = true;
        true
    }

    /// Derive the strided grid size and every rank's sub-extent.
    ///
    /// Each rank's extent reaches one point into its upper neighbor; that
    /// shared point is clipped at the upper boundary of the grid.
    pub fn calculate_grid_extents(&mut self) {
        let strided = self.strided_part_size();
        let layout_size = self.layout.layout_size();
        self.grid_size = std::array::from_fn(|d| strided[d] * layout_size[d]);

        let total_rank = self.partition.total_rank();
        let mut subextents = vec![EMPTY_EXTENT; total_rank];
        let mut subdimensions = vec![[0; 3]; total_rank];
        for rank in 0..total_rank {
            let Some(range) = self.partition.range(rank) else {
                continue;
            };
            let mut extent = EMPTY_EXTENT;
            for d in 0..3 {
                let lo = range.lo[d] * strided[d];
                let hi = ((range.hi[d] + 1) * strided[d]).min(self.grid_size[d] - 1);
                extent[2 * d] = lo as i32;
                extent[2 * d + 1] = hi as i32;
                subdimensions[rank][d] = hi - lo + 1;
            }
            subextents[rank] = extent;
        }

        self.subextents = subextents;
        self.subdimensions = subdimensions;
        // parts are rebuilt from these extents and must pick their files again
        self.current_time_step = None;
        self.needs_grid_calculation = false;
        tracing::debug!(
            "Grid size {:?} with stride {:?} over decomposition {:?}",
            self.grid_size,
            self.stride,
            self.partition.decomposition
        );
    }

    pub fn needs_grid_calculation(&self) -> bool {
        self.needs_grid_calculation
    }

    /// Force a recalculation before the next load.
    pub fn invalidate(&mut self) {
        self.needs_grid_calculation = true;
    }

    /// Restricted file index ranges within the catalog layout
    pub fn extent(&self) -> [AxisRange; 3] {
        self.extent
    }

    pub fn layout(&self) -> &FileLayoutTable {
        &self.layout
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn decomposition(&self) -> [usize; 3] {
        self.partition.decomposition
    }

    pub fn stride(&self) -> [usize; 3] {
        self.stride
    }

    /// Grid points contributed by one part along each axis
    pub fn strided_part_size(&self) -> [usize; 3] {
        std::array::from_fn(|d| self.part_size[d] / self.stride[d])
    }

    /// Points of the whole strided grid
    pub fn grid_size(&self) -> [usize; 3] {
        self.grid_size
    }

    pub fn whole_extent(&self) -> Extent {
        if self.grid_size.iter().any(|&n| n == 0) {
            return EMPTY_EXTENT;
        }
        let [nx, ny, nz] = self.grid_size.map(|n| n as i32 - 1);
        [0, nx, 0, ny, 0, nz]
    }

    pub fn subextents(&self) -> &[Extent] {
        &self.subextents
    }

    pub fn subextent(&self, rank: usize) -> Extent {
        self.subextents.get(rank).copied().unwrap_or(EMPTY_EXTENT)
    }

    pub fn subdimension(&self, rank: usize) -> [usize; 3] {
        self.subdimensions.get(rank).copied().unwrap_or([0; 3])
    }

    /// Sub-extent grown by `ghost0` points below and `ghost1` above, clipped
    /// to the whole extent.
    pub fn ghost_extent(&self, rank: usize, ghost0: usize, ghost1: usize) -> Extent {
        let extent = self.subextent(rank);
        if extent == EMPTY_EXTENT {
            return EMPTY_EXTENT;
        }
        let whole = self.whole_extent();
        let mut grown = extent;
        for d in 0..3 {
            grown[2 * d] = (extent[2 * d] - ghost0 as i32).max(whole[2 * d]);
            grown[2 * d + 1] = (extent[2 * d + 1] + ghost1 as i32).min(whole[2 * d + 1]);
        }
        grown
    }

    /// Parts of `rank`, ordered `k`, `j`, `i` with `i` fastest
    pub fn parts_for(&self, rank: usize) -> Vec<OwnedPart> {
        let Some(range) = self.partition.range(rank) else {
            return Vec::new();
        };
        let mut parts = Vec::new();
        for k in range.lo[2]..=range.hi[2] {
            for j in range.lo[1]..=range.hi[1] {
                for i in range.lo[0]..=range.hi[0] {
                    if let Some(id) = self.layout.get(i, j, k) {
                        parts.push(OwnedPart {
                            id,
                            part_offset: [i - range.lo[0], j - range.lo[1], k - range.lo[2]],
                        });
                    }
                }
            }
        }
        parts
    }

    pub fn current_time_step(&self) -> Option<usize> {
        self.current_time_step
    }

    pub fn set_current_time_step(&mut self, time_step: usize) {
        self.current_time_step = Some(time_step);
    }
}

fn clamp_stride(stride: [usize; 3], part_size: [usize; 3]) -> [usize; 3] {
    std::array::from_fn(|d| stride[d].clamp(1, part_size[d].max(1)))
}
