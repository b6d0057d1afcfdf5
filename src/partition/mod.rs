//! Distribution of the file layout across the reader's ranks

pub mod view;

pub use view::View;

use serde::{Deserialize, Serialize};

/// Inclusive `[x0, x1, y0, y1, z0, z1]` point extent
pub type Extent = [i32; 6];

/// Extent reported for ranks and pieces that own no data
pub const EMPTY_EXTENT: Extent = [0, -1, 0, -1, 0, -1];

/// Inclusive box of layout (file) indices owned by one rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRange {
    pub lo: [usize; 3],
    pub hi: [usize; 3],
}

impl RankRange {
    /// Number of files along each axis
    pub fn files(&self) -> [usize; 3] {
        std::array::from_fn(|d| self.hi[d] - self.lo[d] + 1)
    }

    pub fn as_extent(&self) -> Extent {
        [
            self.lo[0] as i32,
            self.hi[0] as i32,
            self.lo[1] as i32,
            self.hi[1] as i32,
            self.lo[2] as i32,
            self.hi[2] as i32,
        ]
    }
}

/// Greatest common divisor
pub fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Ranks per dimension for `total_rank` readers over `layout_size` files.
pub fn decompose(layout_size: [usize; 3], total_rank: usize) -> [usize; 3] {
    let mut decomposition = [1usize; 3];
    if total_rank <= 1 {
        return decomposition;
    }
    if layout_size.iter().product::<usize>() <= total_rank {
        return layout_size;
    }

    let mut remaining = layout_size;
    let mut factor = total_rank;
    while factor > 1 {
        let mut best = (0, 1);
        for (dim, &extent) in remaining.iter().enumerate() {
            let divisor = gcd(extent, factor);
            if divisor > best.1 {
                best = (dim, divisor);
            }
        }
        let (dim, divisor) = best;
        if divisor <= 1 {
            break;
        }
        decomposition[dim] *= divisor;
        remaining[dim] /= divisor;
        factor /= divisor;
    }

    if factor > 1 {
        let mut widest = 0;
        for dim in 1..3 {
            if remaining[dim] > remaining[widest] {
                widest = dim;
            }
        }
        decomposition[widest] *= factor;
    }

    for dim in 0..3 {
        decomposition[dim] = decomposition[dim].min(layout_size[dim]);
    }
    decomposition
}

/// Decomposition plus the layout range of every rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub decomposition: [usize; 3],
    /// One entry per rank, `None` for ranks left without files
    pub ranges: Vec<Option<RankRange>>,
}

impl Partition {
    pub fn new(layout_size: [usize; 3], total_rank: usize) -> Self {
        let total_rank = total_rank.max(1);
        let decomposition = decompose(layout_size, total_rank);

        let step: [usize; 3] = std::array::from_fn(|d| layout_size[d] / decomposition[d]);
        let need_more: [usize; 3] =
            std::array::from_fn(|d| layout_size[d] - step[d] * decomposition[d]);
        // Inclusive [start, end] of every slice along every axis; the first
        // `need_more` slices get one extra file.
        let slices: [Vec<[usize; 2]>; 3] = std::array::from_fn(|d| {
            let mut start = 0;
            (0..decomposition[d])
                .map(|slice| {
                    let size = step[d] + usize::from(slice < need_more[d]);
                    let range = [start, start + size - 1];
                    start += size;
                    range
                })
                .collect()
        });

        let mut ranges = vec![None; total_rank];
        let [dx, dy, dz] = decomposition;
        for z in 0..dz {
            for y in 0..dy {
                for x in 0..dx {
                    let rank = z * dx * dy + y * dx + x;
                    if rank >= total_rank {
                        continue;
                    }
                    ranges[rank] = Some(RankRange {
                        lo: [slices[0][x][0], slices[1][y][0], slices[2][z][0]],
                        hi: [slices[0][x][1], slices[1][y][1], slices[2][z][1]],
                    });
                }
            }
        }

        tracing::debug!(
            "Partitioned layout {:?} over {} ranks as {:?}",
            layout_size,
            total_rank,
            decomposition
        );
        Self { decomposition, ranges }
    }

    pub fn total_rank(&self) -> usize {
        self.ranges.len()
    }

    pub fn range(&self, rank: usize) -> Option<RankRange> {
        self.ranges.get(rank).copied().flatten()
    }

    /// Number of ranks holding at least one file
    pub fn used_ranks(&self) -> usize {
        self.ranges.iter().filter(|r| r.is_some()).count()
    }

    /// `(x, y, z)` position of a used rank inside the decomposition
    pub fn position(&self, rank: usize) -> Option<[usize; 3]> {
        self.range(rank)?;
        let [dx, dy, _] = self.decomposition;
        Some([rank % dx, (rank / dx) % dy, rank / (dx * dy)])
    }

    /// Rank at a decomposition position
    pub fn rank_at(&self, position: [usize; 3]) -> Option<usize> {
        let [dx, dy, dz] = self.decomposition;
        let [x, y, z] = position;
        if x >= dx || y >= dy || z >= dz {
            return None;
        }
        let rank = z * dx * dy + y * dx + x;
        self.range(rank).map(|_| rank)
    }
}
