//! Ghost band exchange between neighboring ranks
//!
//! Every rank talks to up to 26 neighbors, one per direction of the
//! 3x3x3 stencil. For each direction `d`, taken in the same order on every
//! rank, a rank sends the band next to its `+d` side to the rank at `+d`
//! and receives from the rank at `-d` into its `-d` ghost band. Along axes
//! where `d` is zero the band spans the interior, so edges and corners are
//! filled by the diagonal directions.

use std::ops::Range;

use ndarray::s;

use crate::grid::GridAssembler;
use crate::mpi::{Communicator, RankContext};
use crate::partition::Partition;
use crate::Result;

/// Directions of the 3x3x3 stencil without the center
pub const NUM_OF_NEIGHBORS: usize = 26;

/// Half-open index ranges along `x`, `y`, `z` of the ghosted grid
type Region = [Range<usize>; 3];

fn volume(region: &Region) -> usize {
    region.iter().map(|r| r.len()).product()
}

/// Stencil directions in exchange order, `x` varying fastest
pub fn directions() -> impl Iterator<Item = [i32; 3]> {
    (-1..=1)
        .flat_map(|z| (-1..=1).flat_map(move |y| (-1..=1).map(move |x| [x, y, z])))
        .filter(|d| *d != [0, 0, 0])
}

#[derive(Debug, Clone)]
struct Neighbor {
    tag: i32,
    direction: [i32; 3],
    to: Option<usize>,
    from: Option<usize>,
    send: Region,
    recv: Region,
}

/// Precomputed exchange plan for one rank
#[derive(Debug)]
pub struct HaloExchanger {
    context: RankContext,
    assembler: GridAssembler,
    neighbors: Vec<Neighbor>,
    send_buffer: Vec<f32>,
    recv_buffer: Vec<f32>,
}

impl HaloExchanger {
    /// Plan the exchange of a rank whose grid has the shape of `assembler`.
    ///
    /// `ghost0` is the width of a neighbor's low ghost band and `ghost1` the
    /// width of its high band; both are what this rank sends.
    pub fn new(
        context: RankContext,
        partition: &Partition,
        assembler: GridAssembler,
        ghost0: usize,
        ghost1: usize,
    ) -> Self {
        let mut neighbors = Vec::new();
        if let Some(position) = partition.position(context.rank) {
            let low = assembler.low_ghost();
            let high = assembler.high_ghost();
            let sub = assembler.subdimension();
            let offset = |delta: [i32; 3], sign: i32| -> Option<usize> {
                let mut target = [0usize; 3];
                for d in 0..3 {
                    let p = position[d] as i64 + (sign * delta[d]) as i64;
                    if p < 0 {
                        return None;
                    }
                    target[d] = p as usize;
                }
                partition.rank_at(target)
            };

            for (index, direction) in directions().enumerate() {
                let send: Region = std::array::from_fn(|d| {
                    let o = low[d];
                    match direction[d] {
                        0 => o..o + sub[d],
                        1 => (o + sub[d]).saturating_sub(1 + ghost0)..(o + sub[d]).saturating_sub(1),
                        _ => o + 1..(o + 1 + ghost1).min(o + sub[d]),
                    }
                });
                let recv: Region = std::array::from_fn(|d| {
                    let o = low[d];
                    match direction[d] {
                        0 => o..o + sub[d],
                        1 => 0..low[d],
                        _ => o + sub[d]..o + sub[d] + high[d],
                    }
                });
                let to = offset(direction, 1).filter(|_| volume(&send) > 0);
                let from = offset(direction, -1).filter(|_| volume(&recv) > 0);
                if to.is_some() || from.is_some() {
                    neighbors.push(Neighbor {
                        tag: index as i32,
                        direction,
                        to,
                        from,
                        send,
                        recv,
                    });
                }
            }
        }

        let largest = neighbors
            .iter()
            .map(|n| volume(&n.send).max(volume(&n.recv)))
            .max()
            .unwrap_or(0);
        tracing::debug!(
            "Rank {} exchanges with {} of {} directions, buffers of {} values",
            context.rank,
            neighbors.len(),
            NUM_OF_NEIGHBORS,
            largest
        );

        Self {
            context,
            assembler,
            neighbors,
            send_buffer: vec![0.0; largest],
            recv_buffer: vec![0.0; largest],
        }
    }

    pub fn context(&self) -> RankContext {
        self.context
    }

    /// Directions with a peer on at least one side
    pub fn active_directions(&self) -> Vec<[i32; 3]> {
        self.neighbors.iter().map(|n| n.direction).collect()
    }

    /// Fill the ghost bands of `grid` from the neighboring ranks.
    pub fn exchange_grid(&mut self, comm: &dyn Communicator, grid: &mut [f32]) -> Result<()> {
        let mut grid = self.assembler.view_mut(grid)?;

        for neighbor in &self.neighbors {
            let send = match neighbor.to {
                Some(to) => {
                    let [x, y, z] = neighbor.send.clone();
                    let band = grid.slice(s![z, y, x]);
                    let len = band.len();
                    for (dst, src) in self.send_buffer.iter_mut().zip(band.iter()) {
                        *dst = *src;
                    }
                    Some((to, &self.send_buffer[..len]))
                }
                None => None,
            };
            let recv_len = volume(&neighbor.recv);
            let recv = neighbor
                .from
                .map(|from| (from, &mut self.recv_buffer[..recv_len]));

            comm.send_receive(neighbor.tag, send, recv)?;

            if neighbor.from.is_some() {
                let [x, y, z] = neighbor.recv.clone();
                let mut band = grid.slice_mut(s![z, y, x]);
                for (dst, src) in band.iter_mut().zip(self.recv_buffer[..recv_len].iter()) {
                    *dst = *src;
                }
            }
        }
        Ok(())
    }
}
