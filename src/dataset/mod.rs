//! Dataset: the reader facade handed to the rendering pipeline
//!
//! A [`Dataset`] owns the run catalog and the active view for one rank.
//! Stride, spatial sub-view and ghost level changes mark the grid extents
//! stale; the consumer recalculates them and then loads variables one
//! component at a time into its own buffer.

use std::path::Path;

use nalgebra::Vector3;
use ndarray::Array3;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::catalog::{RunCatalog, Variable};
use crate::exchange::HaloExchanger;
use crate::grid::GridAssembler;
use crate::layout::{AxisRange, FileLayoutTable};
use crate::mpi::{Communicator, RankContext};
use crate::part::Part;
use crate::partition::{Extent, View, EMPTY_EXTENT};
use crate::util::config::ReaderConfig;
use crate::util::Timer;
use crate::{time_execution, Error, Result};

/// Conditions the reader recovered from
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Warning {
    #[error("ghost level {requested} exceeds the maximum of {maximum}, clamped")]
    GhostLevelClamped { requested: usize, maximum: usize },

    #[error("piece {piece} is outside the {pieces} available pieces")]
    PieceOutOfRange { piece: usize, pieces: usize },
}

/// Low and high ghost widths for a ghost level on parts of `strided` points
pub fn ghost_widths(level: usize, strided: [usize; 3]) -> (usize, usize) {
    let limit = strided.iter().copied().min().unwrap_or(0);
    (level.min(limit), level.saturating_sub(1).min(limit))
}

/// One rank's reader of a VPIC run
pub struct Dataset<C: Communicator> {
    comm: C,
    context: RankContext,
    config: ReaderConfig,
    catalog: RunCatalog,
    full_layout: FileLayoutTable,
    view: View,
    ghost_level: usize,
    used_ranks: usize,
    parts: Vec<Part>,
    assembler: GridAssembler,
    exchanger: Option<HaloExchanger>,
    warnings: Mutex<Vec<Warning>>,
}

impl<C: Communicator> Dataset<C> {
    /// Parse the catalog at `path` and view the whole layout with the
    /// configured stride.
    pub fn open(path: impl AsRef<Path>, comm: C, config: ReaderConfig) -> Result<Self> {
        let _timer = Timer::new("Dataset::open");
        let catalog = RunCatalog::parse(path)?;
        let full_layout = FileLayoutTable::build(catalog.layout_size())?;
        let context = comm.context();
        let view = View::new(
            &full_layout,
            full_layout.full_extent(),
            catalog.part_size(),
            context.total_rank,
            config.default_stride,
        )?;

        tracing::info!(
            "Rank {}/{} opened {} with {} parts",
            context.rank,
            context.total_rank,
            catalog.path().display(),
            full_layout.len()
        );

        Ok(Self {
            comm,
            context,
            config,
            catalog,
            full_layout,
            view,
            ghost_level: 0,
            used_ranks: 0,
            parts: Vec::new(),
            assembler: GridAssembler::new([0; 3], [0; 3], [0; 3]),
            exchanger: None,
            warnings: Mutex::new(Vec::new()),
        })
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    pub fn context(&self) -> RankContext {
        self.context
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RunCatalog {
        &self.catalog
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn variables(&self) -> &[Variable] {
        self.catalog.variables()
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.catalog.variables().iter().map(|v| v.name.as_str()).collect()
    }

    pub fn number_of_time_steps(&self) -> usize {
        self.catalog.dumps().len()
    }

    /// Simulation time of every dump
    pub fn time_steps(&self) -> Vec<i64> {
        self.catalog.dumps().iter().map(|d| d.time).collect()
    }

    /// Strided grid points of the active view
    pub fn grid_size(&self) -> [usize; 3] {
        self.view.grid_size()
    }

    /// Physical position of the first point of the active view
    pub fn origin(&self) -> Vector3<f32> {
        let first = self.view.extent().map(|r| r[0]);
        let part_size = self.catalog.part_size();
        let shift = Vector3::from_fn(|d, _| (first[d] * part_size[d]) as f32);
        self.catalog.origin() + shift.component_mul(&self.catalog.step())
    }

    /// Physical distance between neighboring strided points
    pub fn step(&self) -> Vector3<f32> {
        let stride = self.view.stride();
        self.catalog
            .step()
            .component_mul(&Vector3::from_fn(|d, _| stride[d] as f32))
    }

    pub fn stride(&self) -> [usize; 3] {
        self.view.stride()
    }

    pub fn ghost_level(&self) -> usize {
        self.ghost_level
    }

    pub fn whole_extent(&self) -> Extent {
        self.view.whole_extent()
    }

    /// Sub-extent of every rank, empty for unused ranks
    pub fn subextents(&self) -> &[Extent] {
        self.view.subextents()
    }

    /// Ranks that hold data, as agreed by all ranks
    pub fn used_ranks(&self) -> usize {
        self.used_ranks
    }

    /// Shape `(x, y, z)` of the buffer [`load_variable_data`] fills
    ///
    /// [`load_variable_data`]: Self::load_variable_data
    pub fn local_dimensions(&self) -> [usize; 3] {
        self.assembler.ghosted_dimensions()
    }

    /// Values [`load_variable_data`](Self::load_variable_data) writes
    pub fn local_len(&self) -> usize {
        self.assembler.len()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    pub fn take_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    /// Record a recovered condition. A repeat of the most recent warning
    /// is not stored again.
    fn warn(&self, warning: Warning) {
        let mut warnings = self.warnings.lock();
        if warnings.last() == Some(&warning) {
            tracing::debug!("{} (repeated)", warning);
            return;
        }
        tracing::warn!("{}", warning);
        warnings.push(warning);
    }

    fn clamp_ghost_level(&self, requested: usize) -> usize {
        let maximum = self.config.max_ghost_level;
        if requested > maximum {
            self.warn(Warning::GhostLevelClamped { requested, maximum });
            return maximum;
        }
        requested
    }

    /// Extent of `piece` when the grid is split into `num_pieces` pieces,
    /// grown by `ghost_level` and clipped to the whole extent.
    ///
    /// Pieces map onto ranks; only the first `min(num_pieces, ranks)` pieces
    /// exist, every other piece is empty.
    pub fn piece_extent(&self, piece: usize, num_pieces: usize, ghost_level: usize) -> Extent {
        let pieces = num_pieces.min(self.view.subextents().len());
        if piece >= pieces {
            self.warn(Warning::PieceOutOfRange { piece, pieces });
            return EMPTY_EXTENT;
        }
        let level = self.clamp_ghost_level(ghost_level);
        let (ghost0, ghost1) = ghost_widths(level, self.view.strided_part_size());
        self.view.ghost_extent(piece, ghost0, ghost1)
    }

    /// Restrict reading to the inclusive file index ranges, clamped to the
    /// catalog layout. Returns whether the view changed.
    pub fn set_view(&mut self, x: AxisRange, y: AxisRange, z: AxisRange) -> Result<bool> {
        let layout = self.full_layout.layout_size();
        let extent: [AxisRange; 3] = std::array::from_fn(|d| {
            let range = [x, y, z][d];
            let hi = range[1].min(layout[d] - 1);
            [range[0].min(hi), hi]
        });
        if extent == self.view.extent() {
            return Ok(false);
        }

        let view = View::new(
            &self.full_layout,
            extent,
            self.catalog.part_size(),
            self.context.total_rank,
            self.view.stride(),
        )?;
        self.view = view;
        self.parts.clear();
        tracing::info!("View restricted to files {:?}", extent);
        Ok(true)
    }

    /// Returns whether the clamped stride changed.
    pub fn set_stride(&mut self, stride: [usize; 3]) -> bool {
        let changed = self.view.set_stride(stride);
        if changed {
            tracing::debug!("Stride set to {:?}", self.view.stride());
        }
        changed
    }

    /// Returns whether the effective ghost level changed.
    pub fn set_ghost_level(&mut self, level: usize) -> bool {
        let level = self.clamp_ghost_level(level);
        if level == self.ghost_level {
            return false;
        }
        self.ghost_level = level;
        self.view.invalidate();
        true
    }

    pub fn needs_grid_calculation(&self) -> bool {
        self.view.needs_grid_calculation()
    }

    /// Recompute sub-extents for the current stride, agree on the number of
    /// used ranks and rebuild this rank's parts and exchange plan.
    pub fn calculate_grid_extents(&mut self) -> Result<()> {
        let _timer = Timer::new("calculate_grid_extents");
        self.view.calculate_grid_extents();

        let rank = self.context.rank;
        let owns_data = self.view.partition().range(rank).is_some();
        let used = self.comm.all_reduce_sum(i64::from(owns_data))?;
        let expected = self.view.partition().used_ranks();
        if used != expected as i64 {
            return Err(Error::Communication(format!(
                "ranks disagree on the partition: {used} report data, {expected} expected"
            )));
        }
        self.used_ranks = expected;

        let strided = self.view.strided_part_size();
        let subdimension = self.view.subdimension(rank);
        self.parts = match self.view.partition().range(rank) {
            Some(range) => self
                .view
                .parts_for(rank)
                .into_iter()
                .map(|owned| Part::new(owned, strided, range.files(), subdimension))
                .collect(),
            None => Vec::new(),
        };

        let (ghost0, ghost1) = ghost_widths(self.ghost_level, strided);
        let sub = self.view.subextent(rank);
        let grown = self.view.ghost_extent(rank, ghost0, ghost1);
        let low = std::array::from_fn(|d| (sub[2 * d] - grown[2 * d]) as usize);
        let high = std::array::from_fn(|d| (grown[2 * d + 1] - sub[2 * d + 1]) as usize);
        self.assembler = GridAssembler::new(subdimension, low, high);
        self.exchanger = Some(HaloExchanger::new(
            self.context,
            self.view.partition(),
            self.assembler,
            ghost0,
            ghost1,
        ));

        tracing::info!(
            "Rank {} owns {} parts, sub-extent {:?}, {} of {} ranks used",
            rank,
            self.parts.len(),
            sub,
            self.used_ranks,
            self.context.total_rank
        );
        Ok(())
    }

    /// Load output `component` of `variable` at `time_step` into `buffer`,
    /// laid out as [`local_dimensions`](Self::local_dimensions) with `x`
    /// fastest, ghost bands included.
    pub fn load_variable_data(
        &mut self,
        buffer: &mut [f32],
        time_step: usize,
        variable: usize,
        component: usize,
    ) -> Result<()> {
        if self.view.needs_grid_calculation() {
            return Err(Error::GridNotCalculated);
        }
        let var = self
            .catalog
            .variable(variable)
            .ok_or_else(|| Error::InvalidArgument(format!("no variable with index {variable}")))?;
        if component >= var.output_components() {
            return Err(Error::InvalidArgument(format!(
                "{} has {} components, requested {component}",
                var.name,
                var.output_components()
            )));
        }
        if time_step >= self.catalog.dumps().len() {
            return Err(Error::InvalidArgument(format!(
                "time step {time_step} out of range ({} dumps)",
                self.catalog.dumps().len()
            )));
        }
        let name = var.name.clone();

        if self.view.current_time_step() != Some(time_step) {
            for part in &mut self.parts {
                part.set_time_step(&self.catalog, time_step)?;
            }
            self.view.set_current_time_step(time_step);
        }

        let catalog = &self.catalog;
        let stride = self.view.stride();
        let parallel = self.config.parallel_part_loads && self.parts.len() > 1;
        let blocks: Vec<Array3<f32>> = time_execution!(format!("Loading {name}[{component}]"), {
            let load = |part: &Part| part.load(catalog, variable, component, stride);
            if parallel {
                self.parts.par_iter().map(load).collect::<Result<_>>()
            } else {
                self.parts.iter().map(load).collect::<Result<_>>()
            }
        })?;

        self.assembler.assemble(buffer, self.parts.iter().zip(blocks))?;

        if self.context.is_parallel() {
            if let Some(exchanger) = self.exchanger.as_mut() {
                exchanger.exchange_grid(&self.comm, buffer)?;
            }
        }
        Ok(())
    }

    /// Pick up dumps written since the last scan. Returns whether the list
    /// of time steps grew.
    ///
    /// When the first dump of a run shows a part size other than the one
    /// derived from the catalog extents, the view is rebuilt and the grid
    /// must be recalculated.
    pub fn add_new_time_steps(&mut self) -> Result<bool> {
        let part_size = self.catalog.part_size();
        let added = self.catalog.add_new_time_steps()?;
        if self.catalog.part_size() != part_size {
            self.view = View::new(
                &self.full_layout,
                self.view.extent(),
                self.catalog.part_size(),
                self.context.total_rank,
                self.view.stride(),
            )?;
            self.parts.clear();
        }
        Ok(added)
    }
}
