//! File parts: the per-process files of one dump and how a rank reads them

pub mod header;
pub mod loader;

pub use header::{ByteOrder, Header};
pub use loader::PartLoader;

use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::catalog::RunCatalog;
use crate::partition::view::OwnedPart;
use crate::{Error, Result};

/// One file part assigned to the local rank
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Part ID in the simulation layout
    pub id: usize,
    /// Position among the rank's parts, in files
    pub part_offset: [usize; 3],
    /// Position of the first contributed point in the rank's sub-grid
    pub grid_offset: [usize; 3],
    /// Points contributed along each axis
    pub counts: [usize; 3],
    /// One file per data kind for the current time step
    files: Vec<PathBuf>,
    time_step: Option<usize>,
}

impl Part {
    /// Place an owned part inside a rank whose sub-grid is `subdimension`
    /// points and spans `files` parts per axis.
    ///
    /// The last part along an axis also supplies the overlap point shared
    /// with the next rank, when the sub-grid includes it.
    pub fn new(owned: OwnedPart, strided: [usize; 3], files: [usize; 3], subdimension: [usize; 3]) -> Self {
        let grid_offset: [usize; 3] = std::array::from_fn(|d| owned.part_offset[d] * strided[d]);
        let counts = std::array::from_fn(|d| {
            if owned.part_offset[d] + 1 == files[d] {
                subdimension[d].saturating_sub(grid_offset[d])
            } else {
                strided[d]
            }
        });
        Self {
            id: owned.id,
            part_offset: owned.part_offset,
            grid_offset,
            counts,
            files: Vec::new(),
            time_step: None,
        }
    }

    /// Point this part at the files of `time_step`.
    pub fn set_time_step(&mut self, catalog: &RunCatalog, time_step: usize) -> Result<()> {
        if self.time_step == Some(time_step) {
            return Ok(());
        }
        let dump = catalog.dump(time_step).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "time step {time_step} out of range ({} dumps)",
                catalog.dumps().len()
            ))
        })?;
        self.files = catalog
            .kinds()
            .iter()
            .map(|kind| kind.file_name(dump, self.id))
            .collect();
        self.time_step = Some(time_step);
        Ok(())
    }

    pub fn time_step(&self) -> Option<usize> {
        self.time_step
    }

    pub fn file(&self, kind: usize) -> Option<&Path> {
        self.files.get(kind).map(PathBuf::as_path)
    }

    /// Load output `component` of `variable`, decimated by `stride`.
    pub fn load(
        &self,
        catalog: &RunCatalog,
        variable: usize,
        component: usize,
        stride: [usize; 3],
    ) -> Result<Array3<f32>> {
        let var = catalog
            .variable(variable)
            .ok_or_else(|| Error::InvalidArgument(format!("no variable with index {variable}")))?;
        let stored = var.stored_component(component).ok_or_else(|| {
            Error::InvalidArgument(format!("{} has no component {component}", var.name))
        })?;
        let offset = catalog
            .variable_offset(variable, stored)
            .ok_or_else(|| Error::InvalidArgument(format!("no offset for {} component {stored}", var.name)))?;
        let path = self
            .file(var.kind)
            .ok_or_else(|| Error::InvalidArgument(format!("part {} has no time step set", self.id)))?;

        let mut loader = PartLoader::open(path)?;
        loader.check_shape(catalog.part_size(), catalog.ghost_size())?;
        loader.load_component(var, offset, stride, self.counts)
    }
}
