//! Run catalog: variables, grid constants, data directories and dumps

pub mod dumps;
pub mod parser;
pub mod variable;

pub use dumps::{Dump, FileNaming};
pub use parser::{KindDecl, ParsedCatalog, DEFAULT_HEADER_SIZE};
pub use variable::{BasicKind, StructKind, Variable};

use std::path::{Path, PathBuf};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::part::Header;
use crate::{Error, Result};

/// One data kind: the field data or one particle species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataKind {
    pub directory: PathBuf,
    pub base_name: String,
    pub naming: FileNaming,
}

impl DataKind {
    /// Path of the file written by simulation process `part` for `dump`.
    pub fn file_name(&self, dump: &Dump, part: usize) -> PathBuf {
        self.directory
            .join(&dump.name)
            .join(self.naming.file_name(&self.base_name, dump.time, part))
    }

    fn detect_naming(&mut self, dump: &Dump) {
        if let Some(naming) = FileNaming::detect(&self.directory.join(&dump.name), &self.base_name) {
            self.naming = naming;
        }
    }
}

/// Part and ghosted part size from the header of part 0 of `dump`
fn probe_part_size(kind: &DataKind, dump: &Dump) -> Result<([usize; 3], [usize; 3])> {
    let (header, _) = Header::read(&kind.file_name(dump, 0))?;
    Ok((header.grid_size(), header.ghost_size()))
}

/// Parsed description of one simulation run
#[derive(Debug, Clone)]
pub struct RunCatalog {
    path: PathBuf,
    header_version: Option<String>,
    header_size: u64,
    delta_time: f32,
    cvac: f32,
    eps0: f32,
    layout_size: [usize; 3],
    part_size: [usize; 3],
    ghost_size: [usize; 3],
    origin: Vector3<f32>,
    step: Vector3<f32>,
    kinds: Vec<DataKind>,
    variables: Vec<Variable>,
    /// Byte offset of every stored component inside its data kind's file
    offsets: Vec<Vec<u64>>,
    dumps: Vec<Dump>,
}

impl RunCatalog {
    /// Parse the catalog at `path`, discover its dumps and probe the first
    /// field part for the per-file grid size.
    pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = parser::parse_catalog(&text, path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut kinds: Vec<DataKind> = parsed
            .kinds
            .iter()
            .map(|decl| DataKind {
                directory: base_dir.join(&decl.directory),
                base_name: decl.base_name.clone(),
                naming: FileNaming::default(),
            })
            .collect();

        let dumps = dumps::scan_dumps(&kinds[0].directory)?;
        if let Some(first) = dumps.first() {
            kinds.iter_mut().for_each(|kind| kind.detect_naming(first));
        }

        let (part_size, ghost_size) = match dumps.first() {
            Some(first) => probe_part_size(&kinds[0], first)?,
            None => {
                let part_size: [usize; 3] =
                    std::array::from_fn(|d| parsed.cells_from_extents(d) / parsed.topology[d]);
                (part_size, part_size.map(|n| n + 2))
            }
        };
        if part_size.iter().any(|&n| n == 0) {
            return Err(Error::ConfigParse {
                path: path.to_path_buf(),
                line: 0,
                message: format!("cannot determine a non-empty part size (got {part_size:?})"),
            });
        }

        let catalog = Self::from_parts(path, parsed, kinds, part_size, ghost_size, dumps);
        tracing::info!(
            "Catalog {}: layout {:?}, part size {:?}, {} variables, {} dumps",
            path.display(),
            catalog.layout_size,
            catalog.part_size,
            catalog.variables.len(),
            catalog.dumps.len()
        );
        Ok(catalog)
    }

    fn from_parts(
        path: &Path,
        parsed: ParsedCatalog,
        kinds: Vec<DataKind>,
        part_size: [usize; 3],
        ghost_size: [usize; 3],
        dumps: Vec<Dump>,
    ) -> Self {
        let block_size: usize = ghost_size.iter().product();
        let offsets = compute_offsets(&parsed.variables, parsed.header_size, block_size);

        Self {
            path: path.to_path_buf(),
            header_version: parsed.header_version,
            header_size: parsed.header_size,
            delta_time: parsed.delta_time,
            cvac: parsed.cvac,
            eps0: parsed.eps0,
            layout_size: parsed.topology,
            part_size,
            ghost_size,
            origin: Vector3::new(parsed.extents[0][0], parsed.extents[1][0], parsed.extents[2][0]),
            step: Vector3::from(parsed.delta),
            kinds,
            variables: parsed.variables,
            offsets,
            dumps,
        }
    }

    /// Rescan the dump directory and append dumps written since the last
    /// scan. Existing entries are never removed.
    pub fn add_new_time_steps(&mut self) -> Result<bool> {
        let scanned = dumps::scan_dumps(&self.kinds[0].directory)?;
        let was_empty = self.dumps.is_empty();
        let added = dumps::merge_dumps(&mut self.dumps, scanned);

        if added && was_empty {
            if let Some(first) = self.dumps.first().cloned() {
                self.kinds.iter_mut().for_each(|kind| kind.detect_naming(&first));
                let (part_size, ghost_size) = probe_part_size(&self.kinds[0], &first)?;
                if (part_size, ghost_size) != (self.part_size, self.ghost_size) {
                    tracing::info!(
                        "First dump has parts of {:?} ({:?} with ghosts), catalog extents gave {:?}",
                        part_size,
                        ghost_size,
                        self.part_size
                    );
                    self.part_size = part_size;
                    self.ghost_size = ghost_size;
                    let block_size: usize = ghost_size.iter().product();
                    self.offsets = compute_offsets(&self.variables, self.header_size, block_size);
                }
            }
        }
        if added {
            tracing::info!("Catalog now lists {} dumps", self.dumps.len());
        }
        Ok(added)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header_version(&self) -> Option<&str> {
        self.header_version.as_deref()
    }

    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn cvac(&self) -> f32 {
        self.cvac
    }

    pub fn eps0(&self) -> f32 {
        self.eps0
    }

    /// Files per dimension
    pub fn layout_size(&self) -> [usize; 3] {
        self.layout_size
    }

    pub fn total_parts(&self) -> usize {
        self.layout_size.iter().product()
    }

    /// Grid cells per file, without ghosts
    pub fn part_size(&self) -> [usize; 3] {
        self.part_size
    }

    /// Grid cells per file including the ghost ring
    pub fn ghost_size(&self) -> [usize; 3] {
        self.ghost_size
    }

    pub fn origin(&self) -> Vector3<f32> {
        self.origin
    }

    pub fn step(&self) -> Vector3<f32> {
        self.step
    }

    pub fn kinds(&self) -> &[DataKind] {
        &self.kinds
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, index: usize) -> Option<&Variable> {
        self.variables.get(index)
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    /// File offset of a stored component of a variable
    pub fn variable_offset(&self, variable: usize, component: usize) -> Option<u64> {
        self.offsets.get(variable)?.get(component).copied()
    }

    pub fn dumps(&self) -> &[Dump] {
        &self.dumps
    }

    pub fn dump(&self, time_step: usize) -> Option<&Dump> {
        self.dumps.get(time_step)
    }

    /// Part file of `variable`'s data kind for `time_step`
    pub fn file_name(&self, variable: usize, time_step: usize, part: usize) -> Option<PathBuf> {
        let kind = self.kinds.get(self.variables.get(variable)?.kind)?;
        Some(kind.file_name(self.dumps.get(time_step)?, part))
    }
}

/// Walk the variables in catalog order and lay their stored components out
/// one ghosted block after another. Every data kind's file starts right
/// after the fixed header.
pub fn compute_offsets(variables: &[Variable], header_size: u64, block_size: usize) -> Vec<Vec<u64>> {
    let mut next_offset: Vec<u64> = Vec::new();

    variables
        .iter()
        .map(|var| {
            if next_offset.len() <= var.kind {
                next_offset.resize(var.kind + 1, header_size);
            }
            (0..var.stored_components())
                .map(|_| {
                    let offset = next_offset[var.kind];
                    next_offset[var.kind] += (block_size * var.byte_width) as u64;
                    offset
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, struct_kind: StructKind, byte_width: usize, kind: usize) -> Variable {
        Variable {
            name: name.to_string(),
            struct_kind,
            basic_kind: BasicKind::Float,
            byte_width,
            kind,
        }
    }

    #[test]
    fn test_offsets_restart_per_kind() {
        let variables = vec![
            var("E", StructKind::Vector, 4, 0),
            var("rho", StructKind::Scalar, 4, 0),
            var("mat", StructKind::Scalar, 2, 0),
            var("J (e)", StructKind::Vector, 4, 1),
            var("T (e)", StructKind::Tensor6, 4, 1),
        ];
        let block = 10 * 10 * 3;
        let offsets = compute_offsets(&variables, 123, block);

        assert_eq!(offsets[0], vec![123, 123 + 1200, 123 + 2400]);
        assert_eq!(offsets[1], vec![123 + 3600]);
        assert_eq!(offsets[2], vec![123 + 4800]);
        // species file starts over after the header
        assert_eq!(offsets[3], vec![123, 1323, 2523]);
        assert_eq!(offsets[4].len(), 6);
        assert_eq!(offsets[4][0], 123 + 3 * 1200);
        assert_eq!(offsets[4][5], 123 + 8 * 1200);
    }

    #[test]
    fn test_data_kind_file_name() {
        let kind = DataKind {
            directory: PathBuf::from("/run/fields"),
            base_name: "fields".to_string(),
            naming: FileNaming {
                time_width: 6,
                part_width: 2,
            },
        };
        assert_eq!(
            kind.file_name(&Dump::new(40), 3),
            PathBuf::from("/run/fields/T.40/fields.000040.03")
        );
    }
}
