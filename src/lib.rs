//! # Vistle VPIC - Parallel reader for particle-in-cell simulation output
//!
//! A VPIC run writes one binary file per simulation process, per data kind,
//! per dump. This crate parses the run catalog, distributes the file parts
//! across the reader's ranks, loads strided variable blocks, assembles them
//! into one sub-grid per rank and exchanges ghost bands between neighboring
//! ranks. The rendering pipeline only talks to [`Dataset`].

use std::path::PathBuf;

pub mod catalog;
pub mod dataset;
pub mod exchange;
pub mod grid;
pub mod layout;
pub mod mpi;
pub mod part;
pub mod partition;
pub mod util;

pub use catalog::{BasicKind, DataKind, Dump, RunCatalog, StructKind, Variable};
pub use dataset::{Dataset, Warning};
pub use exchange::HaloExchanger;
pub use grid::GridAssembler;
pub use layout::FileLayoutTable;
pub use crate::mpi::{Communicator, LocalCommunicator, RankContext, SerialCommunicator};
#[cfg(feature = "mpi")]
pub use crate::mpi::MpiCommunicator;
pub use part::{ByteOrder, Header, Part, PartLoader};
pub use partition::{Extent, Partition, RankRange, View, EMPTY_EXTENT};
pub use util::config::ReaderConfig;

/// Install the global tracing subscriber.
///
/// Unknown levels fall back to `info`. Calling this more than once is
/// harmless; only the first subscriber is installed.
pub fn init_logging(level: &str) {
    let level = level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();

    tracing::debug!("Initializing Vistle VPIC v{}", env!("CARGO_PKG_VERSION"));
}

/// Main error type for VPIC reader operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{}:{line}: {message}", path.display())]
    ConfigParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Cannot open part file {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inconsistent header in {}: {message}", path.display())]
    HeaderConsistency { path: PathBuf, message: String },

    #[error("Grid extents must be recalculated before loading data")]
    GridNotCalculated,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
