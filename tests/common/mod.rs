//! Synthetic VPIC runs for the integration tests
//!
//! Every stored component holds an analytic function of the full
//! resolution global point index, so any loaded point, ghost points
//! included, can be checked exactly.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vistle_vpic::{ByteOrder, Communicator, Dataset, Header};

pub const ELECTRIC_FIELD: usize = 0;
pub const CHARGE_DENSITY: usize = 1;
pub const CELL_MATERIAL: usize = 2;
pub const STRESS_TENSOR: usize = 3;

/// Stored tensor component behind each of the 9 output components
pub const TENSOR6_SOURCE: [usize; 9] = [0, 5, 4, 5, 1, 3, 4, 3, 2];

const HYDRO_SLOTS: usize = 10;

fn float_value(time: i64, slot: usize, full: [i64; 3]) -> f32 {
    (time * 2_000_000 + slot as i64 * 100_000 + full[0] + 100 * full[1] + 10_000 * full[2]) as f32
}

fn material_value(time: i64, full: [i64; 3]) -> i16 {
    (full[0] + 2 * full[1] + 3 * full[2] + time) as i16
}

/// Value of output `component` of `variable` at a full resolution point
pub fn expected(time: i64, variable: usize, component: usize, full: [i64; 3]) -> f32 {
    match variable {
        ELECTRIC_FIELD => float_value(time, component, full),
        CHARGE_DENSITY => float_value(time, 3, full),
        CELL_MATERIAL => f32::from(material_value(time, full)),
        STRESS_TENSOR => float_value(time, HYDRO_SLOTS + TENSOR6_SOURCE[component], full),
        _ => panic!("no variable {variable}"),
    }
}

/// A run directory with a catalog and any number of dumps
pub struct SyntheticRun {
    pub dir: TempDir,
    pub layout: [usize; 3],
    pub part: [usize; 3],
}

impl SyntheticRun {
    /// Write the catalog; no dumps yet.
    pub fn new(layout: [usize; 3], part: [usize; 3]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let run = Self { dir, layout, part };
        fs::write(run.catalog_path(), run.catalog_text()).unwrap();
        run
    }

    /// Catalog plus the given dumps.
    pub fn with_dumps(layout: [usize; 3], part: [usize; 3], times: &[i64]) -> Self {
        let run = Self::new(layout, part);
        for &time in times {
            run.write_dump(time);
        }
        run
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.path().join("run.vpc")
    }

    pub fn total_parts(&self) -> usize {
        self.layout.iter().product()
    }

    fn catalog_text(&self) -> String {
        let extent = |d: usize| (self.layout[d] * self.part[d]) as f32 * 0.5;
        format!(
            r#"# synthetic run
VPIC_HEADER_VERSION 1.0.0
DATA_HEADER_SIZE 123
GRID_DELTA_T 0.1
GRID_CVAC 1
GRID_EPS0 1
GRID_EXTENTS_X 0 {}
GRID_EXTENTS_Y 0 {}
GRID_EXTENTS_Z 0 {}
GRID_DELTA_X 0.5
GRID_DELTA_Y 0.5
GRID_DELTA_Z 0.5
GRID_TOPOLOGY_X {}
GRID_TOPOLOGY_Y {}
GRID_TOPOLOGY_Z {}

FIELD_DATA_DIRECTORY fields
FIELD_DATA_BASE_FILENAME fields
FIELD_DATA_VARIABLES 3
"Electric Field" VECTOR 3 FLOATING_POINT 4
"Charge Density" SCALAR 1 FLOATING_POINT 4
"Cell Material" SCALAR 1 INTEGER 2

NUM_OUTPUT_SPECIES 1
SPECIES_DATA_DIRECTORY hydro
SPECIES_DATA_BASE_FILENAME ehydro
HYDRO_DATA_VARIABLES 1
"Stress Tensor" TENSOR 6 FLOATING_POINT 4
"#,
            extent(0),
            extent(1),
            extent(2),
            self.layout[0],
            self.layout[1],
            self.layout[2]
        )
    }

    /// Path of the part file of `kind` ("fields" or "ehydro").
    pub fn part_path(&self, kind: &str, time: i64, part: usize) -> PathBuf {
        let directory = if kind == "fields" { "fields" } else { "hydro" };
        self.dir
            .path()
            .join(directory)
            .join(format!("T.{time}"))
            .join(format!("{kind}.{time:06}.{part:03}"))
    }

    /// Write every part of both data kinds for `time`. Odd parts are stored
    /// big endian, even parts little endian.
    pub fn write_dump(&self, time: i64) {
        for part in 0..self.total_parts() {
            let order = if part % 2 == 1 { ByteOrder::Big } else { ByteOrder::Little };
            let position = [
                part % self.layout[0],
                (part / self.layout[0]) % self.layout[1],
                part / (self.layout[0] * self.layout[1]),
            ];
            let points = self.ghosted_points(position);

            let mut fields = self.header(time, part).encode(order);
            for slot in 0..4 {
                for &full in &points {
                    push_f32(&mut fields, float_value(time, slot, full), order);
                }
            }
            for &full in &points {
                let value = material_value(time, full);
                match order {
                    ByteOrder::Little => fields.extend_from_slice(&value.to_le_bytes()),
                    ByteOrder::Big => fields.extend_from_slice(&value.to_be_bytes()),
                }
            }
            write(&self.part_path("fields", time, part), &fields);

            let mut hydro = self.header(time, part).encode(order);
            for slot in 0..6 {
                for &full in &points {
                    push_f32(&mut hydro, float_value(time, HYDRO_SLOTS + slot, full), order);
                }
            }
            write(&self.part_path("ehydro", time, part), &hydro);
        }
    }

    fn header(&self, time: i64, part: usize) -> Header {
        let grid_size = self.part.map(|n| n as i32);
        Header {
            version: 0,
            dump_type: 1,
            dump_time: time as i32,
            grid_size,
            delta_time: 0.1,
            grid_step: [0.5; 3],
            cvac: 1.0,
            eps0: 1.0,
            rank: part as i32,
            total_rank: self.total_parts() as i32,
            record_size: 4,
            number_of_dimensions: 3,
            ghost_size: grid_size.map(|n| n + 2),
            ..Header::default()
        }
    }

    /// Full resolution global index of every ghosted point of a part, `x`
    /// fastest. Ghosted index `a` sits at `position * n + a - 1`.
    fn ghosted_points(&self, position: [usize; 3]) -> Vec<[i64; 3]> {
        let global = |d: usize, a: usize| (position[d] * self.part[d] + a) as i64 - 1;
        let mut points = Vec::new();
        for z in 0..self.part[2] + 2 {
            for y in 0..self.part[1] + 2 {
                for x in 0..self.part[0] + 2 {
                    points.push([global(0, x), global(1, y), global(2, z)]);
                }
            }
        }
        points
    }
}

fn push_f32(bytes: &mut Vec<u8>, value: f32, order: ByteOrder) {
    match order {
        ByteOrder::Little => bytes.extend_from_slice(&value.to_le_bytes()),
        ByteOrder::Big => bytes.extend_from_slice(&value.to_be_bytes()),
    }
}

fn write(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// Check every point of a loaded buffer, ghost bands included, against the
/// analytic field.
pub fn check_buffer<C: Communicator>(
    dataset: &Dataset<C>,
    buffer: &[f32],
    time: i64,
    variable: usize,
    component: usize,
) {
    let context = dataset.context();
    let grown = dataset.piece_extent(context.rank, context.total_rank, dataset.ghost_level());
    let [nx, ny, nz] = dataset.local_dimensions();
    assert_eq!(
        [nx, ny, nz],
        [0, 1, 2].map(|d| (grown[2 * d + 1] - grown[2 * d] + 1) as usize)
    );

    let stride = dataset.stride();
    let first_file = dataset.view().extent().map(|r| r[0]);
    let part = dataset.catalog().part_size();
    // grid point g sits in file g / s at decimated index g % s
    let full = |d: usize, local: usize| {
        let strided = part[d] / stride[d];
        let g = grown[2 * d] as usize + local;
        ((first_file[d] + g / strided) * part[d] + (g % strided) * stride[d]) as i64
    };

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let index = (z * ny + y) * nx + x;
                let point = [full(0, x), full(1, y), full(2, z)];
                assert_eq!(
                    buffer[index],
                    expected(time, variable, component, point),
                    "rank {} variable {variable}[{component}] at local {:?}, global {:?}",
                    context.rank,
                    [x, y, z],
                    point
                );
            }
        }
    }
}
