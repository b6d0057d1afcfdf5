//! Reads variable blocks out of one part file

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ndarray::{Array3, Axis};

use crate::catalog::{BasicKind, Variable};
use crate::part::header::{ByteOrder, Decoder, Header};
use crate::{Error, Result};

/// Open part file with its validated header
pub struct PartLoader {
    path: PathBuf,
    reader: BufReader<File>,
    header: Header,
    order: ByteOrder,
}

impl PartLoader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let (header, order) = Header::read_from(&mut reader, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header,
            order,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Fail unless the header describes parts of the given shape.
    pub fn check_shape(&self, part_size: [usize; 3], ghost_size: [usize; 3]) -> Result<()> {
        if self.header.grid_size() != part_size || self.header.ghost_size() != ghost_size {
            return Err(Error::HeaderConsistency {
                path: self.path.clone(),
                message: format!(
                    "part is {:?} ({:?} with ghosts), catalog expects {:?} ({:?})",
                    self.header.grid_size(),
                    self.header.ghost_size(),
                    part_size,
                    ghost_size
                ),
            });
        }
        Ok(())
    }

    /// Read `count` elements at byte `offset` and convert them to `f32`.
    pub fn load_block(
        &mut self,
        offset: u64,
        count: usize,
        basic_kind: BasicKind,
        byte_width: usize,
    ) -> Result<Vec<f32>> {
        let mut raw = vec![0u8; count * byte_width];
        self.reader.seek(SeekFrom::Start(offset))?;
        self.reader.read_exact(&mut raw).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::HeaderConsistency {
                path: self.path.clone(),
                message: format!("block of {count} elements at offset {offset} runs past the end of the file"),
            },
            _ => Error::Io(e),
        })?;
        decode_elements(&raw, basic_kind, byte_width, self.order).ok_or_else(|| {
            Error::HeaderConsistency {
                path: self.path.clone(),
                message: format!("cannot decode {basic_kind:?} elements of {byte_width} bytes"),
            }
        })
    }

    /// Load one stored component of `variable` and keep every `stride`-th
    /// point starting after the low ghost layer.
    ///
    /// `counts` is the number of points kept per axis `(x, y, z)`; the result
    /// is shaped `(z, y, x)`. A count one past `part_size / stride` asks for
    /// the overlap point too, which is the first cell of the next part: the
    /// high ghost layer, whatever the stride.
    pub fn load_component(
        &mut self,
        variable: &Variable,
        offset: u64,
        stride: [usize; 3],
        counts: [usize; 3],
    ) -> Result<Array3<f32>> {
        let [cx, cy, cz] = counts;
        if counts.iter().any(|&c| c == 0) {
            return Ok(Array3::zeros((cz, cy, cx)));
        }

        let part = self.header.grid_size();
        let ghost = self.header.ghost_size();
        let mut sources: [Vec<usize>; 3] = Default::default();
        for d in 0..3 {
            let kept = part[d] / stride[d].max(1);
            if counts[d] > kept + 1 || part[d] + 1 >= ghost[d] {
                return Err(Error::HeaderConsistency {
                    path: self.path.clone(),
                    message: format!(
                        "{} points with stride {} exceed {} ghosted cells along axis {d}",
                        counts[d], stride[d], ghost[d]
                    ),
                });
            }
            sources[d] = (0..counts[d])
                .map(|i| if i < kept { 1 + i * stride[d] } else { 1 + part[d] })
                .collect();
        }

        let [gx, gy, gz] = ghost;
        let values = self.load_block(offset, gx * gy * gz, variable.basic_kind, variable.byte_width)?;
        let block = Array3::from_shape_vec((gz, gy, gx), values).map_err(|e| Error::HeaderConsistency {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        Ok(block
            .select(Axis(2), &sources[0])
            .select(Axis(1), &sources[1])
            .select(Axis(0), &sources[2]))
    }
}

/// Decode fixed-width elements stored in `order`. `None` for unsupported
/// kinds and widths.
pub fn decode_elements(raw: &[u8], basic_kind: BasicKind, byte_width: usize, order: ByteOrder) -> Option<Vec<f32>> {
    if !basic_kind.supports_width(byte_width) {
        return None;
    }
    let count = raw.len() / byte_width;
    let mut d = Decoder::new(raw, order);
    (0..count)
        .map(|_| match (basic_kind, byte_width) {
            (BasicKind::Float, 4) => d.f32(),
            (BasicKind::Float, 8) => d.f64().map(|v| v as f32),
            (BasicKind::Integer, 1) => d.i8().map(f32::from),
            (BasicKind::Integer, 2) => d.i16().map(f32::from),
            (BasicKind::Integer, 4) => d.i32().map(|v| v as f32),
            (BasicKind::Integer, 8) => d.i64().map(|v| v as f32),
            _ => None,
        })
        .collect()
}
