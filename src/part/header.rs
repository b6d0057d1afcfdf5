//! Fixed binary header of every VPIC part file
//!
//! ```text
//! +----------------------------------------------+
//! | u8 x5   sizeof long, short, int, float, double|
//! | i16     0xCAFE                               |
//! | i32     0xDEADBEEF                           |
//! | f32     1.0                                  |
//! | f64     1.0                                  |
//! +----------------------------------------------+
//! | i32 version, dump type, dump time            |
//! | i32 grid size[3]                             |
//! | f32 delta time, grid step[3], origin[3]      |
//! | f32 cvac, eps0, damp                         |
//! | i32 rank, total rank                         |
//! | i32 species id, f32 species q/m              |
//! | i32 record size, number of dimensions        |
//! | i32 ghost size[3]                            |
//! +----------------------------------------------+
//! ```
//!
//! The canaries identify the byte order the file was written in; every
//! later field is decoded in that order.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const SHORT_CANARY: u16 = 0xCAFE;
const INT_CANARY: u32 = 0xDEADBEEF;

/// Widths of long, short, int, float and double the decoder assumes
const EXPECTED_WIDTHS: [u8; 5] = [
    std::mem::size_of::<i64>() as u8,
    std::mem::size_of::<i16>() as u8,
    std::mem::size_of::<i32>() as u8,
    std::mem::size_of::<f32>() as u8,
    std::mem::size_of::<f64>() as u8,
];

const BOILERPLATE_SIZE: usize = 5 + 2 + 4 + 4 + 8;

/// Byte order a part file was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    pub fn is_native(&self) -> bool {
        *self == Self::native()
    }
}

/// Sequential reader of fixed-width values in a given byte order
pub(crate) struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

macro_rules! decode_fn {
    ($name:ident, $ty:ty) => {
        pub(crate) fn $name(&mut self) -> Option<$ty> {
            const N: usize = std::mem::size_of::<$ty>();
            let raw: [u8; N] = self.bytes.get(self.pos..self.pos + N)?.try_into().ok()?;
            self.pos += N;
            Some(match self.order {
                ByteOrder::Little => <$ty>::from_le_bytes(raw),
                ByteOrder::Big => <$ty>::from_be_bytes(raw),
            })
        }
    };
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(bytes: &'a [u8], order: ByteOrder) -> Self {
        Self { bytes, pos: 0, order }
    }

    fn skip(&mut self, count: usize) {
        self.pos += count;
    }

    decode_fn!(u16, u16);
    decode_fn!(u32, u32);
    decode_fn!(i8, i8);
    decode_fn!(i16, i16);
    decode_fn!(i32, i32);
    decode_fn!(i64, i64);
    decode_fn!(f32, f32);
    decode_fn!(f64, f64);

    fn i32x3(&mut self) -> Option<[i32; 3]> {
        Some([self.i32()?, self.i32()?, self.i32()?])
    }

    fn f32x3(&mut self) -> Option<[f32; 3]> {
        Some([self.f32()?, self.f32()?, self.f32()?])
    }
}

/// Sequential writer of fixed-width values in a given byte order
struct Encoder {
    out: Vec<u8>,
    order: ByteOrder,
}

macro_rules! encode_fn {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self, value: $ty) {
            match self.order {
                ByteOrder::Little => self.out.extend_from_slice(&value.to_le_bytes()),
                ByteOrder::Big => self.out.extend_from_slice(&value.to_be_bytes()),
            }
        }
    };
}

impl Encoder {
    encode_fn!(u16, u16);
    encode_fn!(u32, u32);
    encode_fn!(i32, i32);
    encode_fn!(f32, f32);
    encode_fn!(f64, f64);
}

/// Decoded part file header
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    pub version: i32,
    pub dump_type: i32,
    pub dump_time: i32,
    pub grid_size: [i32; 3],
    pub delta_time: f32,
    pub grid_step: [f32; 3],
    pub grid_origin: [f32; 3],
    pub cvac: f32,
    pub eps0: f32,
    pub damp: f32,
    pub rank: i32,
    pub total_rank: i32,
    pub species_id: i32,
    pub species_qm: f32,
    pub record_size: i32,
    pub number_of_dimensions: i32,
    pub ghost_size: [i32; 3],
}

impl Header {
    /// Bytes occupied by the header, boilerplate included
    pub const SIZE: usize = BOILERPLATE_SIZE + 4 * 25;

    /// Open `path` and read its header.
    pub fn read(path: &Path) -> Result<(Self, ByteOrder)> {
        let mut file = File::open(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read_from(&mut file, path)
    }

    /// Read the header from the start of `reader`. `path` names the source
    /// in errors.
    pub fn read_from<R: Read>(reader: &mut R, path: &Path) -> Result<(Self, ByteOrder)> {
        let mut raw = [0u8; Self::SIZE];
        reader.read_exact(&mut raw).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::HeaderConsistency {
                path: path.to_path_buf(),
                message: format!("file is shorter than the {} byte header", Self::SIZE),
            },
            _ => Error::Io(e),
        })?;
        Self::decode(&raw, path)
    }

    /// Validate the boilerplate and decode the fields in the detected order.
    pub fn decode(raw: &[u8], path: &Path) -> Result<(Self, ByteOrder)> {
        let inconsistent = |message: String| Error::HeaderConsistency {
            path: path.to_path_buf(),
            message,
        };
        if raw.len() < Self::SIZE {
            return Err(inconsistent(format!("header needs {} bytes, got {}", Self::SIZE, raw.len())));
        }

        let widths = &raw[..5];
        if widths != EXPECTED_WIDTHS {
            return Err(inconsistent(format!(
                "numeric widths {widths:?} differ from the expected {EXPECTED_WIDTHS:?}"
            )));
        }
        let order = detect_byte_order(raw)
            .ok_or_else(|| inconsistent("canaries match neither byte order".to_string()))?;

        let mut d = Decoder::new(raw, order);
        d.skip(BOILERPLATE_SIZE);
        let header = (|| {
            Some(Header {
                version: d.i32()?,
                dump_type: d.i32()?,
                dump_time: d.i32()?,
                grid_size: d.i32x3()?,
                delta_time: d.f32()?,
                grid_step: d.f32x3()?,
                grid_origin: d.f32x3()?,
                cvac: d.f32()?,
                eps0: d.f32()?,
                damp: d.f32()?,
                rank: d.i32()?,
                total_rank: d.i32()?,
                species_id: d.i32()?,
                species_qm: d.f32()?,
                record_size: d.i32()?,
                number_of_dimensions: d.i32()?,
                ghost_size: d.i32x3()?,
            })
        })()
        .ok_or_else(|| inconsistent("truncated header".to_string()))?;

        if header.grid_size.iter().any(|&n| n <= 0)
            || (0..3).any(|dim| header.ghost_size[dim] < header.grid_size[dim] + 2)
        {
            return Err(inconsistent(format!(
                "grid size {:?} with ghost size {:?} is not a valid part",
                header.grid_size, header.ghost_size
            )));
        }

        if !order.is_native() {
            tracing::debug!("{} is stored {:?} endian", path.display(), order);
        }
        Ok((header, order))
    }

    /// Serialize the header, boilerplate included, in `order`.
    pub fn encode(&self, order: ByteOrder) -> Vec<u8> {
        let mut e = Encoder {
            out: Vec::with_capacity(Self::SIZE),
            order,
        };
        e.out.extend_from_slice(&EXPECTED_WIDTHS);
        e.u16(SHORT_CANARY);
        e.u32(INT_CANARY);
        e.f32(1.0);
        e.f64(1.0);

        e.i32(self.version);
        e.i32(self.dump_type);
        e.i32(self.dump_time);
        self.grid_size.iter().for_each(|&v| e.i32(v));
        e.f32(self.delta_time);
        self.grid_step.iter().for_each(|&v| e.f32(v));
        self.grid_origin.iter().for_each(|&v| e.f32(v));
        e.f32(self.cvac);
        e.f32(self.eps0);
        e.f32(self.damp);
        e.i32(self.rank);
        e.i32(self.total_rank);
        e.i32(self.species_id);
        e.f32(self.species_qm);
        e.i32(self.record_size);
        e.i32(self.number_of_dimensions);
        self.ghost_size.iter().for_each(|&v| e.i32(v));
        e.out
    }

    /// Cells per part without ghosts
    pub fn grid_size(&self) -> [usize; 3] {
        self.grid_size.map(|n| n.max(0) as usize)
    }

    /// Cells per part including the ghost ring
    pub fn ghost_size(&self) -> [usize; 3] {
        self.ghost_size.map(|n| n.max(0) as usize)
    }
}

/// The order in which every canary and the two ones decode correctly.
fn detect_byte_order(raw: &[u8]) -> Option<ByteOrder> {
    let native = ByteOrder::native();
    [native, native.opposite()].into_iter().find(|&order| {
        let mut d = Decoder::new(raw, order);
        d.skip(5);
        d.u16() == Some(SHORT_CANARY)
            && d.u32() == Some(INT_CANARY)
            && d.f32() == Some(1.0)
            && d.f64() == Some(1.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        Header {
            version: 0,
            dump_type: 1,
            dump_time: 400,
            grid_size: [8, 6, 4],
            delta_time: 0.125,
            grid_step: [0.5, 0.5, 0.25],
            grid_origin: [0.0, -1.5, 2.0],
            cvac: 1.0,
            eps0: 1.0,
            damp: 0.0,
            rank: 3,
            total_rank: 8,
            species_id: -1,
            species_qm: 0.0,
            record_size: 4,
            number_of_dimensions: 3,
            ghost_size: [10, 8, 6],
        }
    }

    #[test]
    fn test_header_size_is_fixed() {
        assert_eq!(Header::SIZE, 123);
        assert_eq!(sample().encode(ByteOrder::Little).len(), Header::SIZE);
        assert_eq!(sample().encode(ByteOrder::Big).len(), Header::SIZE);
    }

    #[test]
    fn test_round_trip_detects_byte_order() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let raw = sample().encode(order);
            let (header, detected) = Header::decode(&raw, Path::new("part")).unwrap();
            assert_eq!(detected, order);
            assert_eq!(header, sample());
            assert_eq!(header.grid_size(), [8, 6, 4]);
            assert_eq!(header.ghost_size(), [10, 8, 6]);
        }
    }

    #[test]
    fn test_canary_bytes_on_disk() {
        let raw = sample().encode(ByteOrder::Big);
        assert_eq!(&raw[5..7], &[0xCA, 0xFE]);
        assert_eq!(&raw[7..11], &[0xDE, 0xAD, 0xBE, 0xEF]);

        let raw = sample().encode(ByteOrder::Little);
        assert_eq!(&raw[5..7], &[0xFE, 0xCA]);
    }

    #[test]
    fn test_corrupt_canary_is_fatal() {
        let mut raw = sample().encode(ByteOrder::Little);
        raw[7] ^= 0xFF;
        let err = Header::decode(&raw, Path::new("part")).unwrap_err();
        assert!(matches!(err, Error::HeaderConsistency { .. }));
    }

    #[test]
    fn test_width_mismatch_is_fatal() {
        let mut raw = sample().encode(ByteOrder::Little);
        raw[0] = 4;
        let err = Header::decode(&raw, Path::new("part")).unwrap_err();
        assert!(err.to_string().contains("numeric widths"));
    }

    #[test]
    fn test_mixed_order_is_fatal() {
        // Short canary in one order, the rest in the other
        let mut raw = sample().encode(ByteOrder::Little);
        raw.swap(5, 6);
        assert!(Header::decode(&raw, Path::new("part")).is_err());
    }

    #[test]
    fn test_short_file_is_fatal() {
        let raw = sample().encode(ByteOrder::Little);
        let mut reader = &raw[..50];
        let err = Header::read_from(&mut reader, Path::new("part")).unwrap_err();
        assert!(matches!(err, Error::HeaderConsistency { .. }));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let err = Header::read(Path::new("/definitely/not/here.0")).unwrap_err();
        assert!(matches!(err, Error::FileOpen { .. }));
    }
}
