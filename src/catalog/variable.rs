//! Variable descriptors

use serde::{Deserialize, Serialize};

/// Structural kind of a variable as declared in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructKind {
    Scalar,
    Vector,
    /// Symmetric tensor stored as 6 components
    Tensor6,
    /// Full tensor stored as 9 components
    Tensor9,
}

impl StructKind {
    /// Resolve a catalog keyword plus its declared component count.
    pub fn from_record(keyword: &str, components: usize) -> Option<Self> {
        match (keyword, components) {
            ("SCALAR", 1) => Some(StructKind::Scalar),
            ("VECTOR", 3) => Some(StructKind::Vector),
            ("TENSOR", 6) => Some(StructKind::Tensor6),
            ("TENSOR", 9) => Some(StructKind::Tensor9),
            _ => None,
        }
    }

    /// Number of components stored in the part files
    pub fn stored_components(&self) -> usize {
        match self {
            StructKind::Scalar => 1,
            StructKind::Vector => 3,
            StructKind::Tensor6 => 6,
            StructKind::Tensor9 => 9,
        }
    }

    /// Number of components handed to the consumer
    pub fn output_components(&self) -> usize {
        match self {
            StructKind::Scalar => 1,
            StructKind::Vector => 3,
            StructKind::Tensor6 | StructKind::Tensor9 => 9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StructKind::Scalar => "SCALAR",
            StructKind::Vector => "VECTOR",
            StructKind::Tensor6 => "TENSOR6",
            StructKind::Tensor9 => "TENSOR9",
        }
    }
}

/// Element storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasicKind {
    Float,
    Integer,
}

impl BasicKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "FLOATING_POINT" | "FLOAT" => Some(BasicKind::Float),
            "INTEGER" => Some(BasicKind::Integer),
            _ => None,
        }
    }

    pub fn supports_width(&self, width: usize) -> bool {
        match self {
            BasicKind::Float => matches!(width, 4 | 8),
            BasicKind::Integer => matches!(width, 1 | 2 | 4 | 8),
        }
    }
}

/// Stored component feeding each of the 9 output components of a 6 component
/// symmetric tensor. Stored `0 -> 0, 1 -> 4, 2 -> 8, 3 -> (5,7), 4 -> (2,6),
/// 5 -> (1,3)`.
const TENSOR6_SOURCE: [usize; 9] = [0, 5, 4, 5, 1, 3, 4, 3, 2];

/// One variable of one data kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub struct_kind: StructKind,
    pub basic_kind: BasicKind,
    pub byte_width: usize,
    /// Index of the data kind (0 is the field kind, species follow)
    pub kind: usize,
}

impl Variable {
    pub fn stored_components(&self) -> usize {
        self.struct_kind.stored_components()
    }

    pub fn output_components(&self) -> usize {
        self.struct_kind.output_components()
    }

    /// Map an output component onto the component stored in the file.
    pub fn stored_component(&self, output: usize) -> Option<usize> {
        if output >= self.output_components() {
            return None;
        }
        match self.struct_kind {
            StructKind::Tensor6 => Some(TENSOR6_SOURCE[output]),
            _ => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor() -> Variable {
        Variable {
            name: "Stress Tensor".to_string(),
            struct_kind: StructKind::Tensor6,
            basic_kind: BasicKind::Float,
            byte_width: 4,
            kind: 1,
        }
    }

    #[test]
    fn test_tensor6_expands_to_nine_components() {
        let var = tensor();
        assert_eq!(var.stored_components(), 6);
        assert_eq!(var.output_components(), 9);

        let mapped: Vec<usize> = (0..9).map(|c| var.stored_component(c).unwrap()).collect();
        assert_eq!(mapped, vec![0, 5, 4, 5, 1, 3, 4, 3, 2]);
        assert_eq!(var.stored_component(9), None);
    }

    #[test]
    fn test_tensor6_mapping_matches_storage_layout() {
        // Each stored component lands on the output slots listed for it
        let expected: [&[usize]; 6] = [&[0], &[4], &[8], &[5, 7], &[2, 6], &[1, 3]];
        let var = tensor();
        for (stored, outputs) in expected.iter().enumerate() {
            for &output in outputs.iter() {
                assert_eq!(var.stored_component(output), Some(stored));
            }
        }
    }

    #[test]
    fn test_struct_kind_from_record() {
        assert_eq!(StructKind::from_record("SCALAR", 1), Some(StructKind::Scalar));
        assert_eq!(StructKind::from_record("VECTOR", 3), Some(StructKind::Vector));
        assert_eq!(StructKind::from_record("TENSOR", 6), Some(StructKind::Tensor6));
        assert_eq!(StructKind::from_record("TENSOR", 9), Some(StructKind::Tensor9));
        assert_eq!(StructKind::from_record("VECTOR", 2), None);
        assert_eq!(StructKind::from_record("MATRIX", 9), None);
    }

    #[test]
    fn test_basic_kind_widths() {
        assert!(BasicKind::Float.supports_width(4));
        assert!(BasicKind::Float.supports_width(8));
        assert!(!BasicKind::Float.supports_width(2));
        assert!(BasicKind::Integer.supports_width(2));
        assert!(!BasicKind::Integer.supports_width(3));
    }
}
