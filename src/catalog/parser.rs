//! Line-oriented parser for the run catalog (`.vpc`) text format

use std::path::Path;

use crate::catalog::variable::{BasicKind, StructKind, Variable};
use crate::{Error, Result};

/// Fixed header size of VPIC data files when the catalog does not state it
pub const DEFAULT_HEADER_SIZE: u64 = 123;

/// Directory and base file name of one data kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KindDecl {
    pub directory: String,
    pub base_name: String,
}

/// Everything the catalog text declares, before any file system access
#[derive(Debug, Clone)]
pub struct ParsedCatalog {
    pub header_version: Option<String>,
    pub header_size: u64,
    pub delta_time: f32,
    pub cvac: f32,
    pub eps0: f32,
    pub extents: [[f32; 2]; 3],
    pub delta: [f32; 3],
    pub topology: [usize; 3],
    /// Field kind first, then one entry per species
    pub kinds: Vec<KindDecl>,
    pub variables: Vec<Variable>,
}

impl ParsedCatalog {
    /// Number of whole cells the catalog extents describe along `dim`.
    pub fn cells_from_extents(&self, dim: usize) -> usize {
        let [min, max] = self.extents[dim];
        if self.delta[dim] <= 0.0 {
            return 0;
        }
        ((max - min) / self.delta[dim]).round().max(0.0) as usize
    }
}

fn parse_error(path: &Path, line: usize, message: impl Into<String>) -> Error {
    Error::ConfigParse {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}

fn parse_value<T: std::str::FromStr>(path: &Path, line: usize, keyword: &str, text: &str) -> Result<T> {
    text.trim()
        .parse::<T>()
        .map_err(|_| parse_error(path, line, format!("{keyword}: cannot parse value '{}'", text.trim())))
}

fn parse_pair(path: &Path, line: usize, keyword: &str, text: &str) -> Result<[f32; 2]> {
    let mut values = text.split_whitespace();
    match (values.next(), values.next()) {
        (Some(lo), Some(hi)) => Ok([
            parse_value(path, line, keyword, lo)?,
            parse_value(path, line, keyword, hi)?,
        ]),
        _ => Err(parse_error(path, line, format!("{keyword}: expected 'min max'"))),
    }
}

fn axis_of(keyword: &str) -> Option<usize> {
    match keyword.chars().last() {
        Some('X') => Some(0),
        Some('Y') => Some(1),
        Some('Z') => Some(2),
        _ => None,
    }
}

/// Parse one `"name" STRUCT_KIND compCount BASIC_KIND byteCount` record.
fn parse_variable(path: &Path, line: usize, record: &str, kind: usize) -> Result<Variable> {
    let rest = record
        .strip_prefix('"')
        .ok_or_else(|| parse_error(path, line, "variable record must start with a quoted name"))?;
    let close = rest
        .find('"')
        .ok_or_else(|| parse_error(path, line, "unterminated variable name"))?;
    let name = rest[..close].trim().to_string();
    if name.is_empty() {
        return Err(parse_error(path, line, "empty variable name"));
    }

    let fields: Vec<&str> = rest[close + 1..].split_whitespace().collect();
    let [struct_word, count_word, basic_word, width_word] = fields[..] else {
        return Err(parse_error(
            path,
            line,
            format!("variable '{name}': expected STRUCT_KIND compCount BASIC_KIND byteCount"),
        ));
    };

    let components: usize = parse_value(path, line, &name, count_word)?;
    let struct_kind = StructKind::from_record(struct_word, components).ok_or_else(|| {
        parse_error(
            path,
            line,
            format!("variable '{name}': unsupported structure {struct_word} with {components} components"),
        )
    })?;
    let basic_kind = BasicKind::from_keyword(basic_word).ok_or_else(|| {
        parse_error(path, line, format!("variable '{name}': unknown basic type {basic_word}"))
    })?;
    let byte_width: usize = parse_value(path, line, &name, width_word)?;
    if !basic_kind.supports_width(byte_width) {
        return Err(parse_error(
            path,
            line,
            format!("variable '{name}': unsupported byte width {byte_width} for {basic_word}"),
        ));
    }

    Ok(Variable {
        name,
        struct_kind,
        basic_kind,
        byte_width,
        kind,
    })
}

/// Parse the catalog text. `path` is only used for error reporting.
pub fn parse_catalog(text: &str, path: &Path) -> Result<ParsedCatalog> {
    let mut catalog = ParsedCatalog {
        header_version: None,
        header_size: DEFAULT_HEADER_SIZE,
        delta_time: 0.0,
        cvac: 0.0,
        eps0: 0.0,
        extents: [[0.0; 2]; 3],
        delta: [1.0; 3],
        topology: [0; 3],
        kinds: vec![KindDecl::default()],
        variables: Vec::new(),
    };
    let mut declared_species: Option<(usize, usize)> = None;
    let mut last_line = 0;

    let mut lines = text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

    while let Some((line, content)) = lines.next() {
        last_line = line;
        let (keyword, rest) = content
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((content, ""));

        match keyword {
            "VPIC_HEADER_VERSION" => catalog.header_version = Some(rest.to_string()),
            "DATA_HEADER_SIZE" => catalog.header_size = parse_value(path, line, keyword, rest)?,
            "GRID_DELTA_T" => catalog.delta_time = parse_value(path, line, keyword, rest)?,
            "GRID_CVAC" => catalog.cvac = parse_value(path, line, keyword, rest)?,
            "GRID_EPS0" => catalog.eps0 = parse_value(path, line, keyword, rest)?,
            "GRID_EXTENTS_X" | "GRID_EXTENTS_Y" | "GRID_EXTENTS_Z" => {
                let dim = axis_of(keyword).unwrap_or_default();
                catalog.extents[dim] = parse_pair(path, line, keyword, rest)?;
            }
            "GRID_DELTA_X" | "GRID_DELTA_Y" | "GRID_DELTA_Z" => {
                let dim = axis_of(keyword).unwrap_or_default();
                catalog.delta[dim] = parse_value(path, line, keyword, rest)?;
            }
            "GRID_TOPOLOGY_X" | "GRID_TOPOLOGY_Y" | "GRID_TOPOLOGY_Z" => {
                let dim = axis_of(keyword).unwrap_or_default();
                catalog.topology[dim] = parse_value(path, line, keyword, rest)?;
            }
            "FIELD_DATA_DIRECTORY" => catalog.kinds[0].directory = rest.to_string(),
            "FIELD_DATA_BASE_FILENAME" => catalog.kinds[0].base_name = rest.to_string(),
            "NUM_OUTPUT_SPECIES" => {
                declared_species = Some((parse_value(path, line, keyword, rest)?, line));
            }
            "SPECIES_DATA_DIRECTORY" => catalog.kinds.push(KindDecl {
                directory: rest.to_string(),
                base_name: String::new(),
            }),
            "SPECIES_DATA_BASE_FILENAME" => {
                if catalog.kinds.len() < 2 {
                    return Err(parse_error(path, line, "species base name before SPECIES_DATA_DIRECTORY"));
                }
                if let Some(species) = catalog.kinds.last_mut() {
                    species.base_name = rest.to_string();
                }
            }
            "FIELD_DATA_VARIABLES" | "HYDRO_DATA_VARIABLES" => {
                let count: usize = parse_value(path, line, keyword, rest)?;
                let kind = if keyword == "FIELD_DATA_VARIABLES" {
                    0
                } else {
                    catalog.kinds.len() - 1
                };
                if keyword == "HYDRO_DATA_VARIABLES" && kind == 0 {
                    return Err(parse_error(path, line, "HYDRO_DATA_VARIABLES outside a species block"));
                }
                let species = catalog.kinds[kind].base_name.clone();

                for _ in 0..count {
                    let (record_line, record) = lines.next().ok_or_else(|| {
                        parse_error(path, line, format!("{keyword}: expected {count} variable records"))
                    })?;
                    last_line = record_line;
                    let mut variable = parse_variable(path, record_line, record, kind)?;
                    if kind > 0 {
                        variable.name = format!("{} ({})", variable.name, species);
                    }
                    catalog.variables.push(variable);
                }
            }
            _ => tracing::debug!("{}:{}: ignoring keyword {}", path.display(), line, keyword),
        }
    }

    for (dim, &size) in catalog.topology.iter().enumerate() {
        if size == 0 {
            return Err(parse_error(
                path,
                last_line,
                format!("GRID_TOPOLOGY_{} missing or zero", ["X", "Y", "Z"][dim]),
            ));
        }
    }
    if !catalog.variables.iter().any(|v| v.kind == 0) {
        return Err(parse_error(path, last_line, "no field variables declared"));
    }
    if catalog.kinds[0].directory.is_empty() || catalog.kinds[0].base_name.is_empty() {
        return Err(parse_error(path, last_line, "field data directory or base file name missing"));
    }
    let species = catalog.kinds.len() - 1;
    if let Some((declared, line)) = declared_species {
        if declared != species {
            return Err(parse_error(
                path,
                line,
                format!("NUM_OUTPUT_SPECIES is {declared} but {species} species blocks follow"),
            ));
        }
    }
    if let Some(kind) = catalog.kinds.iter().skip(1).find(|k| k.base_name.is_empty()) {
        return Err(parse_error(
            path,
            last_line,
            format!("species in '{}' has no base file name", kind.directory),
        ));
    }

    Ok(catalog)
}
