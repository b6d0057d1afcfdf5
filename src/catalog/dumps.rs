//! Dump directory discovery

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Prefix of every dump directory, followed by the time step
pub const DUMP_PREFIX: &str = "T.";

/// One simulation time step on disk
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dump {
    pub time: i64,
    /// Directory name, `T.<time>`
    pub name: String,
}

impl Dump {
    pub fn new(time: i64) -> Self {
        Self {
            time,
            name: format!("{DUMP_PREFIX}{time}"),
        }
    }
}

/// List the dump directories below `dir`, sorted by time.
///
/// A directory that does not exist yet holds no dumps.
pub fn scan_dumps(dir: &Path) -> Result<Vec<Dump>> {
    if !dir.is_dir() {
        tracing::warn!("Dump directory {} does not exist yet", dir.display());
        return Ok(Vec::new());
    }

    let mut dumps = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(time) = name
            .strip_prefix(DUMP_PREFIX)
            .and_then(|t| t.parse::<i64>().ok())
        {
            dumps.push(Dump {
                time,
                name: name.to_string(),
            });
        }
    }

    dumps.sort();
    dumps.dedup_by_key(|d| d.time);
    Ok(dumps)
}

/// Merge freshly scanned dumps into `known`, keeping every known entry.
///
/// Returns whether anything was added.
pub fn merge_dumps(known: &mut Vec<Dump>, scanned: Vec<Dump>) -> bool {
    let before = known.len();
    for dump in scanned {
        if !known.iter().any(|k| k.time == dump.time) {
            known.push(dump);
        }
    }
    if known.len() == before {
        return false;
    }
    known.sort();
    true
}

/// Zero padding widths of the time and part numbers in part file names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNaming {
    pub time_width: usize,
    pub part_width: usize,
}

impl FileNaming {
    /// Inspect `<base>.<time>.<part>` names in a dump directory.
    pub fn detect(dump_dir: &Path, base_name: &str) -> Option<Self> {
        let prefix = format!("{base_name}.");
        let entries = std::fs::read_dir(dump_dir).ok()?;

        entries.filter_map(|e| e.ok()).find_map(|entry| {
            let name = entry.file_name();
            let rest = name.to_str()?.strip_prefix(&prefix)?.to_string();
            let (time, part) = rest.split_once('.')?;
            let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
            if numeric(time) && numeric(part) {
                Some(Self {
                    time_width: time.len(),
                    part_width: part.len(),
                })
            } else {
                None
            }
        })
    }

    pub fn file_name(&self, base_name: &str, time: i64, part: usize) -> String {
        format!(
            "{base_name}.{time:0tw$}.{part:0pw$}",
            tw = self.time_width,
            pw = self.part_width
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_sorts_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["T.100", "T.20", "T.3", "notadump", "T.x"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("T.5"), b"file, not a dump").unwrap();

        let dumps = scan_dumps(dir.path()).unwrap();
        let times: Vec<i64> = dumps.iter().map(|d| d.time).collect();
        assert_eq!(times, vec![3, 20, 100]);
        assert_eq!(dumps[1].name, "T.20");
    }

    #[test]
    fn test_missing_directory_has_no_dumps() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_dumps(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_merge_is_monotonic_and_idempotent() {
        let mut known = vec![Dump::new(0), Dump::new(10)];

        assert!(merge_dumps(&mut known, vec![Dump::new(20), Dump::new(0)]));
        assert!(!merge_dumps(&mut known, vec![Dump::new(20), Dump::new(10)]));
        // Entries missing from a rescan are kept
        assert!(!merge_dumps(&mut known, vec![]));

        let times: Vec<i64> = known.iter().map(|d| d.time).collect();
        assert_eq!(times, vec![0, 10, 20]);
    }

    #[test]
    fn test_file_naming_detect() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fields.000100.0003"), b"").unwrap();
        std::fs::write(dir.path().join("other.1.2"), b"").unwrap();

        let naming = FileNaming::detect(dir.path(), "fields").unwrap();
        assert_eq!(naming.time_width, 6);
        assert_eq!(naming.part_width, 4);
        assert_eq!(naming.file_name("fields", 2000, 12), "fields.002000.0012");

        assert_eq!(FileNaming::default().file_name("ehydro", 20, 1), "ehydro.20.1");
        assert!(FileNaming::detect(dir.path(), "missing").is_none());
    }
}
