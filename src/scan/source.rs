use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Layout;

/// `<displayName>T2_TurboRARE (E3)</displayName>`
static INDEX_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<displayName>\s*(?P<name>.*?)\s*\(E(?P<scan>\d+)\)\s*</displayName>").unwrap()
});

/// First `<...>` tag in a per-scan metadata file.
static BRACKET_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^<>\r\n]*)>").unwrap());

/// Trailing ` (E3)` scan-number marker carried by some display names.
static SCAN_NUMBER_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(E\d+\)\s*$").unwrap());

// ---------------------------------------------------------------------------
// Scan candidates
// ---------------------------------------------------------------------------

/// A (display name, scan number) pair awaiting criteria matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    pub scan: String,
    pub display_name: String,
}

/// Candidates produced by one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanListing {
    pub candidates: Vec<ScanCandidate>,
    /// Reading stopped early on an IO error.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Indexed,
    DirectoryWalk,
}

/// A way of enumerating the scans of one measurement.
pub trait ScanSource {
    fn kind(&self) -> SourceKind;
    fn list(&self) -> ScanListing;
}

/// Pick the source for a measurement: the index file if it can be opened,
/// otherwise a walk over numbered subdirectories.
pub fn probe(measurement: &Path, layout: &Layout) -> Box<dyn ScanSource> {
    let index = measurement.join(&layout.index_file);
    if File::open(&index).is_ok() {
        Box::new(IndexedScanSource { index })
    } else {
        Box::new(DirectoryWalkScanSource::new(measurement, layout))
    }
}

// ---------------------------------------------------------------------------
// Indexed source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IndexedScanSource {
    index: PathBuf,
}

impl IndexedScanSource {
    pub fn new(index: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
        }
    }
}

/// Parse one index line; lines without a display name are ignored.
pub fn parse_index_line(line: &str) -> Option<ScanCandidate> {
    let caps = INDEX_LINE.captures(line)?;
    Some(ScanCandidate {
        scan: caps["scan"].to_string(),
        display_name: caps["name"].to_string(),
    })
}

impl ScanSource for IndexedScanSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Indexed
    }

    fn list(&self) -> ScanListing {
        let mut listing = ScanListing::default();
        let file = match File::open(&self.index) {
            Ok(f) => f,
            Err(_) => {
                listing.truncated = true;
                return listing;
            }
        };
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if let Some(candidate) = parse_index_line(&line) {
                        listing.candidates.push(candidate);
                    }
                }
                Err(e) => {
                    debug!("{}: read failed: {e}", self.index.display());
                    listing.truncated = true;
                    break;
                }
            }
        }
        listing
    }
}

// ---------------------------------------------------------------------------
// Directory-walk source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DirectoryWalkScanSource {
    measurement: PathBuf,
    metadata_file: String,
}

impl DirectoryWalkScanSource {
    pub fn new(measurement: &Path, layout: &Layout) -> Self {
        Self {
            measurement: measurement.to_path_buf(),
            metadata_file: layout.scan_metadata_file.clone(),
        }
    }

    fn numbered_subdirectories(&self) -> Vec<(u64, String)> {
        let Ok(entries) = std::fs::read_dir(&self.measurement) else {
            return Vec::new();
        };
        let mut dirs: Vec<(u64, String)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let number = name.parse::<u64>().ok()?;
                Some((number, name))
            })
            .collect();
        dirs.sort();
        dirs
    }
}

/// Display name from the first bracket-delimited tag of a metadata file,
/// without the trailing ` (E<n>)` scan number, so walked names compare equal
/// to indexed ones.
pub fn first_bracket_tag(text: &str) -> Option<String> {
    BRACKET_TAG
        .captures(text)
        .map(|c| SCAN_NUMBER_SUFFIX.replace(c[1].trim(), "").into_owned())
        .filter(|name| !name.is_empty())
}

impl ScanSource for DirectoryWalkScanSource {
    fn kind(&self) -> SourceKind {
        SourceKind::DirectoryWalk
    }

    fn list(&self) -> ScanListing {
        let mut listing = ScanListing::default();
        for (_, scan) in self.numbered_subdirectories() {
            let metadata = self.measurement.join(&scan).join(&self.metadata_file);
            let text = match std::fs::read(&metadata) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => {
                    debug!("{}: no readable metadata, skipping scan", metadata.display());
                    continue;
                }
            };
            match first_bracket_tag(&text) {
                Some(display_name) => listing.candidates.push(ScanCandidate { scan, display_name }),
                None => debug!("{}: no display name tag", metadata.display()),
            }
        }
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_line_pattern() {
        let got = parse_index_line("  <displayName>JB_task-CogB_acq-EPI (E12)</displayName>\n").unwrap();
        assert_eq!(got.scan, "12");
        assert_eq!(got.display_name, "JB_task-CogB_acq-EPI");
        assert_eq!(parse_index_line("<displayName>Localizer</displayName>"), None);
        assert_eq!(parse_index_line("<scanProgram>"), None);
    }

    #[test]
    fn bracket_tag_is_first_one() {
        let text = "##$ACQ_scan_name=( 64 )\n<T2_TurboRARE (E3)>\n##$ACQ_method=( 20 )\n<Bruker:RARE>\n";
        assert_eq!(first_bracket_tag(text).as_deref(), Some("T2_TurboRARE"));
        assert_eq!(first_bracket_tag("##$ACQ_size=( 2 )\n"), None);
    }

    #[test]
    fn walked_names_drop_the_scan_number() {
        assert_eq!(first_bracket_tag("<EPI_task-CogB (E12)>").as_deref(), Some("EPI_task-CogB"));
        assert_eq!(first_bracket_tag("<EPI_task-CogB(E4) >").as_deref(), Some("EPI_task-CogB"));
        // Only a trailing marker is removed.
        assert_eq!(first_bracket_tag("<EPI (E4)_task-CogB>").as_deref(), Some("EPI (E4)_task-CogB"));
        assert_eq!(first_bracket_tag("<(E4)>"), None);
    }

    #[test]
    fn probe_prefers_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::default();
        assert_eq!(probe(dir.path(), &layout).kind(), SourceKind::DirectoryWalk);
        std::fs::write(dir.path().join(&layout.index_file), "").unwrap();
        assert_eq!(probe(dir.path(), &layout).kind(), SourceKind::Indexed);
    }

    #[test]
    fn walk_orders_numerically_and_skips_non_scans() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::default();
        for (scan, name) in [("10", "EPI_task-CogB"), ("2", "FLASH"), ("3", "")] {
            let sub = dir.path().join(scan);
            std::fs::create_dir(&sub).unwrap();
            if !name.is_empty() {
                std::fs::write(sub.join("acqp"), format!("##$ACQ_scan_name=( 64 )\n<{name}>\n")).unwrap();
            }
        }
        std::fs::create_dir(dir.path().join("pdata")).unwrap();

        let listing = DirectoryWalkScanSource::new(dir.path(), &layout).list();
        let scans: Vec<&str> = listing.candidates.iter().map(|c| c.scan.as_str()).collect();
        assert_eq!(scans, vec!["2", "10"]);
        assert!(!listing.truncated);
    }
}
