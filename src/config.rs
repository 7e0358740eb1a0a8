use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scan::criteria::CriteriaSpec;

// ---------------------------------------------------------------------------
// On-disk layout of a measurement directory
// ---------------------------------------------------------------------------

/// File names and tag markers of the raw scanner layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Per-measurement state file holding subject and session tags.
    pub state_file: String,
    pub subject_marker: String,
    pub session_marker: String,
    /// Scan index listing display names and scan numbers.
    pub index_file: String,
    /// Per-scan metadata file read when there is no index.
    pub scan_metadata_file: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            state_file: "subject".to_string(),
            subject_marker: "##$SUBJECT_id=".to_string(),
            session_marker: "##$SUBJECT_study_name=".to_string(),
            index_file: "ScanProgram.scanProgram".to_string(),
            scan_metadata_file: "acqp".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection pass configuration
// ---------------------------------------------------------------------------

/// Everything a selection pass needs besides the root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub criteria: CriteriaSpec,
    /// Measurement directory names to consider; empty means all.
    pub measurements: Vec<String>,
    /// Measurement directory names to ignore.
    pub exclude_measurements: Vec<String>,
    /// Measurement directories whose name ends with this are ignored.
    pub fail_suffix: String,
    /// Number scans that share a display name within a session.
    pub count_runs: bool,
    /// Worker threads; 0 lets rayon decide.
    pub jobs: usize,
    pub layout: Layout,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            criteria: CriteriaSpec::default(),
            measurements: Vec::new(),
            exclude_measurements: Vec::new(),
            fail_suffix: "_failed".to_string(),
            count_runs: false,
            jobs: 0,
            layout: Layout::default(),
        }
    }
}

impl SelectionConfig {
    /// Read a JSON configuration file; omitted fields take their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).context("parsing config JSON")
    }

    pub fn with_criteria(mut self, criteria: CriteriaSpec) -> Self {
        self.criteria = criteria;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.json");
        std::fs::write(
            &path,
            r#"{ "criteria": { "match": { "task": ["CogB"] }, "exclude": { "subjects": ["4001"] } },
                 "count_runs": true }"#,
        )
        .unwrap();

        let config = SelectionConfig::from_path(&path).unwrap();
        assert!(config.count_runs);
        assert_eq!(config.fail_suffix, "_failed");
        assert_eq!(config.layout, Layout::default());
        assert_eq!(config.criteria.include["task"], vec!["CogB".to_string()]);
        assert_eq!(config.criteria.exclude["subjects"], vec!["4001".to_string()]);
    }
}
