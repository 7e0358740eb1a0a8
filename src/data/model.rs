use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use crate::error::{Result, SelectError};

/// Columns every table carries, in output order.
pub const FIXED_COLUMNS: [&str; 7] = [
    "measurement",
    "path",
    "subject",
    "session",
    "scan",
    "scan_type",
    "modality",
];

// ---------------------------------------------------------------------------
// Measurement – one raw session directory
// ---------------------------------------------------------------------------

/// A measurement directory whose state file yielded accepted identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub path: PathBuf,
    pub subject: String,
    pub session: String,
}

// ---------------------------------------------------------------------------
// ScanRecord – one row of the selection table
// ---------------------------------------------------------------------------

/// One accepted scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Measurement directory the scan belongs to.
    pub measurement: PathBuf,
    pub subject: String,
    pub session: String,
    /// Scan number as written by the scanner (also the subdirectory name).
    pub scan: String,
    /// Raw display name.
    pub scan_type: String,
    /// `None` means unknown; never substituted with a default.
    pub modality: Option<String>,
    /// Harvested semantic key → value (task, acquisition, run, ...).
    pub fields: BTreeMap<String, String>,
}

impl ScanRecord {
    /// Directory holding the scan's raw data.
    pub fn path(&self) -> PathBuf {
        self.measurement.join(&self.scan)
    }

    /// Look up a column by name. Harvested keys are columns too.
    pub fn get(&self, column: &str) -> Option<String> {
        match column {
            "measurement" => Some(self.measurement.to_string_lossy().into_owned()),
            "path" => Some(self.path().to_string_lossy().into_owned()),
            "subject" => Some(self.subject.clone()),
            "session" => Some(self.session.clone()),
            "scan" => Some(self.scan.clone()),
            "scan_type" => Some(self.scan_type.clone()),
            "modality" => self.modality.clone(),
            other => self.fields.get(other).cloned(),
        }
    }

    /// Numeric scan number, when the scan label is one.
    pub fn scan_number(&self) -> Option<u32> {
        self.scan.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// SelectionTable – the complete selection result
// ---------------------------------------------------------------------------

/// Read-only aggregate of accepted scans plus their column names.
#[derive(Debug, Clone, Default)]
pub struct SelectionTable {
    records: Vec<ScanRecord>,
    /// Fixed columns followed by harvested key columns (sorted).
    pub column_names: Vec<String>,
}

impl SelectionTable {
    /// Build the table and its column names.
    ///
    /// Fails with [`SelectError::DuplicateScan`] if two records share
    /// (subject, session, scan).
    pub fn from_records(records: Vec<ScanRecord>) -> Result<Self> {
        let mut seen: HashSet<(&str, &str, &str)> = HashSet::with_capacity(records.len());
        for rec in &records {
            if !seen.insert((rec.subject.as_str(), rec.session.as_str(), rec.scan.as_str())) {
                return Err(SelectError::DuplicateScan {
                    subject: rec.subject.clone(),
                    session: rec.session.clone(),
                    scan: rec.scan.clone(),
                });
            }
        }

        let mut extra_columns: BTreeSet<String> = BTreeSet::new();
        for rec in &records {
            extra_columns.extend(rec.fields.keys().cloned());
        }
        let column_names: Vec<String> = FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(extra_columns)
            .collect();

        Ok(SelectionTable {
            records,
            column_names,
        })
    }

    pub fn records(&self) -> &[ScanRecord] {
        &self.records
    }

    /// Number of scans.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows belonging to one (subject, session), in table order.
    pub fn rows_for<'a>(
        &'a self,
        subject: &'a str,
        session: &'a str,
    ) -> impl Iterator<Item = &'a ScanRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.subject == subject && r.session == session)
    }

    /// Distinct (subject, session) pairs, sorted.
    pub fn subject_sessions(&self) -> Vec<(String, String)> {
        let pairs: BTreeSet<(String, String)> = self
            .records
            .iter()
            .map(|r| (r.subject.clone(), r.session.clone()))
            .collect();
        pairs.into_iter().collect()
    }
}

#[cfg(test)]
pub(crate) fn record(subject: &str, session: &str, scan: &str, fields: &[(&str, &str)]) -> ScanRecord {
    ScanRecord {
        measurement: PathBuf::from(format!("/raw/{subject}_{session}")),
        subject: subject.to_string(),
        session: session.to_string(),
        scan: scan.to_string(),
        scan_type: format!("scan{scan}"),
        modality: None,
        fields: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harvested_keys_become_sorted_columns() {
        let table = SelectionTable::from_records(vec![
            record("4011", "ofMaF", "3", &[("task", "CogB")]),
            record("4011", "ofMaF", "4", &[("acquisition", "EPI"), ("task", "JogB")]),
        ])
        .unwrap();

        assert_eq!(&table.column_names[..7], &FIXED_COLUMNS.map(String::from)[..]);
        assert_eq!(&table.column_names[7..], &["acquisition", "task"]);
    }

    #[test]
    fn subject_sessions_are_distinct_and_sorted() {
        let table = SelectionTable::from_records(vec![
            record("5706", "ofMpF", "5", &[]),
            record("4011", "ofMaF", "3", &[]),
            record("5706", "ofMpF", "6", &[]),
            record("4011", "ofM", "3", &[]),
        ])
        .unwrap();
        assert_eq!(
            table.subject_sessions(),
            vec![
                ("4011".to_string(), "ofM".to_string()),
                ("4011".to_string(), "ofMaF".to_string()),
                ("5706".to_string(), "ofMpF".to_string()),
            ]
        );
    }

    #[test]
    fn duplicate_scan_is_rejected() {
        let err = SelectionTable::from_records(vec![
            record("4011", "ofMaF", "3", &[]),
            record("4011", "ofMaF", "3", &[("task", "CogB")]),
        ])
        .unwrap_err();
        assert!(matches!(err, SelectError::DuplicateScan { ref scan, .. } if scan == "3"));
    }

    #[test]
    fn path_column_joins_measurement_and_scan() {
        let rec = record("5706", "ofMpF", "7", &[]);
        assert_eq!(rec.get("path").unwrap(), "/raw/5706_ofMpF/7");
        assert_eq!(rec.get("task"), None);
        assert_eq!(rec.scan_number(), Some(7));
    }
}
