use std::fmt;
use std::str::FromStr;

use crate::data::model::{ScanRecord, SelectionTable};
use crate::error::{Result, SelectError};
use crate::scan::criteria::{bids_key, column_key};

// ---------------------------------------------------------------------------
// Canonical file names
// ---------------------------------------------------------------------------

/// Options for [`bids_name`]. Build a fresh value per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsNameOptions {
    /// Keys appended after the task, in this order, when present.
    pub extra_keys: Vec<String>,
    pub extension: String,
    /// Replaces the modality at the end of the name when non-empty.
    pub suffix: Option<String>,
}

impl Default for BidsNameOptions {
    fn default() -> Self {
        Self {
            extra_keys: vec!["acquisition".to_string()],
            extension: ".nii.gz".to_string(),
            suffix: None,
        }
    }
}

/// Canonical name for a single table row.
pub fn bids_name_for(record: &ScanRecord, options: &BidsNameOptions) -> String {
    let mut name = format!("sub-{}_ses-{}", record.subject, record.session);
    if let Some(task) = record.get("task") {
        name.push_str(&format!("_task-{task}"));
    }
    for key in &options.extra_keys {
        if column_key(key) == "task" {
            continue;
        }
        if let Some(value) = record.get(column_key(key)) {
            name.push_str(&format!("_{}-{value}", bids_key(key)));
        }
    }
    let suffix = options
        .suffix
        .as_deref()
        .map(|s| s.trim_start_matches('_'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or_else(|| record.modality.clone());
    if let Some(suffix) = suffix {
        name.push('_');
        name.push_str(&suffix);
    }
    name.push_str(&options.extension);
    name
}

/// Canonical name for the first row of (subject, session), or `None` when
/// the table has no such row.
pub fn bids_name(
    subject: &str,
    session: &str,
    table: &SelectionTable,
    options: &BidsNameOptions,
) -> Option<String> {
    let row = table.rows_for(subject, session).next()?;
    Some(bids_name_for(row, options))
}

/// `sub-<subject>/ses-<session>`
pub fn ss_to_path(subject: &str, session: &str) -> String {
    format!("sub-{subject}/ses-{session}")
}

// ---------------------------------------------------------------------------
// Source path templates
// ---------------------------------------------------------------------------

/// Axis of a (subject, session, scan) template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Subject,
    Session,
    Scan,
}

impl Axis {
    fn placeholder(self) -> &'static str {
        match self {
            Axis::Subject => "{subject}",
            Axis::Session => "{session}",
            Axis::Scan => "{scan}",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.placeholder().trim_matches(|c| c == '{' || c == '}');
        write!(f, "{name}")
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "subject" => Ok(Axis::Subject),
            "session" => Ok(Axis::Session),
            "scan" => Ok(Axis::Scan),
            other => Err(format!("unknown axis '{other}', expected subject, session or scan")),
        }
    }
}

/// Wildcard substituted for the grouped axis.
pub const WILDCARD: &str = "*";

/// Fill `{subject}`, `{session}` and `{scan}` in a path template.
///
/// The axis named by `group_by` becomes [`WILDCARD`], so the result can be
/// globbed to collect e.g. all sessions of one subject.
pub fn sss_to_source(
    template: &str,
    subject: &str,
    session: &str,
    scan: &str,
    group_by: Option<Axis>,
) -> Result<String> {
    let axes = [
        (Axis::Subject, subject),
        (Axis::Session, session),
        (Axis::Scan, scan),
    ];
    if !axes.iter().any(|(axis, _)| template.contains(axis.placeholder())) {
        return Err(SelectError::InvalidTemplate(template.to_string()));
    }
    let mut out = template.to_string();
    for (axis, value) in axes {
        let value = if Some(axis) == group_by { WILDCARD } else { value };
        out = out.replace(axis.placeholder(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::record;

    fn with_modality(mut rec: ScanRecord, modality: &str) -> ScanRecord {
        rec.modality = Some(modality.to_string());
        rec
    }

    #[test]
    fn anatomical_name_without_task() {
        let table = SelectionTable::from_records(vec![with_modality(
            record("4011", "ofMaF", "3", &[("acquisition", "TurboRARElowcov")]),
            "T2w",
        )])
        .unwrap();
        assert_eq!(
            bids_name("4011", "ofMaF", &table, &BidsNameOptions::default()).as_deref(),
            Some("sub-4011_ses-ofMaF_acq-TurboRARElowcov_T2w.nii.gz")
        );
    }

    #[test]
    fn functional_name_with_task() {
        let table = SelectionTable::from_records(vec![with_modality(
            record("5706", "ofMpF", "5", &[("task", "CogB"), ("acquisition", "EPI")]),
            "cbv",
        )])
        .unwrap();
        let options = BidsNameOptions::default();
        let first = bids_name("5706", "ofMpF", &table, &options);
        assert_eq!(
            first.as_deref(),
            Some("sub-5706_ses-ofMpF_task-CogB_acq-EPI_cbv.nii.gz")
        );
        assert_eq!(first, bids_name("5706", "ofMpF", &table, &options));
    }

    #[test]
    fn suffix_overrides_modality_and_keys_keep_given_order() {
        let rec = with_modality(
            record("5706", "ofMpF", "5", &[("run", "2"), ("acquisition", "EPI")]),
            "cbv",
        );
        let options = BidsNameOptions {
            extra_keys: vec!["run".into(), "acq".into(), "echo".into()],
            extension: ".json".into(),
            suffix: Some("events".into()),
        };
        assert_eq!(
            bids_name_for(&rec, &options),
            "sub-5706_ses-ofMpF_run-2_acq-EPI_events.json"
        );
    }

    #[test]
    fn missing_modality_is_omitted() {
        let rec = record("4011", "ofMaF", "3", &[]);
        assert_eq!(
            bids_name_for(&rec, &BidsNameOptions::default()),
            "sub-4011_ses-ofMaF.nii.gz"
        );
    }

    #[test]
    fn unknown_subject_session_gives_nothing() {
        let table = SelectionTable::from_records(vec![record("4011", "ofMaF", "3", &[])]).unwrap();
        assert_eq!(bids_name("4011", "ofMpF", &table, &BidsNameOptions::default()), None);
    }

    #[test]
    fn ss_path_splits_into_two_components() {
        for (subject, session) in [("4011", "ofMaF"), ("5706", "ofMpF"), ("x", "")] {
            let path = ss_to_path(subject, session);
            let parts: Vec<&str> = path.split('/').collect();
            assert_eq!(parts, vec![format!("sub-{subject}"), format!("ses-{session}")]);
        }
    }

    #[test]
    fn source_template_with_grouping() {
        let template = "/raw/{subject}_{session}/{scan}";
        assert_eq!(
            sss_to_source(template, "4011", "ofMaF", "3", None).unwrap(),
            "/raw/4011_ofMaF/3"
        );
        assert_eq!(
            sss_to_source(template, "4011", "ofMaF", "3", Some(Axis::Session)).unwrap(),
            "/raw/4011_*/3"
        );
        assert!(sss_to_source("/raw/static", "4011", "ofMaF", "3", None).is_err());
        assert_eq!("scan".parse::<Axis>(), Ok(Axis::Scan));
    }
}
