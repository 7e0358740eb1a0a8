use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use super::criteria::CriteriaMatcher;
use super::measurement::{identify, Identification};
use super::modality::assign_modality;
use super::source::{probe, DirectoryWalkScanSource, ScanCandidate, ScanSource, SourceKind};
use crate::config::SelectionConfig;
use crate::data::model::{Measurement, ScanRecord, SelectionTable};
use crate::error::{Diagnostic, Result, SelectError, SkipReason};

// ---------------------------------------------------------------------------
// Per-measurement outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MeasurementOutcome {
    path: PathBuf,
    records: Vec<ScanRecord>,
    skipped: Option<SkipReason>,
    diagnostics: Vec<Diagnostic>,
}

impl MeasurementOutcome {
    fn skipped(path: &Path, reason: SkipReason) -> Self {
        Self {
            path: path.to_path_buf(),
            records: Vec::new(),
            skipped: Some(reason),
            diagnostics: Vec::new(),
        }
    }
}

/// What a selection pass left out, and why.
#[derive(Debug, Clone, Default)]
pub struct SelectionReport {
    /// Measurements that contributed at least one scan.
    pub accepted: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of a selection pass.
#[derive(Debug, Clone)]
pub struct DataSelection {
    pub table: SelectionTable,
    pub report: SelectionReport,
}

// ---------------------------------------------------------------------------
// Selection pass
// ---------------------------------------------------------------------------

/// Measurement directories to visit, sorted by path.
fn candidate_measurements(root: &Path, config: &SelectionConfig) -> Result<Vec<PathBuf>> {
    let names: Vec<String> = if config.measurements.is_empty() {
        std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(String::from))
            .collect()
    } else {
        config.measurements.clone()
    };

    let mut paths: Vec<PathBuf> = names
        .into_iter()
        .filter(|name| !config.exclude_measurements.contains(name))
        .filter(|name| config.fail_suffix.is_empty() || !name.ends_with(&config.fail_suffix))
        .map(|name| root.join(name))
        .filter(|path| path.is_dir())
        .collect();
    paths.sort();
    Ok(paths)
}

fn build_records(
    measurement: &Measurement,
    candidates: Vec<ScanCandidate>,
    matcher: &CriteriaMatcher,
) -> Vec<ScanRecord> {
    candidates
        .into_iter()
        .filter_map(|c| matcher.evaluate(&c.display_name, &c.scan))
        .map(|hit| ScanRecord {
            measurement: measurement.path.clone(),
            subject: measurement.subject.clone(),
            session: measurement.session.clone(),
            modality: assign_modality(&hit.scan_type),
            scan: hit.scan,
            scan_type: hit.scan_type,
            fields: hit.fields,
        })
        .collect()
}

/// Records from `primary`, falling back to `fallback` when an index read
/// stopped early before anything matched.
///
/// A truncated index with matches keeps the partial records. Either way the
/// truncation is reported.
fn enumerate_scans(
    measurement: &Path,
    primary: &dyn ScanSource,
    fallback: &dyn ScanSource,
    keep: impl Fn(Vec<ScanCandidate>) -> Vec<ScanRecord>,
) -> (Vec<ScanRecord>, Option<Diagnostic>) {
    let listing = primary.list();
    let records = keep(listing.candidates);
    if !listing.truncated || primary.kind() != SourceKind::Indexed {
        return (records, None);
    }

    let after_match = !records.is_empty();
    let records = if after_match {
        records
    } else {
        keep(fallback.list().candidates)
    };
    let diagnostic = Diagnostic::IndexTruncated {
        measurement: measurement.to_path_buf(),
        after_match,
    };
    (records, Some(diagnostic))
}

fn scan_measurement(path: &Path, config: &SelectionConfig, matcher: &CriteriaMatcher) -> MeasurementOutcome {
    let measurement = match identify(path, &config.layout, &config.criteria) {
        Ok(Identification::Accepted(m)) => m,
        Ok(Identification::Rejected(reason)) => return MeasurementOutcome::skipped(path, reason),
        Err(SelectError::MalformedTag { tag, .. }) => {
            return MeasurementOutcome::skipped(path, SkipReason::MalformedTag(tag))
        }
        Err(_) => return MeasurementOutcome::skipped(path, SkipReason::MissingStateFile),
    };

    let (records, diagnostic) = enumerate_scans(
        path,
        probe(path, &config.layout).as_ref(),
        &DirectoryWalkScanSource::new(path, &config.layout),
        |candidates| build_records(&measurement, candidates, matcher),
    );

    debug!(
        "{}: sub-{} ses-{}, {} scan(s) selected",
        path.display(),
        measurement.subject,
        measurement.session,
        records.len()
    );

    MeasurementOutcome {
        path: path.to_path_buf(),
        skipped: records.is_empty().then_some(SkipReason::NoScans),
        records,
        diagnostics: diagnostic.into_iter().collect(),
    }
}

/// Number scans sharing (subject, session, scan_type) in scan order, for
/// records without a harvested run.
fn count_runs(records: &mut [ScanRecord]) {
    let mut groups: BTreeMap<(String, String, String), Vec<usize>> = BTreeMap::new();
    for (i, rec) in records.iter().enumerate() {
        groups
            .entry((rec.subject.clone(), rec.session.clone(), rec.scan_type.clone()))
            .or_default()
            .push(i);
    }
    for indices in groups.into_values() {
        let mut ordered = indices;
        ordered.sort_by(|&a, &b| {
            let (ra, rb) = (&records[a], &records[b]);
            ra.scan_number()
                .cmp(&rb.scan_number())
                .then_with(|| ra.scan.cmp(&rb.scan))
        });
        for (run, i) in ordered.into_iter().enumerate() {
            records[i]
                .fields
                .entry("run".to_string())
                .or_insert_with(|| (run + 1).to_string());
        }
    }
}

/// Walk `root`, select scans matching the configured criteria and assemble
/// the selection table.
///
/// Measurements are processed in parallel and reassembled in path order, so
/// the table is identical across runs. Per-measurement failures are recorded
/// in the report; only a missing root, a thread pool failure or a duplicate
/// (subject, session, scan) is an error.
pub fn get_data_selection(root: &Path, config: &SelectionConfig) -> Result<DataSelection> {
    if !root.is_dir() {
        return Err(SelectError::RootNotFound(root.to_path_buf()));
    }
    let measurements = candidate_measurements(root, config)?;
    let matcher = CriteriaMatcher::new(&config.criteria);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build()
        .map_err(|e| SelectError::ThreadPool(e.to_string()))?;
    let mut outcomes: Vec<MeasurementOutcome> = pool.install(|| {
        measurements
            .par_iter()
            .map(|path| scan_measurement(path, config, &matcher))
            .collect()
    });
    outcomes.sort_by(|a, b| a.path.cmp(&b.path));

    let mut report = SelectionReport::default();
    let mut records = Vec::new();
    for outcome in outcomes {
        for diagnostic in &outcome.diagnostics {
            warn!("{diagnostic}");
        }
        report.diagnostics.extend(outcome.diagnostics);
        match outcome.skipped {
            Some(reason) => {
                warn!("Skipping {}: {reason}", outcome.path.display());
                report.skipped.push((outcome.path, reason));
            }
            None => {
                report.accepted.push(outcome.path);
                records.extend(outcome.records);
            }
        }
    }

    if config.count_runs {
        count_runs(&mut records);
    }

    let table = SelectionTable::from_records(records)?;
    info!(
        "Selected {} scan(s) from {} measurement(s), {} skipped",
        table.len(),
        report.accepted.len(),
        report.skipped.len()
    );
    Ok(DataSelection { table, report })
}
