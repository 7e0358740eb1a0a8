/// Selection layer: from raw measurement directories to accepted scans.
///
/// ```text
///   root/<measurement>/subject        ──► measurement::identify
///        │                                 (subject, session, criteria)
///        ▼
///   ScanProgram.scanProgram | <n>/acqp ──► source::probe → ScanSource::list
///        │
///        ▼
///   display name ──► criteria::evaluate_scan + modality::assign_modality
///        │
///        ▼
///   select::get_data_selection ──► SelectionTable + SelectionReport
/// ```

pub mod criteria;
pub mod measurement;
pub mod modality;
pub mod select;
pub mod source;
