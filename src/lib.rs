//! Locate scans in raw scanner output directories, filter them against
//! include/exclude criteria and derive canonical BIDS names and paths.
//!
//! The selection table produced by [`get_data_selection`] is the only object
//! downstream processing needs; names and paths are computed from it on
//! demand with the pure functions in [`naming`].

pub mod config;
pub mod data;
pub mod error;
pub mod naming;
pub mod scan;

pub use config::{Layout, SelectionConfig};
pub use data::filter::{select_from_table, SelectMode, Selection};
pub use data::model::{ScanRecord, SelectionTable};
pub use error::{Diagnostic, Result, SelectError, SkipReason};
pub use naming::{bids_name, ss_to_path, sss_to_source, Axis, BidsNameOptions};
pub use scan::criteria::{CriteriaMatcher, CriteriaSpec};
pub use scan::select::{get_data_selection, DataSelection, SelectionReport};
