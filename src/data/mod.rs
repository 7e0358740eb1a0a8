/// Data layer: selection table, persistence, and lookups.
///
/// Architecture:
/// ```text
///   Vec<ScanRecord>  (from scan::select)
///        │
///        ▼
///   ┌────────────────┐
///   │ SelectionTable │  records + column index, duplicate check
///   └────────────────┘
///        │                     ▲
///        ▼                     │
///   ┌──────────┐         ┌──────────┐
///   │  filter   │         │  loader   │  .csv / .json / .parquet
///   └──────────┘         └──────────┘
///   ordered column filters → one value / first value / all values
/// ```

pub mod filter;
pub mod loader;
pub mod model;
