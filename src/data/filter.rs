use std::collections::BTreeMap;

use super::model::{ScanRecord, SelectionTable};
use crate::error::{Result, SelectError};

// ---------------------------------------------------------------------------
// Column filters: an ordered sequence of (column, predicate)
// ---------------------------------------------------------------------------

/// What a column value must satisfy for a row to pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Cell is present and equal to the value.
    Equals(String),
    /// Cell is null.
    IsNull,
}

impl Predicate {
    fn accepts(&self, cell: Option<&str>) -> bool {
        match (self, cell) {
            (Predicate::Equals(want), Some(have)) => want == have,
            (Predicate::IsNull, None) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub column: String,
    pub predicate: Predicate,
}

impl ColumnFilter {
    pub fn equals(column: impl Into<String>, value: impl Into<String>) -> Self {
        ColumnFilter {
            column: column.into(),
            predicate: Predicate::Equals(value.into()),
        }
    }

    fn accepts(&self, record: &ScanRecord) -> bool {
        self.predicate.accepts(record.get(&self.column).as_deref())
    }
}

/// Build the ordered filter sequence for a lookup.
///
/// A key in `filters` is skipped when its value is null or when `overrides`
/// names the same key; every non-empty entry of `overrides` is then applied
/// unconditionally, after the plain filters.
pub fn build_filters(
    filters: &BTreeMap<String, Option<String>>,
    overrides: Option<&BTreeMap<String, String>>,
) -> Vec<ColumnFilter> {
    let mut out = Vec::new();
    for (key, value) in filters {
        if overrides.is_some_and(|o| o.contains_key(key)) {
            continue;
        }
        if let Some(value) = value {
            out.push(ColumnFilter::equals(key, value));
        }
    }
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            if !value.is_empty() {
                out.push(ColumnFilter::equals(key, value));
            }
        }
    }
    out
}

/// Return indices of rows that pass every filter, in table order.
pub fn filtered_indices(table: &SelectionTable, filters: &[ColumnFilter]) -> Vec<usize> {
    table
        .records()
        .iter()
        .enumerate()
        .filter(|(_, rec)| filters.iter().all(|f| f.accepts(rec)))
        .map(|(i, _)| i)
        .collect()
}

// ---------------------------------------------------------------------------
// Column lookup
// ---------------------------------------------------------------------------

/// How many rows a lookup is allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Exactly one row must match; anything else is an error.
    ExactlyOne,
    /// Take the first matching row, or nothing.
    Failsafe,
    /// Return the column value of every matching row.
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Single(Option<String>),
    List(Vec<Option<String>>),
}

impl Selection {
    /// The single value, if this is a single-row selection with a non-null cell.
    pub fn single(self) -> Option<String> {
        match self {
            Selection::Single(v) => v,
            Selection::List(_) => None,
        }
    }
}

/// Filter the table and read one column from the result.
///
/// In [`SelectMode::ExactlyOne`] zero or several matching rows yield
/// [`SelectError::AmbiguousLookup`].
pub fn select_from_table(
    table: &SelectionTable,
    filters: &BTreeMap<String, Option<String>>,
    overrides: Option<&BTreeMap<String, String>>,
    column: &str,
    mode: SelectMode,
) -> Result<Selection> {
    let sequence = build_filters(filters, overrides);
    let indices = filtered_indices(table, &sequence);
    let rows = table.records();

    match mode {
        SelectMode::List => Ok(Selection::List(
            indices.iter().map(|&i| rows[i].get(column)).collect(),
        )),
        SelectMode::Failsafe => Ok(Selection::Single(
            indices.first().and_then(|&i| rows[i].get(column)),
        )),
        SelectMode::ExactlyOne => match indices.as_slice() {
            [only] => Ok(Selection::Single(rows[*only].get(column))),
            other => Err(SelectError::AmbiguousLookup {
                column: column.to_string(),
                matches: other.len(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::record;

    fn table() -> SelectionTable {
        SelectionTable::from_records(vec![
            record("4011", "ofMaF", "3", &[("acquisition", "TurboRARElowcov")]),
            record("4011", "ofMaF", "5", &[("task", "CogB"), ("acquisition", "EPI")]),
            record("5706", "ofMpF", "5", &[("task", "CogB"), ("acquisition", "EPI")]),
        ])
        .unwrap()
    }

    fn dict(pairs: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(String::from)))
            .collect()
    }

    #[test]
    fn exactly_one_returns_the_cell() {
        let got = select_from_table(
            &table(),
            &dict(&[("subject", Some("4011")), ("task", Some("CogB"))]),
            None,
            "scan",
            SelectMode::ExactlyOne,
        )
        .unwrap();
        assert_eq!(got, Selection::Single(Some("5".into())));
    }

    #[test]
    fn zero_results_raise_unless_failsafe() {
        let filters = dict(&[("subject", Some("9999"))]);
        let err = select_from_table(&table(), &filters, None, "scan", SelectMode::ExactlyOne)
            .unwrap_err();
        assert!(matches!(err, SelectError::AmbiguousLookup { matches: 0, .. }));

        let got =
            select_from_table(&table(), &filters, None, "scan", SelectMode::Failsafe).unwrap();
        assert_eq!(got, Selection::Single(None));
    }

    #[test]
    fn several_results_raise_unless_failsafe() {
        let filters = dict(&[("task", Some("CogB"))]);
        let err = select_from_table(&table(), &filters, None, "subject", SelectMode::ExactlyOne)
            .unwrap_err();
        assert!(matches!(err, SelectError::AmbiguousLookup { matches: 2, .. }));

        let first = select_from_table(&table(), &filters, None, "subject", SelectMode::Failsafe)
            .unwrap()
            .single();
        assert_eq!(first.as_deref(), Some("4011"));
    }

    #[test]
    fn null_filters_are_ignored_and_overrides_win() {
        let filters = dict(&[("subject", Some("4011")), ("task", None)]);
        let overrides: BTreeMap<String, String> =
            [("subject".to_string(), "5706".to_string())].into();
        let got = select_from_table(
            &table(),
            &filters,
            Some(&overrides),
            "session",
            SelectMode::List,
        )
        .unwrap();
        assert_eq!(got, Selection::List(vec![Some("ofMpF".into())]));
    }

    #[test]
    fn is_null_predicate_matches_missing_columns() {
        let t = table();
        let seq = vec![ColumnFilter {
            column: "task".into(),
            predicate: Predicate::IsNull,
        }];
        assert_eq!(filtered_indices(&t, &seq), vec![0]);
    }
}
