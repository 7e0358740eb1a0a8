use std::collections::BTreeMap;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Semantic keys and their surface aliases
// ---------------------------------------------------------------------------

/// A semantic key recognised in display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticKey {
    /// Column name in the selection table.
    pub name: &'static str,
    /// Short key used in canonical file names.
    pub bids: &'static str,
    /// Spellings that may introduce the key inside a display name.
    pub aliases: &'static [&'static str],
}

pub const SEMANTIC_KEYS: &[SemanticKey] = &[
    SemanticKey {
        name: "task",
        bids: "task",
        aliases: &[
            "task",
            "Task",
            "TASK",
            "stim",
            "Stim",
            "STIM",
            "stimulation",
            "Stimulation",
            "STIMULATION",
        ],
    },
    SemanticKey {
        name: "acquisition",
        bids: "acq",
        aliases: &[
            "acq",
            "Acq",
            "ACQ",
            "acquisition",
            "Acquisition",
            "ACQUISITION",
        ],
    },
    SemanticKey {
        name: "run",
        bids: "run",
        aliases: &["run", "Run", "RUN"],
    },
    SemanticKey {
        name: "contrast",
        bids: "ce",
        aliases: &["ce", "Ce", "CE", "contrast", "Contrast", "CONTRAST"],
    },
    SemanticKey {
        name: "reconstruction",
        bids: "rec",
        aliases: &[
            "rec",
            "Rec",
            "REC",
            "reconstruction",
            "Reconstruction",
            "RECONSTRUCTION",
        ],
    },
    SemanticKey {
        name: "direction",
        bids: "dir",
        aliases: &["dir", "Dir", "DIR", "direction", "Direction", "DIRECTION"],
    },
    SemanticKey {
        name: "echo",
        bids: "echo",
        aliases: &["echo", "Echo", "ECHO"],
    },
];

/// Keys decided per measurement rather than per scan.
const MEASUREMENT_KEYS: [&str; 4] = ["subject", "subjects", "session", "sessions"];

/// Find a semantic key by table column name or by its short name.
pub fn semantic_key(key: &str) -> Option<&'static SemanticKey> {
    SEMANTIC_KEYS.iter().find(|k| k.name == key || k.bids == key)
}

/// Short name used in file names; unknown keys are used verbatim.
pub fn bids_key(key: &str) -> &str {
    semantic_key(key).map(|k| k.bids).unwrap_or(key)
}

/// Table column for a key given either way; unknown keys are used verbatim.
pub fn column_key(key: &str) -> &str {
    semantic_key(key).map(|k| k.name).unwrap_or(key)
}

fn aliases_for(key: &str) -> Vec<&str> {
    match semantic_key(key) {
        Some(k) => k.aliases.to_vec(),
        None => vec![key],
    }
}

// ---------------------------------------------------------------------------
// CriteriaSpec
// ---------------------------------------------------------------------------

/// Include/exclude criteria, keyed by semantic key.
///
/// `subject`/`session` (or `subjects`/`sessions`) are checked against the
/// measurement state file; every other key is matched inside scan display
/// names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaSpec {
    #[serde(rename = "match")]
    pub include: BTreeMap<String, Vec<String>>,
    pub exclude: BTreeMap<String, Vec<String>>,
}

impl CriteriaSpec {
    pub fn include(mut self, key: &str, values: &[&str]) -> Self {
        self.include
            .insert(key.to_string(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn exclude(mut self, key: &str, values: &[&str]) -> Self {
        self.exclude
            .insert(key.to_string(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Equality rule for subject/session: accepted if there is no whitelist
    /// or the value is whitelisted, and the value is not blacklisted.
    pub fn accepts_identifier(&self, key: &str, value: &str) -> bool {
        let allowed = identifier_values(&self.include, key);
        let denied = identifier_values(&self.exclude, key);
        let whitelisted = allowed.is_empty() || allowed.iter().any(|v| v.as_str() == value);
        whitelisted && !denied.iter().any(|v| v.as_str() == value)
    }

    fn scan_include(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.include
            .iter()
            .filter(|(k, _)| !MEASUREMENT_KEYS.contains(&k.as_str()))
    }

    fn scan_exclude(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.exclude
            .iter()
            .filter(|(k, _)| !MEASUREMENT_KEYS.contains(&k.as_str()))
    }
}

/// Values listed under `key` or its plural spelling.
fn identifier_values<'a>(map: &'a BTreeMap<String, Vec<String>>, key: &str) -> Vec<&'a String> {
    let plural = format!("{key}s");
    map.get(key)
        .into_iter()
        .chain(map.get(&plural))
        .flatten()
        .collect()
}

// ---------------------------------------------------------------------------
// Display-name matching
// ---------------------------------------------------------------------------

/// A scan that satisfied its criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMatch {
    pub scan_type: String,
    pub scan: String,
    /// Semantic key column → value.
    pub fields: BTreeMap<String, String>,
}

/// Harvest patterns for every alias of one semantic key.
struct HarvestPattern {
    name: &'static str,
    aliases: Vec<(&'static str, Regex)>,
}

/// `alias-value`, value captured up to the next delimiter.
static HARVEST_PATTERNS: Lazy<Vec<HarvestPattern>> = Lazy::new(|| {
    SEMANTIC_KEYS
        .iter()
        .map(|key| HarvestPattern {
            name: key.name,
            aliases: key
                .aliases
                .iter()
                .filter_map(|alias| {
                    let pattern = format!(r"(?:^|[_ ]){}-([^_ ]+)", regex::escape(alias));
                    Regex::new(&pattern).ok().map(|re| (*alias, re))
                })
                .collect(),
        })
        .collect()
});

/// Harvest every recognised key present in `name`, except `skip`.
pub fn harvest(name: &str, skip: Option<&str>) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for pattern in HARVEST_PATTERNS.iter() {
        if Some(pattern.name) == skip {
            continue;
        }
        let found = pattern
            .aliases
            .iter()
            .filter(|(alias, _)| name.contains(*alias))
            .find_map(|(_, re)| re.captures(name).map(|c| c[1].to_string()));
        if let Some(value) = found {
            fields.insert(pattern.name.to_string(), value);
        }
    }
    fields
}

/// One `alias-value` pair, delimited on both sides by the string boundary,
/// an underscore or a space.
#[derive(Debug, Clone)]
struct PairPattern {
    alias: String,
    value: String,
    regex: Regex,
}

impl PairPattern {
    fn new(alias: &str, value: &str) -> Option<Self> {
        let pattern = format!(
            r"(?:^|[_ ]){}-{}(?:$|[_ ])",
            regex::escape(alias),
            regex::escape(value)
        );
        let regex = Regex::new(&pattern).ok()?;
        Some(Self {
            alias: alias.to_string(),
            value: value.to_string(),
            regex,
        })
    }

    fn is_present(&self, name: &str) -> bool {
        name.contains(self.alias.as_str()) && self.regex.is_match(name)
    }
}

/// Compiled patterns for one key, in the order they are tried: aliases
/// outer, allowed values inner.
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    key: String,
    column: String,
    pairs: Vec<PairPattern>,
}

impl KeyMatcher {
    pub fn new(key: &str, values: &[String]) -> Self {
        let pairs = aliases_for(key)
            .into_iter()
            .flat_map(move |alias| {
                values
                    .iter()
                    .filter_map(move |value| PairPattern::new(alias, value))
            })
            .collect();
        Self {
            key: key.to_string(),
            column: column_key(key).to_string(),
            pairs,
        }
    }

    fn first_value(&self, display_name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|pair| pair.is_present(display_name))
            .map(|pair| pair.value.as_str())
    }

    /// Match against a display name, harvesting the other recognised keys
    /// on success.
    pub fn matches(&self, display_name: &str, scan: &str) -> Option<ScanMatch> {
        let value = self.first_value(display_name)?;
        let mut fields = harvest(display_name, Some(&self.column));
        fields.insert(self.column.clone(), value.to_string());
        Some(ScanMatch {
            scan_type: display_name.to_string(),
            scan: scan.to_string(),
            fields,
        })
    }

    /// True if any of the values is present for this key.
    pub fn excludes(&self, display_name: &str) -> bool {
        self.first_value(display_name).is_some()
    }
}

/// Scan-level criteria compiled once for a whole selection pass.
#[derive(Debug, Clone, Default)]
pub struct CriteriaMatcher {
    include: Vec<KeyMatcher>,
    exclude: Vec<KeyMatcher>,
}

impl CriteriaMatcher {
    pub fn new(criteria: &CriteriaSpec) -> Self {
        Self {
            include: criteria
                .scan_include()
                .map(|(key, values)| KeyMatcher::new(key, values))
                .collect(),
            exclude: criteria
                .scan_exclude()
                .map(|(key, values)| KeyMatcher::new(key, values))
                .collect(),
        }
    }

    /// Decide whether a scan passes every scan-level criterion.
    ///
    /// Excluded scans are dropped first. Every scan-level `match` key must
    /// then match; with no scan-level keys every scan passes and all
    /// recognised keys are harvested.
    pub fn evaluate(&self, display_name: &str, scan: &str) -> Option<ScanMatch> {
        if let Some(key) = self.exclude.iter().find(|m| m.excludes(display_name)) {
            debug!("scan {scan} '{display_name}' excluded by '{}'", key.key);
            return None;
        }

        let mut fields = harvest(display_name, None);
        let mut matched = BTreeMap::new();
        for key in &self.include {
            match key.matches(display_name, scan) {
                Some(hit) => {
                    if let Some(value) = hit.fields.get(&key.column) {
                        matched.insert(key.column.clone(), value.clone());
                    }
                    fields.extend(hit.fields);
                }
                None => {
                    debug!("scan {scan} '{display_name}' does not match '{}'", key.key);
                    return None;
                }
            }
        }
        fields.extend(matched);

        Some(ScanMatch {
            scan_type: display_name.to_string(),
            scan: scan.to_string(),
            fields,
        })
    }
}

/// Match one key against a display name.
///
/// Allowed values are tried in order and the first that appears, delimited,
/// after one of the key's aliases wins. On success the other recognised keys
/// in the same name are harvested too.
pub fn match_key(key: &str, allowed: &[String], display_name: &str, scan: &str) -> Option<ScanMatch> {
    KeyMatcher::new(key, allowed).matches(display_name, scan)
}

/// True if any excluded value is present for its key in the display name.
pub fn is_excluded(key: &str, denied: &[String], display_name: &str) -> bool {
    KeyMatcher::new(key, denied).excludes(display_name)
}

/// One-off [`CriteriaMatcher::evaluate`]; compiles the criteria each call.
pub fn evaluate_scan(criteria: &CriteriaSpec, display_name: &str, scan: &str) -> Option<ScanMatch> {
    CriteriaMatcher::new(criteria).evaluate(display_name, scan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn value_must_be_delimited() {
        let allowed = values(&["CogB"]);
        assert!(match_key("task", &allowed, "JB_task-CogB2m_acq-EPI", "5").is_none());
        let hit = match_key("task", &allowed, "JB_task-CogB_acq-EPI", "5").unwrap();
        assert_eq!(hit.fields["task"], "CogB");
        assert_eq!(hit.fields["acquisition"], "EPI");
        assert_eq!(hit.scan_type, "JB_task-CogB_acq-EPI");
        assert_eq!(hit.scan, "5");
    }

    #[test]
    fn alias_must_be_delimited_too() {
        let allowed = values(&["EPI"]);
        assert!(match_key("acquisition", &allowed, "xacq-EPI", "1").is_none());
        assert!(match_key("acquisition", &allowed, "acq-EPI", "1").is_some());
        assert!(match_key("acquisition", &allowed, "cbv acq-EPI run-2", "1").is_some());
    }

    #[test]
    fn stimulation_alias_matches_task() {
        let hit = match_key("task", &values(&["JogB"]), "EPI_stim-JogB", "9").unwrap();
        assert_eq!(hit.fields.get("task").map(String::as_str), Some("JogB"));
    }

    #[test]
    fn first_allowed_value_wins() {
        let allowed = values(&["CogB", "CogBr"]);
        let hit = match_key("task", &allowed, "task-CogB_task-CogBr", "1").unwrap();
        assert_eq!(hit.fields["task"], "CogB");
    }

    #[test]
    fn exclusion_uses_the_same_boundaries() {
        let denied = values(&["CogB"]);
        assert!(is_excluded("task", &denied, "task-CogB_acq-EPI"));
        assert!(!is_excluded("task", &denied, "task-CogB2m_acq-EPI"));
    }

    #[test]
    fn evaluate_requires_every_key_and_no_exclusion() {
        let criteria = CriteriaSpec::default()
            .include("task", &["CogB"])
            .include("acquisition", &["EPI"])
            .include("subject", &["4011"]);
        assert!(evaluate_scan(&criteria, "task-CogB_acq-EPI_run-1", "3").is_some());
        assert!(evaluate_scan(&criteria, "task-CogB_acq-TurboRARE", "3").is_none());

        let excluding = criteria.exclude("run", &["1"]);
        assert!(evaluate_scan(&excluding, "task-CogB_acq-EPI_run-1", "3").is_none());
        let kept = evaluate_scan(&excluding, "task-CogB_acq-EPI_run-2", "3").unwrap();
        assert_eq!(kept.fields["run"], "2");
    }

    #[test]
    fn without_scan_keys_everything_is_harvested() {
        let hit = evaluate_scan(&CriteriaSpec::default(), "T2_TurboRARE_acq-lowcov", "1").unwrap();
        assert_eq!(hit.fields.len(), 1);
        assert_eq!(hit.fields["acquisition"], "lowcov");
    }

    #[test]
    fn identifier_equality_rule() {
        let criteria = CriteriaSpec::default()
            .include("session", &["ofMaF", "ofMpF"])
            .exclude("subjects", &["4001"]);
        assert!(criteria.accepts_identifier("session", "ofMaF"));
        assert!(!criteria.accepts_identifier("session", "ofM"));
        assert!(criteria.accepts_identifier("subject", "4011"));
        assert!(!criteria.accepts_identifier("subject", "4001"));
    }

    #[test]
    fn every_key_has_all_three_capitalisations() {
        let hit = harvest("EPI_Dir-AP_Rec-mag_Ce-gd", None);
        assert_eq!(hit["direction"], "AP");
        assert_eq!(hit["reconstruction"], "mag");
        assert_eq!(hit["contrast"], "gd");
        let long = harvest("EPI_DIRECTION-PA_RECONSTRUCTION-phase", None);
        assert_eq!(long["direction"], "PA");
        assert_eq!(long["reconstruction"], "phase");
        for key in SEMANTIC_KEYS {
            let lower = key.aliases[0];
            let mut title = lower[..1].to_uppercase();
            title.push_str(&lower[1..]);
            assert!(key.aliases.contains(&title.as_str()), "{} lacks {title}", key.name);
            assert!(key.aliases.contains(&lower.to_uppercase().as_str()), "{} lacks upper case", key.name);
        }
    }

    #[test]
    fn compiled_matcher_is_reusable_across_scans() {
        let criteria = CriteriaSpec::default()
            .include("task", &["CogB", "JogB"])
            .exclude("acq", &["TurboRARE"]);
        let matcher = CriteriaMatcher::new(&criteria);
        let names = [
            "EPI_task-CogB_acq-EPI",
            "EPI_stim-JogB_run-2",
            "EPI_task-CogB2m_acq-EPI",
            "T2_task-CogB_acq-TurboRARE",
            "Localizer",
        ];
        for _ in 0..3 {
            for (i, name) in names.iter().enumerate() {
                let scan = (i + 1).to_string();
                assert_eq!(matcher.evaluate(name, &scan), evaluate_scan(&criteria, name, &scan));
            }
        }
        let kept: Vec<&str> = names
            .iter()
            .filter(|name| matcher.evaluate(name, "1").is_some())
            .copied()
            .collect();
        assert_eq!(kept, vec!["EPI_task-CogB_acq-EPI", "EPI_stim-JogB_run-2"]);
    }

    #[test]
    fn short_and_long_key_names_resolve() {
        assert_eq!(bids_key("acquisition"), "acq");
        assert_eq!(column_key("acq"), "acquisition");
        assert_eq!(bids_key("custom"), "custom");
    }
}
