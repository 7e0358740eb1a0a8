// ---------------------------------------------------------------------------
// Substring group → canonical modality
// ---------------------------------------------------------------------------

/// Explicit contrast tags, checked first.
pub const MODALITY_MATCH: &[(&[&str], &str)] = &[
    (&["BOLD", "bold", "Bold"], "bold"),
    (&["CBV", "cbv", "Cbv"], "cbv"),
    (&["MTon", "MtOn"], "MTon"),
    (&["MToff", "MtOff"], "MToff"),
    (&["DWI", "dwi", "Dwi"], "dwi"),
    (&["T1", "t1"], "T1w"),
    (&["T2", "t2"], "T2w"),
];

/// Sequence names that conventionally imply a contrast.
pub const BEST_GUESS_MODALITY_MATCH: &[(&[&str], &str)] = &[
    (&["FLASH"], "T1w"),
    (&["TurboRARE", "TRARE"], "T2w"),
];

fn first_match(table: &[(&[&str], &str)], display_name: &str) -> Option<String> {
    table
        .iter()
        .find(|(group, _)| group.iter().any(|s| display_name.contains(s)))
        .map(|(_, modality)| modality.to_string())
}

/// Canonical modality for a display name, or `None` when unknown.
pub fn assign_modality(display_name: &str) -> Option<String> {
    first_match(MODALITY_MATCH, display_name)
        .or_else(|| first_match(BEST_GUESS_MODALITY_MATCH, display_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_tag_beats_best_guess() {
        assert_eq!(assign_modality("T2_FLASH").as_deref(), Some("T2w"));
        assert_eq!(assign_modality("EPI_CBV_task-CogB").as_deref(), Some("cbv"));
    }

    #[test]
    fn best_guess_applies_only_without_tag() {
        assert_eq!(assign_modality("FLASH_axial").as_deref(), Some("T1w"));
        assert_eq!(assign_modality("TurboRARE_acq-lowcov").as_deref(), Some("T2w"));
    }

    #[test]
    fn unknown_stays_absent() {
        assert_eq!(assign_modality("Localizer_multi_slice"), None);
    }
}
