//! Compliance plan generator (spec §4.7): classifies each non-compliant
//! file's proposed rename as `safe` (case/punctuation only) or `risky`
//! (structural — title, year, season/episode actually changed). Only
//! `safe` fixes are applied by default; `risky` requires explicit opt-in
//! at execution time.

use super::documents::{ComplianceAction, ComplianceClass, CompliancePlan, ComplianceSummary, PlanState};
use crate::index::MediaIndex;
use crate::naming;
use tracing::info;

pub async fn generate(index: &MediaIndex) -> crate::error::Result<CompliancePlan> {
    let files = index.find_non_compliant_files().await?;

    let mut actions = Vec::with_capacity(files.len());
    let mut safe = 0usize;
    let mut risky = 0usize;

    for file in &files {
        let parsed = file.to_parsed_name();
        let issues = naming::compliance_issues(&file.path, &parsed);
        if issues.is_empty() {
            continue;
        }

        let new_name = naming::expected_name(&file.path, &parsed);
        let new_path = match file.path.parent() {
            Some(dir) => dir.join(&new_name),
            None => continue,
        };

        let classification = classify(file.path.file_name().and_then(|n| n.to_str()), &new_name);
        match classification {
            ComplianceClass::Safe => safe += 1,
            ComplianceClass::Risky => risky += 1,
        }

        actions.push(ComplianceAction {
            source_path: file.path.clone(),
            new_path,
            classification,
            issues,
        });
    }

    info!(safe, risky, "compliance plan generated");

    Ok(CompliancePlan {
        summary: ComplianceSummary { safe, risky },
        actions,
        state: PlanState::Draft,
    })
}

/// `safe` when the rename only differs from the current name in case or
/// punctuation (the normalized-title comparison used for equality ignores
/// both); any other difference — a title, year, or episode code that
/// actually changed — is `risky`.
fn classify(actual: Option<&str>, expected: &str) -> ComplianceClass {
    match actual {
        Some(actual) if naming::normalize_title(actual) == naming::normalize_title(expected) => {
            ComplianceClass::Safe
        }
        _ => ComplianceClass::Risky,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_case_only_difference_is_safe() {
        let classification = classify(Some("dracula (2020).mkv"), "Dracula (2020).mkv");
        assert_eq!(classification, ComplianceClass::Safe);
    }

    #[test]
    fn classify_structural_difference_is_risky() {
        let classification = classify(Some("Drcla.S01E01.mkv"), "Dracula (2020) - S01E01.mkv");
        assert_eq!(classification, ComplianceClass::Risky);
    }
}
