//! Scan Report → Match Eligibility → Eligibility Decision.
//!
//! Both steps are pure: the transform takes its timestamp as an argument and
//! the ruleset reads nothing but its input.

use crate::models::{
    EligibilityDecision, EligibilityError, MatchEligibility, Runtime, ScanReport,
};
use chrono::{DateTime, Utc};

/// More providers than this is treated as an ambiguous workspace.
pub const MAX_SQUAD_SIZE: usize = 3;

pub fn transform_to_eligibility(report: &ScanReport, now: DateTime<Utc>) -> MatchEligibility {
    MatchEligibility {
        squad: report.providers.clone(),
        formations: report.requested_capabilities.clone(),
        clearance: report.required_secrets.clone(),
        stadium_rules: Some(report.runtime),
        inspection_score: report.files_scanned.len() as i64,
        warnings: report.warnings.clone(),
        timestamp: now,
    }
}

/// Evaluate every rule in order and collect all violations.
pub fn validate(eligibility: &MatchEligibility) -> EligibilityDecision {
    let mut errors = Vec::new();

    if eligibility.squad.is_empty() {
        errors.push(EligibilityError::EmptySquad);
    }
    if eligibility.squad.len() > MAX_SQUAD_SIZE {
        errors.push(EligibilityError::SquadOverflow);
    }
    if eligibility.formations.is_empty() {
        errors.push(EligibilityError::NoFormations);
    }
    if matches!(eligibility.stadium_rules, None | Some(Runtime::Unknown)) {
        errors.push(EligibilityError::UnknownStadium);
    }

    EligibilityDecision {
        eligible: errors.is_empty(),
        errors,
        squad: eligibility.squad.clone(),
        formations: eligibility.formations.clone(),
        clearance: eligibility.clearance.clone(),
        stadium_rules: eligibility.stadium_rules,
        inspection_score: eligibility.inspection_score,
        warnings: eligibility.warnings.clone(),
        timestamp: eligibility.timestamp,
    }
}
