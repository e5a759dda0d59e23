use super::scan::Runtime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalised projection of a Scan Report, the input to the ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEligibility {
    /// Detected providers.
    #[serde(default)]
    pub squad: Vec<String>,
    /// Requested capabilities.
    #[serde(default)]
    pub formations: Vec<String>,
    /// Secret names the workspace needs.
    #[serde(default)]
    pub clearance: Vec<String>,
    /// Runtime; absent when the caller supplied no runtime at all.
    #[serde(default)]
    pub stadium_rules: Option<Runtime>,
    #[serde(default)]
    pub inspection_score: i64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Rule violations, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityError {
    EmptySquad,
    SquadOverflow,
    NoFormations,
    UnknownStadium,
}

impl EligibilityError {
    pub fn code(&self) -> &'static str {
        match self {
            EligibilityError::EmptySquad => "EMPTY_SQUAD",
            EligibilityError::SquadOverflow => "SQUAD_OVERFLOW",
            EligibilityError::NoFormations => "NO_FORMATIONS",
            EligibilityError::UnknownStadium => "UNKNOWN_STADIUM",
        }
    }
}

impl fmt::Display for EligibilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Ruleset verdict. `eligible` is true exactly when `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityDecision {
    pub eligible: bool,
    pub errors: Vec<EligibilityError>,
    pub squad: Vec<String>,
    pub formations: Vec<String>,
    pub clearance: Vec<String>,
    pub stadium_rules: Option<Runtime>,
    pub inspection_score: i64,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
