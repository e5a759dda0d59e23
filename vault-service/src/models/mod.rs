pub mod audit;
pub mod bind;
pub mod contract;
pub mod eligibility;
pub mod lease;
pub mod scan;

pub use audit::{AuditEventType, AuditRecord};
pub use bind::{
    BindContext, BindDecision, BindStatus, LeaseRequirement, LeaseType, PolicyFlags,
    RequirementStatus,
};
pub use contract::{contract_hash, IngestContracts, Phase, PhaseRecord, PhaseState};
pub use eligibility::{EligibilityDecision, EligibilityError, MatchEligibility};
pub use lease::{Lease, LeaseStatus};
pub use scan::{Runtime, ScanReport};
