pub mod health;
pub mod ingest;
pub mod lease;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use ingest::{
    bind, bind_result, eligibility_result, evaluate_eligibility, list_leases, register_scan,
    scan_result,
};
pub use lease::{consume_lease, get_lease, issue_lease, revoke_lease};
