pub mod identity;

pub use identity::{ConsumerHeaders, Requester};
