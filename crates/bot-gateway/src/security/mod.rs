pub mod client_ip;
pub mod clock;
pub mod middleware;
pub mod policy;
pub mod rate_limit;
pub mod window_store;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use middleware::{admit, apply_rate_limit_headers, AdmissionGuard};
pub use policy::{PolicySpec, PolicyTable, RatePolicy};
pub use rate_limit::{AdmissionConfig, AdmissionController, AdmissionError, RateDecision};
pub use window_store::{InMemoryWindowStore, WindowKey, WindowSnapshot, WindowStore};
