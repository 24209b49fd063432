//! Customer, vehicle and policy bookkeeping on top of the local store.

pub mod access;
pub mod renewals;
pub mod service;

pub use access::{require_staff, Visibility};
pub use renewals::upcoming_renewals;
pub use service::{BookkeepingService, CustomerSummary};
