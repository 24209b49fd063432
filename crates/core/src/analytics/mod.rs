//! Natural-language questions over policy data.

pub mod ports;
pub mod service;

pub use ports::TextAnalyzer;
pub use service::{build_prompt, digest_policies, PolicyAnalytics, PolicyDigest};
