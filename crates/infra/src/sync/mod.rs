//! Remote backend adapters.
//!
//! - [`RestRemoteStore`]: the `RemoteStore` port over a PostgREST endpoint.

pub mod rest_client;

pub use rest_client::RestRemoteStore;
