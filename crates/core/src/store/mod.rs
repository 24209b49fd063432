//! Local store: record storage port, hook dispatch and typed repositories.

pub mod hooks;
pub mod local_store;
pub mod memory;
pub mod ports;
pub mod repository;
pub mod validation;

pub use hooks::{HookRegistry, MutationEvent, MutationHook};
pub use local_store::LocalStore;
pub use memory::MemoryRecordStore;
pub use ports::{RecordStore, TableSnapshot};
pub use repository::Repository;
