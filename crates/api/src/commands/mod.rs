//! Commands - the surface the UI layer calls into

mod health;
mod records;
mod sync;

pub use health::*;
pub use records::*;
pub use sync::*;
