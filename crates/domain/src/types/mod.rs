//! Domain data types

pub mod customer;
pub mod entity;
pub mod policy;
pub mod sync;
pub mod table;
pub mod user;
pub mod vehicle;

pub use customer::*;
pub use entity::*;
pub use policy::*;
pub use sync::*;
pub use table::*;
pub use user::*;
pub use vehicle::*;
