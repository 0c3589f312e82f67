pub mod aggregate;
pub mod claim;
pub mod common;
pub mod event;
pub mod job;
pub mod pagination;

pub use aggregate::*;
pub use claim::*;
pub use common::*;
pub use event::*;
pub use job::*;
pub use pagination::*;
