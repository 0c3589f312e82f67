pub mod esp;
pub mod webhook;

pub use esp::*;
pub use webhook::*;
