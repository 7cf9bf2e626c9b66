mod base;
mod memory;

pub use base::*;
pub use memory::*;
