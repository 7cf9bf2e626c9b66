mod base;
mod connection;
mod connector;
mod mapping;
mod syncd;

pub use base::*;
pub use connection::*;
pub use connector::*;
pub use mapping::*;
pub use syncd::*;
