pub mod provider;
pub mod local;

pub use provider::*;
pub use local::*;
