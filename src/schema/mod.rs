//! Schema module - Configuration and record types for strategy evolution runs.

mod evolution;
mod result;
mod variant;

pub use evolution::*;
pub use result::*;
pub use variant::*;
