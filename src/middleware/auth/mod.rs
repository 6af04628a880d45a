pub mod diagnostics;
pub mod gate;

pub use gate::{AuthGate, GateError};
