pub mod service;
pub mod transcribe;

pub use service::{start, status};
pub use transcribe::transcribe;
