//! Streamed diagnostics from rdm

pub mod framing;
pub mod parse;
pub mod stream;

#[cfg(test)]
pub mod testing;

pub use stream::{DiagnosticsLauncher, DiagnosticsStreamProcessor, RcDiagnosticsLauncher};
