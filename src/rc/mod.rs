//! External Query Executor
//!
//! Everything the engine knows about C/C++ comes from running the RTags `rc`
//! client. This module owns the argument vocabulary ([`RcCommand`]), the
//! execution seam ([`RcExecutor`]) and the rdm connection check.

pub mod command;
pub mod daemon;
pub mod executor;

#[cfg(test)]
pub mod testing;

pub use command::{RcCommand, UnsavedFile, parse_is_indexing, parse_project_list};
pub use daemon::DaemonSupervisor;
pub use executor::{ProcessRcExecutor, RcExecutor, query, try_query};
