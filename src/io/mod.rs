//! I/O layer - process lifecycle for the RTags binaries
//!
//! Both long-lived children (`rdm` when auto-launched, `rc --diagnostics`) run
//! under [`ChildProcessManager`], which owns the child, drains stderr and reports
//! unexpected exits. One-shot `rc` queries live in [`crate::rc::executor`].

pub mod process;

pub use process::{
    ChildProcessManager, ProcessError, ProcessExitEvent, ProcessExitHandler, ProcessManager,
    StderrMonitor, StopMode,
};
