//! CLI command implementations
//!
//! Each command resolves its device backend through [`crate::backends`]
//! and drives the orchestrator from `rblisp-core`.

mod info;
mod list;
mod write;

pub use info::run_info;
pub use list::{list_chips, list_ports};
pub use write::run_write;
