//! Shared plumbing of the `voip-*` batch entry points.

pub mod args;
pub mod config;
pub mod output;
pub mod run;

pub use crate::args::CommonArgs;
pub use crate::config::{AppConfig, ReportFormat};
pub use crate::run::run;
