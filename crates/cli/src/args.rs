use std::path::PathBuf;

use clap::Args;

use crate::config::ReportFormat;

/// Options shared by every entry point.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Report destination; `-` for stdout (default: RESULT_FILE)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Environment file to load before reading the process environment
    #[arg(short = 'e', long = "environment")]
    pub environment: Option<PathBuf>,

    /// Months back from the current month (`-1` is last month)
    #[arg(short = 'm', long = "monthOffset", allow_negative_numbers = true)]
    pub month_offset: Option<i32>,

    /// Continue after the most recent existing order
    #[arg(short = 'c', long = "continue")]
    pub continue_mode: bool,

    /// Accepted for compatibility; the period comes from the month offset
    #[arg(short = 'f', long = "dateFrom")]
    pub date_from: Option<String>,

    /// Accepted for compatibility; the period comes from the month offset
    #[arg(short = 't', long = "dateTo")]
    pub date_to: Option<String>,

    /// Report shape (default: REPORT_FORMAT)
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,
}
