use std::process::ExitCode;

use clap::Parser;

use voipbill_audit::PassKind;
use voipbill_cli::CommonArgs;

/// Invoice prepared VoIP orders of customers above the minimal amount.
#[derive(Parser)]
#[command(name = "voip-postpaid-invoices", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    voipbill_cli::run(PassKind::Invoices, cli.common)
}
