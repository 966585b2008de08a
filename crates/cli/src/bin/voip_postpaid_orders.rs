use std::process::ExitCode;

use clap::Parser;

use voipbill_audit::PassKind;
use voipbill_cli::CommonArgs;

/// Create accounting orders from last month's postpaid VoIP usage.
#[derive(Parser)]
#[command(name = "voip-postpaid-orders", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    voipbill_cli::run(PassKind::Orders, cli.common)
}
