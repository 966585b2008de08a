use std::process::ExitCode;

use clap::Parser;

use voipbill_audit::PassKind;
use voipbill_cli::CommonArgs;

/// Mail call listings to prepaid VoIP customers.
#[derive(Parser)]
#[command(name = "voip-prepaid-calls", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    voipbill_cli::run(PassKind::Prepaid, cli.common)
}
