use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use tracing::info;

/// Destination meaning "standard output".
pub const STDOUT: &str = "-";

pub fn render(report: &Value, pretty: bool) -> anyhow::Result<String> {
    let mut text = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    text.push('\n');
    Ok(text)
}

/// Write the report to `destination` (a path, or `-` for stdout).
pub fn write_report(destination: &Path, report: &Value, pretty: bool) -> anyhow::Result<()> {
    let text = render(report, pretty)?;

    if destination == Path::new(STDOUT) {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes()).context("cannot write report to stdout")?;
        stdout.flush()?;
        return Ok(());
    }

    fs::write(destination, text)
        .with_context(|| format!("cannot write report to {}", destination.display()))?;
    info!(path = %destination.display(), "report saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_unless_pretty() {
        let report = json!({"ACME": {"outcome": "created"}});
        assert_eq!(render(&report, false).unwrap(), "{\"ACME\":{\"outcome\":\"created\"}}\n");
        assert!(render(&report, true).unwrap().contains("\n  \"ACME\""));
    }

    #[test]
    fn writes_to_a_file() {
        let path = std::env::temp_dir().join(format!("voipbill-report-{}.json", std::process::id()));
        write_report(&path, &json!({"status": "success"}), false).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["status"], "success");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn unwritable_destination_is_an_error() {
        let path = Path::new("/nonexistent-voipbill-dir/report.json");
        assert!(write_report(path, &json!({}), false).is_err());
    }
}
