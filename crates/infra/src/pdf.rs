//! HTML to PDF through an external command (HTML on stdin, PDF on stdout).

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

use crate::error::{InfraError, InfraResult};
use crate::ports::PdfRenderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPdfRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandPdfRenderer {
    /// Whitespace separated command line, e.g. `wkhtmltopdf --quiet - -`.
    pub fn new(command_line: &str) -> InfraResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| InfraError::Config("PDF_COMMAND is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl PdfRenderer for CommandPdfRenderer {
    fn render(&self, html: &str) -> InfraResult<Vec<u8>> {
        debug!(program = %self.program, bytes = html.len(), "rendering pdf");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InfraError::Pdf(format!("{}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| InfraError::Pdf("renderer stdin unavailable".to_string()))?;
        let input = html.as_bytes().to_vec();
        // Feed stdin from a separate thread so a large stdout cannot deadlock us.
        let writer = thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| InfraError::Pdf(e.to_string()))?;
        writer
            .join()
            .map_err(|_| InfraError::Pdf("renderer stdin writer panicked".to_string()))?
            .map_err(|e| InfraError::Pdf(format!("writing html: {e}")))?;

        if !output.status.success() {
            return Err(InfraError::Pdf(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(InfraError::Pdf(format!("{} produced no output", self.program)));
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_line() {
        let renderer = CommandPdfRenderer::new("wkhtmltopdf --quiet - -").unwrap();
        assert_eq!(renderer.program, "wkhtmltopdf");
        assert_eq!(renderer.args, vec!["--quiet", "-", "-"]);
    }

    #[test]
    fn empty_command_is_a_config_error() {
        assert!(matches!(CommandPdfRenderer::new("   "), Err(InfraError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn pipes_html_through_the_command() {
        let renderer = CommandPdfRenderer::new("cat").unwrap();
        let out = renderer.render("<html>calls</html>").unwrap();
        assert_eq!(out, b"<html>calls</html>");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_a_pdf_error() {
        let renderer = CommandPdfRenderer::new("false").unwrap();
        assert!(matches!(renderer.render("<html/>"), Err(InfraError::Pdf(_))));
    }

    #[test]
    fn missing_program_is_a_pdf_error() {
        let renderer = CommandPdfRenderer::new("voipbill-no-such-renderer").unwrap();
        assert!(matches!(renderer.render("<html/>"), Err(InfraError::Pdf(_))));
    }
}
