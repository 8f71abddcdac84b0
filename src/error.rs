use colored::Colorize;
use thiserror::Error;

/// Error raised during evaluation, carrying the line of the offending token.
/// Unwinds the current top-level `interpret` call.
#[derive(Debug, Clone, Error)]
#[error("[line {line}] ERROR: {message}")]
pub struct RuntimeError {
    pub line: usize,
    pub message: String,
}

impl RuntimeError {
    pub fn new<S: Into<String>>(line: usize, message: S) -> RuntimeError {
        RuntimeError {
            line,
            message: message.into(),
        }
    }
}

/// Diagnostic sink shared by the scanner, parser, resolver and driver.
///
/// Scan/parse/resolve errors accumulate here without aborting their stage;
/// the driver refuses to execute when `had_error` is set and maps the two
/// flags to process exit codes. Reported messages are retained so tests can
/// assert on diagnostics without scraping stderr.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub had_error: bool,
    pub had_runtime_error: bool,
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Default::default()
    }

    pub fn error(&mut self, line: usize, message: &str) {
        self.report(line, "", message);
    }

    pub fn error_at(&mut self, line: usize, lexeme: &str, message: &str) {
        self.report(line, &format!(" at '{}'", lexeme), message);
    }

    pub fn error_at_end(&mut self, line: usize, message: &str) {
        self.report(line, " at end", message);
    }

    /// Warnings print but never set `had_error`.
    pub fn warn_at(&mut self, line: usize, lexeme: &str, message: &str) {
        eprintln!(
            "[line {}] {} at '{}': {}",
            line,
            "WARNING".yellow().bold(),
            lexeme,
            message
        );
        self.messages
            .push(format!("[line {}] WARNING at '{}': {}", line, lexeme, message));
    }

    pub fn runtime_error(&mut self, error: &RuntimeError) {
        eprintln!(
            "[line {}] {}: {}",
            error.line,
            "ERROR".red().bold(),
            error.message
        );
        self.messages.push(error.to_string());
        self.had_runtime_error = true;
    }

    /// Prompt mode clears both flags before each line.
    pub fn reset(&mut self) {
        self.had_error = false;
        self.had_runtime_error = false;
        self.messages.clear();
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    fn report(&mut self, line: usize, location: &str, message: &str) {
        eprintln!(
            "[line {}] {}{}: {}",
            line,
            "ERROR".red().bold(),
            location,
            message
        );
        self.messages
            .push(format!("[line {}] ERROR{}: {}", line, location, message));
        self.had_error = true;
    }
}
