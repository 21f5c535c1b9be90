//! Shell-style front end: `open`, `close`, or a query command line.

use crate::config::SessionConfig;
use crate::session::QuerySession;

/// Result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutcome {
    /// Process-style exit status, 0 on success.
    pub status: i32,
    /// Text to show the user, newline-terminated when non-empty.
    pub output: String,
}

impl ShellOutcome {
    fn success(output: impl Into<String>) -> Self {
        Self {
            status: 0,
            output: with_newline(output.into()),
        }
    }

    fn failure(output: impl Into<String>) -> Self {
        Self {
            status: 1,
            output: with_newline(output.into()),
        }
    }
}

fn with_newline(mut text: String) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Run one shell command line against `session`.
pub fn run_shell_command(
    session: &QuerySession,
    argv: &[&str],
    config: &SessionConfig,
) -> ShellOutcome {
    match argv.first().copied() {
        None => ShellOutcome::failure("error: no host and commands"),
        Some("open") => match session.create(config.capacity) {
            Ok(()) => ShellOutcome::success("ntpq: open"),
            Err(_) => ShellOutcome::failure(session.last_error_text()),
        },
        Some("close") => {
            session.destroy();
            ShellOutcome::success("ntpq: closed")
        }
        Some(_) => {
            let mut out = vec![0u8; config.output_size];
            match session.execute(argv, &mut out) {
                Ok(()) => ShellOutcome::success(captured_text(&out)),
                Err(_) => ShellOutcome::failure(session.last_error_text()),
            }
        }
    }
}

/// Text up to the first NUL.
fn captured_text(out: &[u8]) -> String {
    let end = out.iter().position(|&b| b == 0).unwrap_or(out.len());
    String::from_utf8_lossy(&out[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_text_stops_at_nul() {
        assert_eq!(captured_text(b"abc\0def"), "abc");
        assert_eq!(captured_text(b"abc"), "abc");
        assert_eq!(captured_text(b""), "");
    }

    #[test]
    fn newline_is_added_once() {
        assert_eq!(ShellOutcome::success("x").output, "x\n");
        assert_eq!(ShellOutcome::success("x\n").output, "x\n");
        assert_eq!(ShellOutcome::success("").output, "");
    }
}
