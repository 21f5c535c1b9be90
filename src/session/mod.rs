//! Query session and the process-wide entry points.
//!
//! ```text
//! caller ─► execute(argv, out)
//!             │ lock (re-entrant)
//!             ├─ resolve argv[0]
//!             ├─ coerce argv[1..]
//!             ├─ handler ─► capture sink / scratch
//!             └─ copy capture ─► out, NUL-terminate
//! ```
//!
//! The free functions below operate on one lazily created [`QuerySession`].
//! Embedders that want their own configuration call [`install`] before the
//! first use.

mod capture;
mod error;
mod state;

use std::sync::OnceLock;

pub use capture::{scratch_size, CaptureBuffer, CaptureSink, CAPTURE_ALIGN};
pub use error::{LastError, QueryError, ADAPTER_ERROR, ERROR_PREFIX, MAX_ERROR_TEXT};
pub use state::QuerySession;

static SESSION: OnceLock<QuerySession> = OnceLock::new();

/// Make `session` the process-wide session.
///
/// Gives the session back if one is already installed or in use.
pub fn install(session: QuerySession) -> Result<(), QuerySession> {
    SESSION.set(session)
}

/// The process-wide session, created with default settings on first use.
pub fn global() -> &'static QuerySession {
    SESSION.get_or_init(QuerySession::default)
}

pub fn create(capacity: usize) -> Result<(), QueryError> {
    global().create(capacity)
}

pub fn destroy() {
    global().destroy()
}

pub fn execute(argv: &[&str], out: &mut [u8]) -> Result<(), QueryError> {
    global().execute(argv, out)
}

pub fn last_error_code() -> i32 {
    global().last_error_code()
}

pub fn last_error_text() -> String {
    global().last_error_text()
}

pub fn is_ready() -> bool {
    global().is_ready()
}
