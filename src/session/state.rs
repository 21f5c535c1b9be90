//! The query session: one engine behind one re-entrant lock.

use std::cell::{Cell, RefCell};

use parking_lot::ReentrantMutex;

use crate::command::{parse_command, resolve_in, CommandTables};
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineContext, Transport, UdpTransport};
use crate::session::capture::CaptureBuffer;
use crate::session::{LastError, QueryError};

/// Everything guarded by the session lock.
///
/// Interior mutability lets a handler running under the lock re-acquire it
/// for status checks without aliasing the engine.
struct SessionSlot {
    ready: Cell<bool>,
    last_error: RefCell<LastError>,
    capture: RefCell<Option<CaptureBuffer>>,
    engine: RefCell<Engine>,
    tables: CommandTables,
}

impl SessionSlot {
    fn record(&self, err: &QueryError) {
        tracing::debug!(kind = err.kind(), %err, "Session operation failed");
        *self.last_error.borrow_mut() = LastError::from_error(err);
    }

    fn open(&self, capacity: usize) -> Result<(), QueryError> {
        if self.ready.get() {
            return Err(QueryError::AlreadyOpen);
        }
        let mut capture = self.capture.try_borrow_mut().map_err(|_| QueryError::Busy)?;
        let mut engine = self.engine.try_borrow_mut().map_err(|_| QueryError::Busy)?;

        let buffer = CaptureBuffer::allocate(capacity)?;
        engine.reset();
        *capture = Some(buffer);
        self.ready.set(true);
        Ok(())
    }

    fn close(&self) -> Result<(), QueryError> {
        if !self.ready.get() {
            return Ok(());
        }
        let mut capture = self.capture.try_borrow_mut().map_err(|_| QueryError::Busy)?;
        let mut engine = self.engine.try_borrow_mut().map_err(|_| QueryError::Busy)?;

        *capture = None;
        engine.reset();
        self.ready.set(false);
        Ok(())
    }
}

/// Serialized access to the query engine with captured output.
///
/// Every operation takes the same re-entrant lock, so calls from different
/// threads observe a total order. A command handler may call
/// [`is_ready`](Self::is_ready) or [`last_error`](Self::last_error) on the
/// session that is running it; calling `create`, `destroy` or `execute`
/// from inside a handler fails with [`QueryError::Busy`].
pub struct QuerySession {
    slot: ReentrantMutex<SessionSlot>,
}

impl QuerySession {
    /// A closed session talking UDP.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_transport(config, Box::new(UdpTransport::new()))
    }

    pub fn with_transport(config: EngineConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            slot: ReentrantMutex::new(SessionSlot {
                ready: Cell::new(false),
                last_error: RefCell::new(LastError::default()),
                capture: RefCell::new(None),
                engine: RefCell::new(Engine::new(config, transport)),
                tables: CommandTables::default(),
            }),
        }
    }

    /// Resolve commands against `tables` instead of the built-in ones.
    pub fn with_tables(mut self, tables: CommandTables) -> Self {
        self.slot.get_mut().tables = tables;
        self
    }

    /// Replace the engine defaults that create and destroy restore.
    pub fn configure(&self, config: EngineConfig) -> Result<(), QueryError> {
        let slot = self.slot.lock();
        let result = slot
            .engine
            .try_borrow_mut()
            .map(|mut engine| engine.set_defaults(config))
            .map_err(|_| QueryError::Busy);
        if let Err(err) = &result {
            slot.record(err);
        }
        result
    }

    /// Open the session with a capture buffer of `capacity` bytes.
    ///
    /// Fails with [`QueryError::AlreadyOpen`] without touching anything if a
    /// session is already open.
    pub fn create(&self, capacity: usize) -> Result<(), QueryError> {
        let slot = self.slot.lock();
        match slot.open(capacity) {
            Ok(()) => {
                tracing::info!(capacity, "Query session opened");
                Ok(())
            }
            Err(err) => {
                slot.record(&err);
                Err(err)
            }
        }
    }

    /// Close the session. Does nothing if it is not open.
    pub fn destroy(&self) {
        let slot = self.slot.lock();
        let was_open = slot.ready.get();
        match slot.close() {
            Ok(()) if was_open => tracing::info!("Query session closed"),
            Ok(()) => {}
            Err(err) => {
                tracing::warn!(%err, "Query session not closed");
                slot.record(&err);
            }
        }
    }

    /// Run one command line and copy its output into `out`.
    ///
    /// `out` is zeroed first and always ends in a NUL byte afterwards, so at
    /// most `out.len() - 1` bytes of output survive. Longer output is cut
    /// silently. Output captured before a handler failure is still copied.
    pub fn execute(&self, argv: &[&str], out: &mut [u8]) -> Result<(), QueryError> {
        let slot = self.slot.lock();
        let mut out = scopeguard::guard(out, |out| {
            if let Some(last) = out.last_mut() {
                *last = 0;
            }
        });
        out.fill(0);

        let result = self.run(&slot, argv, &mut **out);
        if let Err(err) = &result {
            slot.record(err);
        }
        result
    }

    fn run(&self, slot: &SessionSlot, argv: &[&str], out: &mut [u8]) -> Result<(), QueryError> {
        if !self.is_ready() {
            return Err(QueryError::NotOpen);
        }
        let Some((&keyword, args)) = argv.split_first() else {
            return Err(QueryError::MissingArguments);
        };

        let mut capture = slot.capture.try_borrow_mut().map_err(|_| QueryError::Busy)?;
        let capture = capture.as_mut().ok_or(QueryError::NotOpen)?;
        capture.clear();

        let descriptor =
            resolve_in(&slot.tables, keyword).ok_or_else(|| QueryError::UnknownCommand {
                keyword: keyword.to_string(),
            })?;

        let mut engine = slot.engine.try_borrow_mut().map_err(|_| QueryError::Busy)?;
        let outcome = {
            let (mut sink, scratch) = capture.split();
            let mut ctx = EngineContext {
                engine: &mut *engine,
                out: &mut sink,
                scratch,
                tables: slot.tables,
            };
            parse_command(descriptor, keyword, args, &mut ctx).and_then(|parsed| {
                tracing::debug!(
                    command = descriptor.keyword,
                    args = parsed.arg_count(),
                    "Running command"
                );
                (descriptor.handler)(&parsed, &mut ctx).map_err(|source| {
                    tracing::warn!(command = descriptor.keyword, %source, "Command failed");
                    QueryError::EngineFailure {
                        keyword: descriptor.keyword.to_string(),
                        source,
                    }
                })
            })
        };

        let captured = capture.captured();
        let copied = captured.len().min(out.len());
        out[..copied].copy_from_slice(&captured[..copied]);
        if capture.dropped() > 0 || copied < captured.len() {
            tracing::warn!(
                captured = captured.len(),
                dropped = capture.dropped(),
                copied,
                "Command output truncated"
            );
        }

        outcome
    }

    /// Whether the session is open and its capture sink is in place.
    pub fn is_ready(&self) -> bool {
        let slot = self.slot.lock();
        // A sink borrowed by a running command is in place by definition.
        slot.ready.get()
            && slot
                .capture
                .try_borrow()
                .map_or(true, |capture| capture.is_some())
    }

    /// The most recent failure. Never cleared by a success.
    pub fn last_error(&self) -> LastError {
        self.slot.lock().last_error.borrow().clone()
    }

    pub fn last_error_code(&self) -> i32 {
        self.slot.lock().last_error.borrow().code
    }

    pub fn last_error_text(&self) -> String {
        self.slot.lock().last_error.borrow().text.clone()
    }
}

impl Default for QuerySession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_closed() {
        let session = QuerySession::default();
        assert!(!session.is_ready());
        assert_eq!(session.last_error(), LastError::default());
    }

    #[test]
    fn execute_requires_open_session() {
        let session = QuerySession::default();
        let mut out = [0xaau8; 8];
        let err = session.execute(&["help"], &mut out).unwrap_err();
        assert!(matches!(err, QueryError::NotOpen));
        assert_eq!(out, [0u8; 8]);
        assert_eq!(session.last_error_text(), "ntpq: session not open");
    }

    #[test]
    fn empty_argv_is_missing_arguments() {
        let session = QuerySession::default();
        session.create(256).unwrap();
        let mut out = [0u8; 8];
        let err = session.execute(&[], &mut out).unwrap_err();
        assert!(matches!(err, QueryError::MissingArguments));
    }

    #[test]
    fn destroy_is_idempotent() {
        let session = QuerySession::default();
        session.destroy();
        session.create(64).unwrap();
        session.destroy();
        session.destroy();
        assert!(!session.is_ready());
    }

    #[test]
    fn success_keeps_previous_error() {
        let session = QuerySession::default();
        session.create(512).unwrap();
        let mut out = [0u8; 64];
        assert!(session.execute(&["nonesuch"], &mut out).is_err());
        session.execute(&["version"], &mut out).unwrap();
        assert!(session.last_error_text().contains("nonesuch"));
    }

    #[test]
    fn zero_length_output_is_accepted() {
        let session = QuerySession::default();
        session.create(64).unwrap();
        session.execute(&["version"], &mut []).unwrap();
    }

    #[test]
    fn configure_changes_what_reset_restores() {
        let session = QuerySession::default();
        session
            .configure(EngineConfig {
                timeout_ms: 750,
                ..EngineConfig::default()
            })
            .unwrap();
        session.create(256).unwrap();
        let mut out = [0u8; 64];
        session.execute(&["timeout"], &mut out).unwrap();
        assert!(out.starts_with(b"primary timeout 750 ms\n"));
    }
}
