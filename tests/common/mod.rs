//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_server;

use std::path::PathBuf;
use std::sync::Arc;

use ntpq_embed::config::EngineConfig;
use ntpq_embed::session::QuerySession;
use parking_lot::Mutex;
use tempfile::TempDir;

pub use mock_server::{association_list, CapturedRequest, Reply, ScriptedTransport, ServerLog};

/// Engine defaults pointing at a literal loopback host, so no name lookup
/// happens, with short timeouts.
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        host: "127.0.0.1".to_string(),
        timeout_ms: 20,
        secondary_timeout_ms: 20,
        ..EngineConfig::default()
    }
}

/// A closed session backed by a scripted server.
pub fn scripted_session<F>(responder: F) -> (QuerySession, Arc<Mutex<ServerLog>>)
where
    F: FnMut(&CapturedRequest) -> Reply + Send + 'static,
{
    let (transport, log) = ScriptedTransport::new(Box::new(responder));
    let session = QuerySession::with_transport(test_engine_config(), Box::new(transport));
    (session, log)
}

/// Run `argv` and return the output up to the terminator.
pub fn run(session: &QuerySession, argv: &[&str], size: usize) -> Result<String, String> {
    let mut out = vec![0u8; size];
    match session.execute(argv, &mut out) {
        Ok(()) => Ok(text_of(&out)),
        Err(_) => Err(session.last_error_text()),
    }
}

pub fn text_of(out: &[u8]) -> String {
    let end = out.iter().position(|&b| b == 0).unwrap_or(out.len());
    String::from_utf8_lossy(&out[..end]).into_owned()
}

/// Create a temporary config file with the given contents.
pub fn temp_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    (temp_dir, config_path)
}
