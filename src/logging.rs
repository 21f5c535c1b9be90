use std::fs::File;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming the log file base path.
pub const LOG_ENV: &str = "NTPQ_EMBED_LOG";

/// Initialize tracing for the binary.
///
/// With `NTPQ_EMBED_LOG` set, logs go to `{path}.{secs}.{pid}` so concurrent
/// runs never share a file. Otherwise they go to stderr and stdout stays
/// reserved for command output. `RUST_LOG` overrides the `warn` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    let Ok(base) = std::env::var(LOG_ENV) else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
        return;
    };

    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let path = format!("{}.{}.{}", base, secs, std::process::id());

    match File::create(&path) {
        Ok(file) => registry
            .with(fmt::layer().with_writer(file).with_ansi(false))
            .init(),
        Err(err) => eprintln!("ntpq-embed: cannot create log file {}: {}", path, err),
    }
}
