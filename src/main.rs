use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use ntpq_embed::config::Config;
use ntpq_embed::logging::init_tracing;
use ntpq_embed::session::{self, QuerySession};
use ntpq_embed::shell::{run_shell_command, ShellOutcome};

#[derive(Debug, Parser)]
#[command(name = "ntpq-embed", version, about = "Query NTP servers through an in-process session")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Capture buffer size in bytes
    #[arg(long, value_name = "N")]
    capacity: Option<usize>,

    /// Per-command output buffer size in bytes
    #[arg(long, value_name = "N")]
    output_size: Option<usize>,

    /// Command to run; may be repeated. Without any, commands are read from stdin
    #[arg(short = 'c', long = "command", value_name = "CMD")]
    commands: Vec<String>,

    /// Server to query
    host: Option<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(capacity) = cli.capacity {
        config.session.capacity = capacity;
    }
    if let Some(output_size) = cli.output_size {
        config.session.output_size = output_size;
    }
    if let Some(host) = &cli.host {
        config.engine.host = host.clone();
    }
    config.validate()?;
    Ok(config)
}

fn emit(outcome: &ShellOutcome) -> io::Result<()> {
    if outcome.status == 0 {
        let mut stdout = io::stdout().lock();
        stdout.write_all(outcome.output.as_bytes())?;
        stdout.flush()
    } else {
        io::stderr().write_all(outcome.output.as_bytes())
    }
}

fn run_line(
    session: &QuerySession,
    line: &str,
    config: &Config,
) -> io::Result<ShellOutcome> {
    let argv: Vec<&str> = line.split_whitespace().collect();
    let outcome = run_shell_command(session, &argv, &config.session);
    emit(&outcome)?;
    Ok(outcome)
}

fn interactive(session: &QuerySession, config: &Config) -> anyhow::Result<i32> {
    let stdin = io::stdin();
    let prompt = stdin.is_terminal();
    let mut status = 0;

    let mut lines = stdin.lock().lines();
    loop {
        if prompt {
            print!("ntpq> ");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read command")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "quit" | "exit") {
            break;
        }
        status = run_line(session, trimmed, config)?.status;
    }
    Ok(status)
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli).context("Failed to load configuration")?;

    if session::install(QuerySession::new(config.engine.clone())).is_err() {
        anyhow::bail!("query session already installed");
    }
    let session = session::global();

    let opened = run_shell_command(session, &["open"], &config.session);
    if opened.status != 0 {
        emit(&opened)?;
        std::process::exit(opened.status);
    }

    if let Some(host) = &cli.host {
        let selected = run_shell_command(session, &["host", host.as_str()], &config.session);
        emit(&selected)?;
        if selected.status != 0 {
            session.destroy();
            std::process::exit(selected.status);
        }
    }

    let mut status = 0;
    if cli.commands.is_empty() {
        status = interactive(session, &config)?;
    } else {
        for command in &cli.commands {
            let outcome = run_line(session, command, &config)?;
            if outcome.status != 0 {
                status = outcome.status;
            }
        }
    }

    session.destroy();
    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}
