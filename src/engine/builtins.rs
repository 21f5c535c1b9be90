//! Core commands: help and the print-or-set engine settings.

use std::time::Duration;

use crate::command::{resolve_in, IpVersion, ParsedCommand};
use crate::config::{MAX_VERSION, MIN_VERSION};
use crate::engine::{AddressFamily, EngineContext, EngineError};

const HELP_COLUMNS: usize = 4;
const HELP_WIDTH: usize = 16;

pub fn help(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    let Some(topic) = cmd.text(0) else {
        writeln!(ctx.out, "ntpq commands:")?;
        let keywords: Vec<_> = ctx.tables.iter().map(|d| d.keyword).collect();
        for row in keywords.chunks(HELP_COLUMNS) {
            let line: String = row
                .iter()
                .map(|keyword| format!("{:<width$}", keyword, width = HELP_WIDTH))
                .collect();
            writeln!(ctx.out, "{}", line.trim_end())?;
        }
        return Ok(());
    };

    match resolve_in(&ctx.tables, topic) {
        Some(descriptor) => {
            writeln!(ctx.out, "function: {}", descriptor.comment)?;
            writeln!(ctx.out, "usage: {} {}", descriptor.keyword, descriptor.usage)?;
        }
        None => writeln!(ctx.out, "Command `{}' is unknown", topic)?,
    }
    Ok(())
}

pub fn timeout(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    match cmd.unsigned(0) {
        Some(ms) => ctx.engine.globals_mut().timeout = Duration::from_millis(ms),
        None => writeln!(
            ctx.out,
            "primary timeout {} ms",
            ctx.engine.globals().timeout.as_millis()
        )?,
    }
    Ok(())
}

pub fn delay(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    match cmd.signed(0) {
        Some(ms) => ctx.engine.globals_mut().delay_ms = ms,
        None => writeln!(ctx.out, "delay {} ms", ctx.engine.globals().delay_ms)?,
    }
    Ok(())
}

pub fn host(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    let mut rest = cmd.texts_from(0).into_iter();
    let mut next = rest.next();

    let mut family = AddressFamily::Any;
    if let Some(flag) = next {
        let version = match flag {
            "-4" => Some(IpVersion::V4),
            "-6" => Some(IpVersion::V6),
            _ => None,
        };
        if let Some(version) = version {
            family = version.family();
            next = rest.next();
            if next.is_none() {
                return Err(EngineError::BadArgument(format!(
                    "no host name after {}",
                    flag
                )));
            }
        }
    }

    match next {
        Some(name) => {
            ctx.engine.open_host(name, family)?;
            writeln!(ctx.out, "current host set to {}", name)?;
        }
        None => match &ctx.engine.globals().host {
            Some(current) => writeln!(ctx.out, "current host is {}", current.name)?,
            None => writeln!(ctx.out, "no current host")?,
        },
    }
    Ok(())
}

fn yes_no(value: &str) -> Result<bool, EngineError> {
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(EngineError::BadArgument(format!(
            "expected yes or no, got `{}'",
            other
        ))),
    }
}

pub fn hostnames(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    if let Some(value) = cmd.text(0) {
        ctx.engine.globals_mut().show_hostnames = yes_no(value)?;
    }
    if ctx.engine.globals().show_hostnames {
        writeln!(ctx.out, "hostnames being shown")?;
    } else {
        writeln!(ctx.out, "hostnames not being shown")?;
    }
    Ok(())
}

pub fn raw(_cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    ctx.engine.globals_mut().raw = true;
    writeln!(ctx.out, "Output set to raw")?;
    Ok(())
}

pub fn cooked(_cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    ctx.engine.globals_mut().raw = false;
    writeln!(ctx.out, "Output set to cooked")?;
    Ok(())
}

pub fn authenticate(
    cmd: &ParsedCommand<'_>,
    ctx: &mut EngineContext<'_>,
) -> Result<(), EngineError> {
    if let Some(value) = cmd.text(0) {
        ctx.engine.globals_mut().always_auth = yes_no(value)?;
    }
    if ctx.engine.globals().always_auth {
        writeln!(ctx.out, "authentication requested, requests are sent unsigned")?;
    } else {
        writeln!(ctx.out, "unauthenticated requests being sent")?;
    }
    Ok(())
}

pub fn ntpversion(
    cmd: &ParsedCommand<'_>,
    ctx: &mut EngineContext<'_>,
) -> Result<(), EngineError> {
    if let Some(requested) = cmd.unsigned(0) {
        let version = u8::try_from(requested)
            .ok()
            .filter(|v| (MIN_VERSION..=MAX_VERSION).contains(v))
            .ok_or_else(|| {
                EngineError::BadArgument(format!(
                    "versions {} to {} are all we know",
                    MIN_VERSION, MAX_VERSION
                ))
            })?;
        ctx.engine.globals_mut().version = version;
    }
    writeln!(
        ctx.out,
        "NTP version being claimed is {}",
        ctx.engine.globals().version
    )?;
    Ok(())
}

pub fn keyid(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    if let Some(requested) = cmd.unsigned(0) {
        let key = u32::try_from(requested)
            .map_err(|_| EngineError::BadArgument(format!("key id {} too large", requested)))?;
        ctx.engine.globals_mut().key_id = (key != 0).then_some(key);
    }
    match ctx.engine.globals().key_id {
        Some(key) => writeln!(ctx.out, "keyid is {}", key)?,
        None => writeln!(ctx.out, "keyid is unspecified")?,
    }
    Ok(())
}

pub fn version(_cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    writeln!(
        ctx.out,
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )?;
    Ok(())
}
