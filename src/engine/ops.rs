//! Server query commands built on the mode-6 control protocol.

use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::command::ParsedCommand;
use crate::engine::control::{ControlResponse, Opcode};
use crate::engine::vars::{self, PEER_CONFIG, PEER_REACH, PEER_TALLY};
use crate::engine::{AddressFamily, Association, EngineContext, EngineError};

const VARLIST_WIDTH: usize = 72;

const PEER_VARIABLES: &str =
    "srcadr,srchost,refid,stratum,hmode,rec,hpoll,ppoll,reach,delay,offset,jitter";

pub fn associations(
    _cmd: &ParsedCommand<'_>,
    ctx: &mut EngineContext<'_>,
) -> Result<(), EngineError> {
    ctx.refresh_associations()?;
    print_associations(ctx, false)
}

pub fn passociations(
    _cmd: &ParsedCommand<'_>,
    ctx: &mut EngineContext<'_>,
) -> Result<(), EngineError> {
    print_associations(ctx, false)
}

pub fn lassociations(
    _cmd: &ParsedCommand<'_>,
    ctx: &mut EngineContext<'_>,
) -> Result<(), EngineError> {
    ctx.refresh_associations()?;
    print_associations(ctx, true)
}

pub fn lpassociations(
    _cmd: &ParsedCommand<'_>,
    ctx: &mut EngineContext<'_>,
) -> Result<(), EngineError> {
    print_associations(ctx, true)
}

fn is_interesting(association: &Association) -> bool {
    association.status & (PEER_CONFIG | PEER_REACH) != 0
}

fn print_associations(ctx: &mut EngineContext<'_>, show_all: bool) -> Result<(), EngineError> {
    let associations = &ctx.engine.globals().associations;
    if associations.is_empty() {
        writeln!(ctx.out, "No association ID's returned")?;
        return Ok(());
    }

    writeln!(
        ctx.out,
        "ind assid status  conf reach auth condition  last_event cnt"
    )?;
    writeln!(ctx.out, "{}", "=".repeat(59))?;

    for (position, association) in associations.iter().enumerate() {
        if !show_all && !is_interesting(association) {
            continue;
        }
        let status = association.status;
        let flag = |bit: u16| if status & bit != 0 { "yes" } else { "no" };
        let auth = if status & vars::PEER_AUTH_ENABLE == 0 {
            "none"
        } else if status & vars::PEER_AUTHENTIC != 0 {
            "ok"
        } else {
            "bad"
        };
        writeln!(
            ctx.out,
            "{:>3} {:>5}  {:04x}   {:>3}  {:>4}  {:>4} {:>9} {:>11} {:>2}",
            position + 1,
            association.assid,
            status,
            flag(PEER_CONFIG),
            flag(PEER_REACH),
            auth,
            vars::PEER_SELECT[vars::peer_select(status)],
            vars::peer_event(status),
            vars::peer_event_count(status),
        )?;
    }
    Ok(())
}

fn association_arg(cmd: &ParsedCommand<'_>) -> Result<u16, EngineError> {
    match cmd.unsigned(0) {
        Some(value) => u16::try_from(value).map_err(|_| {
            EngineError::BadArgument(format!("association ID {} out of range", value))
        }),
        None => Ok(0),
    }
}

fn requested_names(cmd: &ParsedCommand<'_>) -> String {
    cmd.texts_from(1).join(",")
}

pub fn readlist(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    let assid = association_arg(cmd)?;
    let response = ctx.query(Opcode::ReadVariables, assid, &[])?;
    print_variables(ctx, Opcode::ReadVariables, &response)
}

pub fn readvar(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    let assid = association_arg(cmd)?;
    let names = requested_names(cmd);
    let response = ctx.query(Opcode::ReadVariables, assid, names.as_bytes())?;
    print_variables(ctx, Opcode::ReadVariables, &response)
}

pub fn pstatus(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    let assid = association_arg(cmd)?;
    let response = ctx.query(Opcode::ReadVariables, assid, &[])?;
    print_variables(ctx, Opcode::ReadVariables, &response)
}

pub fn clockvar(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    let assid = association_arg(cmd)?;
    let names = requested_names(cmd);
    let response = ctx.query(Opcode::ReadClock, assid, names.as_bytes())?;
    print_variables(ctx, Opcode::ReadClock, &response)
}

fn print_variables(
    ctx: &mut EngineContext<'_>,
    opcode: Opcode,
    response: &ControlResponse,
) -> Result<(), EngineError> {
    let decoded = match (opcode, response.assid) {
        (Opcode::ReadClock, _) => vars::describe_clock_status(response.status),
        (_, 0) => vars::describe_system_status(response.status),
        _ => vars::describe_peer_status(response.status),
    };
    writeln!(
        ctx.out,
        "associd={} status={:04x} {},",
        response.assid, response.status, decoded
    )?;

    if ctx.engine.globals().raw {
        let text = response.text();
        ctx.out.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            writeln!(ctx.out)?;
        }
    } else {
        let list = vars::parse_varlist(&response.text());
        ctx.out
            .write_all(vars::format_varlist(&list, VARLIST_WIDTH).as_bytes())?;
    }
    Ok(())
}

pub fn peers(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    print_peers(cmd, ctx, false)
}

pub fn lpeers(cmd: &ParsedCommand<'_>, ctx: &mut EngineContext<'_>) -> Result<(), EngineError> {
    print_peers(cmd, ctx, true)
}

fn print_peers(
    cmd: &ParsedCommand<'_>,
    ctx: &mut EngineContext<'_>,
    show_all: bool,
) -> Result<(), EngineError> {
    let family = cmd
        .ip_version(0)
        .map(|v| v.family())
        .unwrap_or(AddressFamily::Any);

    ctx.refresh_associations()?;
    let associations: Vec<Association> = ctx
        .engine
        .globals()
        .associations
        .iter()
        .copied()
        .filter(|a| show_all || is_interesting(a))
        .collect();
    if associations.is_empty() {
        writeln!(ctx.out, "No association ID's returned")?;
        return Ok(());
    }

    writeln!(
        ctx.out,
        "     remote           refid      st t when poll reach   delay   offset  jitter"
    )?;
    writeln!(ctx.out, "{}", "=".repeat(79))?;

    let now = ntp_now();
    for association in associations {
        let response = ctx.query(
            Opcode::ReadVariables,
            association.assid,
            PEER_VARIABLES.as_bytes(),
        )?;
        let list = vars::parse_varlist(&response.text());
        let Some(row) = PeerRow::from_vars(&list, association.status, now) else {
            continue;
        };
        if family != AddressFamily::Any && !row.addr.is_some_and(|ip| family.admits(&ip)) {
            continue;
        }
        let show_hostnames = ctx.engine.globals().show_hostnames;
        writeln!(ctx.out, "{}", row.render(show_hostnames))?;
    }
    Ok(())
}

fn ntp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        + vars::NTP_UNIX_OFFSET
}

/// One line of the peers table.
struct PeerRow {
    tally: char,
    remote: String,
    host_name: Option<String>,
    addr: Option<IpAddr>,
    refid: String,
    stratum: String,
    kind: char,
    when: String,
    poll: String,
    reach: String,
    delay: String,
    offset: String,
    jitter: String,
}

impl PeerRow {
    fn from_vars(list: &[(String, String)], status: u16, now: u64) -> Option<Self> {
        let remote = vars::lookup(list, "srcadr")?.to_string();
        let addr = parse_ip(&remote);
        let host_name = vars::lookup(list, "srchost").map(str::to_string);

        let kind = if remote.starts_with("127.127.") {
            'l'
        } else {
            match vars::lookup(list, "hmode") {
                Some("1") | Some("2") => 's',
                Some("3") => 'u',
                Some("5") => 'b',
                _ => '-',
            }
        };

        let when = vars::lookup(list, "rec")
            .and_then(vars::parse_ntp_seconds)
            .filter(|&rec| rec != 0 && rec <= now)
            .map(|rec| vars::pretty_interval(now - rec))
            .unwrap_or_else(|| "-".to_string());

        let poll_exponent = [vars::lookup(list, "hpoll"), vars::lookup(list, "ppoll")]
            .into_iter()
            .flatten()
            .filter_map(|v| v.parse::<u32>().ok())
            .min();
        let poll = poll_exponent
            .and_then(|e| 1u64.checked_shl(e))
            .map(vars::pretty_interval)
            .unwrap_or_else(|| "-".to_string());

        let text = |name: &str| vars::lookup(list, name).unwrap_or("-").to_string();
        let millis = |name: &str| match vars::lookup(list, name) {
            Some(value) => value
                .parse::<f64>()
                .map(|v| format!("{:.3}", v))
                .unwrap_or_else(|_| value.to_string()),
            None => "-".to_string(),
        };

        Some(Self {
            tally: PEER_TALLY[vars::peer_select(status)],
            remote,
            host_name,
            addr,
            refid: text("refid"),
            stratum: text("stratum"),
            kind,
            when,
            poll,
            reach: text("reach"),
            delay: millis("delay"),
            offset: millis("offset"),
            jitter: millis("jitter"),
        })
    }

    fn render(&self, show_hostnames: bool) -> String {
        let remote = match (&self.host_name, show_hostnames) {
            (Some(name), true) => name.as_str(),
            _ => self.remote.as_str(),
        };
        format!(
            "{}{:<15.15} {:<15.15} {:>2} {} {:>4} {:>4} {:>5} {:>7} {:>8} {:>7}",
            self.tally,
            remote,
            self.refid,
            self.stratum,
            self.kind,
            self.when,
            self.poll,
            self.reach,
            self.delay,
            self.offset,
            self.jitter,
        )
    }
}

/// Address part of `srcadr`, which may carry a port.
fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|s| s.ip()))
}
