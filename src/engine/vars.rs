//! Variable lists and status words from control responses.

use std::fmt::Write as _;

/// Split a `name=value, name="quoted, value", flag` list.
///
/// Quoted values keep their quotes; names without `=` get an empty value.
pub fn parse_varlist(text: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    let mut rest = text;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        let name_end = rest.find(['=', ',']).unwrap_or(rest.len());
        let name = rest[..name_end].trim().to_string();
        rest = &rest[name_end..];

        let value = match rest.strip_prefix('=') {
            Some(after) => {
                let after = after.trim_start();
                let value_end = if let Some(quoted) = after.strip_prefix('"') {
                    quoted.find('"').map(|i| i + 2).unwrap_or(after.len())
                } else {
                    after.find(',').unwrap_or(after.len())
                };
                rest = &after[value_end..];
                after[..value_end].trim().to_string()
            }
            None => String::new(),
        };

        if !name.is_empty() {
            vars.push((name, value));
        }
    }

    vars
}

/// Look up a variable, returning its value without surrounding quotes.
pub fn lookup<'a>(vars: &'a [(String, String)], name: &str) -> Option<&'a str> {
    vars.iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.trim_matches('"'))
}

/// Render `name=value` pairs joined by `", "`, wrapped near `width` columns.
pub fn format_varlist(vars: &[(String, String)], width: usize) -> String {
    let mut out = String::new();
    let mut column = 0;

    for (i, (name, value)) in vars.iter().enumerate() {
        let item = if value.is_empty() {
            name.clone()
        } else {
            format!("{}={}", name, value)
        };
        let last = i + 1 == vars.len();
        let separator = if last { "" } else { "," };

        if column > 0 && column + item.len() + separator.len() + 1 > width {
            out.push('\n');
            column = 0;
        } else if column > 0 {
            out.push(' ');
            column += 1;
        }
        out.push_str(&item);
        out.push_str(separator);
        column += item.len() + separator.len();
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}

const LEAP: [&str; 4] = ["leap_none", "leap_add_secs", "leap_del_secs", "leap_alarm"];

const SYNC_SOURCE: [&str; 10] = [
    "sync_unspec",
    "sync_pps",
    "sync_lf_radio",
    "sync_hf_radio",
    "sync_uhf_radio",
    "sync_local",
    "sync_ntp",
    "sync_other",
    "sync_wristwatch",
    "sync_telephone",
];

const SYSTEM_EVENT: [&str; 16] = [
    "unspecified",
    "freq_not_set",
    "freq_set",
    "spike_detect",
    "freq_mode",
    "clock_sync",
    "restart",
    "panic_stop",
    "no_system_peer",
    "leap_armed",
    "leap_disarmed",
    "leap_event",
    "clock_step",
    "kern",
    "TAI",
    "stale_leapsecond_values",
];

/// Peer selection outcome, indexed by the 3-bit select code.
pub const PEER_SELECT: [&str; 8] = [
    "reject",
    "falsetick",
    "excess",
    "outlier",
    "candidate",
    "backup",
    "sys.peer",
    "pps.peer",
];

/// Tally character shown in front of each peer line.
pub const PEER_TALLY: [char; 8] = [' ', 'x', '.', '-', '+', '#', '*', 'o'];

const PEER_EVENT: [&str; 16] = [
    "",
    "mobilize",
    "demobilize",
    "unreachable",
    "reachable",
    "restart",
    "no_reply",
    "rate_exceeded",
    "access_denied",
    "leap_armed",
    "sys_peer",
    "clock_event",
    "bad_auth",
    "popcorn",
    "interleave_mode",
    "interleave_error",
];

const CLOCK_STATUS: [&str; 7] = [
    "clk_unspec",
    "clk_noreply",
    "clk_badformat",
    "clk_fault",
    "clk_badsignal",
    "clk_baddate",
    "clk_badtime",
];

pub const PEER_CONFIG: u16 = 0x8000;
pub const PEER_AUTH_ENABLE: u16 = 0x4000;
pub const PEER_AUTHENTIC: u16 = 0x2000;
pub const PEER_REACH: u16 = 0x1000;
pub const PEER_BROADCAST: u16 = 0x0800;

/// The 3-bit selection code of a peer status word.
pub fn peer_select(status: u16) -> usize {
    usize::from((status >> 8) & 0x07)
}

fn event_count(status: u16) -> u16 {
    (status >> 4) & 0x0f
}

/// Name of the last event recorded in a peer status word.
pub fn peer_event(status: u16) -> &'static str {
    PEER_EVENT[usize::from(status & 0x0f)]
}

/// Number of events recorded in a status word.
pub fn peer_event_count(status: u16) -> u16 {
    event_count(status)
}

fn events_phrase(count: u16) -> String {
    match count {
        0 => "no events".to_string(),
        1 => "1 event".to_string(),
        n => format!("{} events", n),
    }
}

/// Decode a system status word (association 0).
pub fn describe_system_status(status: u16) -> String {
    let leap = LEAP[usize::from(status >> 14)];
    let source = SYNC_SOURCE
        .get(usize::from((status >> 8) & 0x3f))
        .copied()
        .unwrap_or("sync_unknown");
    let event = SYSTEM_EVENT[usize::from(status & 0x0f)];
    format!(
        "{}, {}, {}, {}",
        leap,
        source,
        events_phrase(event_count(status)),
        event
    )
}

/// Decode a peer status word.
pub fn describe_peer_status(status: u16) -> String {
    let mut out = String::new();
    let flags = [
        (PEER_CONFIG, "conf"),
        (PEER_AUTH_ENABLE, "authenb"),
        (PEER_AUTHENTIC, "auth"),
        (PEER_REACH, "reach"),
        (PEER_BROADCAST, "bcast"),
    ];
    for (bit, name) in flags {
        if status & bit != 0 {
            let _ = write!(out, "{}, ", name);
        }
    }
    let _ = write!(
        out,
        "{}, {}",
        PEER_SELECT[peer_select(status)],
        events_phrase(event_count(status))
    );
    let event = peer_event(status);
    if !event.is_empty() {
        let _ = write!(out, ", {}", event);
    }
    out
}

/// Decode a clock status word.
pub fn describe_clock_status(status: u16) -> String {
    let name = |code: u16| {
        CLOCK_STATUS
            .get(usize::from(code))
            .copied()
            .unwrap_or("clk_unknown")
    };
    format!("{}, last event {}", name(status >> 8), name(status & 0xff))
}

/// Seconds since the NTP era 0 epoch for the Unix epoch.
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Whole seconds of an `0xSSSSSSSS.FFFFFFFF` NTP timestamp.
pub fn parse_ntp_seconds(value: &str) -> Option<u64> {
    let hex = value.strip_prefix("0x")?;
    let seconds = hex.split('.').next()?;
    u64::from_str_radix(seconds, 16).ok()
}

/// Compact interval the way peer tables show "when".
pub fn pretty_interval(seconds: u64) -> String {
    if seconds <= 2048 {
        format!("{}", seconds)
    } else if seconds <= 300 * 60 {
        format!("{}m", seconds / 60)
    } else if seconds <= 96 * 3600 {
        format!("{}h", seconds / 3600)
    } else {
        format!("{}d", seconds / 86400)
    }
}
