//! Argument coercer: raw strings to typed values per descriptor.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::command::registry::{ArgType, CommandDescriptor, MAXARGS};
use crate::engine::AddressFamily;
use crate::session::QueryError;

/// A coerced argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue<'a> {
    /// Borrowed from the caller's argv.
    Text(&'a str),
    NetworkAddress(SocketAddr),
    /// Plain value, or the association ID an `&N` index selected.
    Unsigned(u64),
    Signed(i64),
    IpVersion(IpVersion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn family(self) -> AddressFamily {
        match self {
            IpVersion::V4 => AddressFamily::V4,
            IpVersion::V6 => AddressFamily::V6,
        }
    }
}

/// One command invocation, built fresh per execute and dropped after the
/// handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub keyword: &'a str,
    args: Vec<ArgValue<'a>>,
}

impl<'a> ParsedCommand<'a> {
    pub fn new(keyword: &'a str) -> Self {
        Self {
            keyword,
            args: Vec::with_capacity(MAXARGS),
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn args(&self) -> &[ArgValue<'a>] {
        &self.args
    }

    pub fn text(&self, index: usize) -> Option<&'a str> {
        match self.args.get(index) {
            Some(ArgValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn unsigned(&self, index: usize) -> Option<u64> {
        match self.args.get(index) {
            Some(ArgValue::Unsigned(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn signed(&self, index: usize) -> Option<i64> {
        match self.args.get(index) {
            Some(ArgValue::Signed(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn ip_version(&self, index: usize) -> Option<IpVersion> {
        match self.args.get(index) {
            Some(ArgValue::IpVersion(version)) => Some(*version),
            _ => None,
        }
    }

    /// Text arguments from `start` on, in order.
    pub fn texts_from(&self, start: usize) -> Vec<&'a str> {
        self.args
            .iter()
            .skip(start)
            .filter_map(|arg| match arg {
                ArgValue::Text(text) => Some(*text),
                _ => None,
            })
            .collect()
    }
}

/// Engine state the coercer may consult, and refresh, while parsing.
pub trait CoercionContext {
    /// Preferred family when resolving host names.
    fn address_family(&self) -> AddressFamily;

    /// Port paired with resolved addresses.
    fn port(&self) -> u16;

    /// Number of cached associations.
    fn association_count(&self) -> usize;

    /// Association ID at a zero-based cache position.
    fn association_id(&self, position: usize) -> Option<u16>;

    /// Repopulate the association cache from the server. Failures leave the
    /// cache empty; they are reported by the caller as an unknown index.
    fn refresh_associations(&mut self);
}

/// Coerce one raw argument.
///
/// `&N` indices may trigger a server round trip when the association cache
/// is empty, so coercion is not side-effect free.
pub fn coerce<'a>(
    raw: &'a str,
    ty: ArgType,
    ctx: &mut dyn CoercionContext,
) -> Result<ArgValue<'a>, QueryError> {
    match ty {
        ArgType::Text => Ok(ArgValue::Text(raw)),
        ArgType::NetworkAddress => resolve_address(raw, ctx).map(ArgValue::NetworkAddress),
        ArgType::UnsignedInt => match raw.strip_prefix('&') {
            Some(index) => association_index(raw, index, ctx).map(ArgValue::Unsigned),
            None => raw
                .parse::<u64>()
                .map(ArgValue::Unsigned)
                .map_err(|_| QueryError::InvalidUnsignedValue {
                    value: raw.to_string(),
                }),
        },
        ArgType::SignedInt => raw
            .parse::<i64>()
            .map(ArgValue::Signed)
            .map_err(|_| QueryError::InvalidSignedValue {
                value: raw.to_string(),
            }),
        ArgType::IpVersionFlag => match raw {
            "-4" => Ok(ArgValue::IpVersion(IpVersion::V4)),
            "-6" => Ok(ArgValue::IpVersion(IpVersion::V6)),
            _ => Err(QueryError::InvalidIpVersion {
                value: raw.to_string(),
            }),
        },
    }
}

/// Build a [`ParsedCommand`] from the arguments that follow the keyword.
///
/// Arguments are coerced in position order and the first failure aborts the
/// whole command. Running out of arguments is fine at an optional position
/// and an error at a required one. Arguments beyond the declared positions
/// are ignored.
pub fn parse_command<'a>(
    descriptor: &CommandDescriptor,
    keyword: &'a str,
    raw_args: &[&'a str],
    ctx: &mut dyn CoercionContext,
) -> Result<ParsedCommand<'a>, QueryError> {
    let mut parsed = ParsedCommand::new(keyword);

    for (position, slot) in descriptor.args.iter().enumerate().take(MAXARGS) {
        let Some(&raw) = raw_args.get(position) else {
            if slot.is_required() {
                return Err(QueryError::TooFewArguments {
                    keyword: keyword.to_string(),
                });
            }
            break;
        };

        let value = coerce(raw, slot.arg_type(), ctx)?;
        tracing::trace!(position, raw, ?value, "Argument coerced");
        parsed.args.push(value);
    }

    Ok(parsed)
}

fn resolve_address(raw: &str, ctx: &dyn CoercionContext) -> Result<SocketAddr, QueryError> {
    let invalid = || QueryError::InvalidAddress {
        value: raw.to_string(),
    };

    if let Ok(ip) = raw.parse::<IpAddr>() {
        return ctx
            .address_family()
            .admits(&ip)
            .then(|| SocketAddr::new(ip, ctx.port()))
            .ok_or_else(invalid);
    }

    let family = ctx.address_family();
    (raw, ctx.port())
        .to_socket_addrs()
        .map_err(|_| invalid())?
        .find(|addr| family.admits(&addr.ip()))
        .ok_or_else(invalid)
}

fn association_index(
    raw: &str,
    index: &str,
    ctx: &mut dyn CoercionContext,
) -> Result<u64, QueryError> {
    let unknown = |reason: &'static str| QueryError::UnknownAssociation {
        index: raw.to_string(),
        reason,
    };

    let index: usize = index
        .parse()
        .map_err(|_| unknown("association index invalid/undecodable"))?;

    if ctx.association_count() == 0 {
        ctx.refresh_associations();
        if ctx.association_count() == 0 {
            return Err(unknown("no associations found"));
        }
    }

    if index == 0 {
        return Err(unknown("association index out of range"));
    }

    let position = index.min(ctx.association_count()) - 1;
    ctx.association_id(position)
        .map(u64::from)
        .ok_or_else(|| unknown("association index out of range"))
}
