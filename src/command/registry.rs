//! Command registry: the two ordered descriptor tables.
//!
//! Declaration order is part of the contract: the resolver picks the first
//! entry a keyword prefixes, so `h` is `help` because `help` is declared
//! before `host` and `hostnames`.

use crate::command::coercer::ParsedCommand;
use crate::engine::{builtins, ops, EngineContext, EngineError};

/// Most positional arguments a descriptor may declare.
pub const MAXARGS: usize = 4;

/// How one raw argument is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Passed through untouched.
    Text,
    /// Host name or literal address, resolved on parse.
    NetworkAddress,
    /// Unsigned decimal, or `&N` for the N-th cached association.
    UnsignedInt,
    /// Signed decimal.
    SignedInt,
    /// Exactly `-4` or `-6`.
    IpVersionFlag,
}

/// One positional argument position in a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSlot {
    Required(ArgType),
    Optional(ArgType),
}

impl ArgSlot {
    pub fn arg_type(self) -> ArgType {
        match self {
            ArgSlot::Required(ty) | ArgSlot::Optional(ty) => ty,
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, ArgSlot::Required(_))
    }
}

/// Engine entry point for one command.
pub type Handler = fn(&ParsedCommand<'_>, &mut EngineContext<'_>) -> Result<(), EngineError>;

/// Static metadata for one command.
#[derive(Clone, Copy)]
pub struct CommandDescriptor {
    /// Full command name.
    pub keyword: &'static str,
    /// Positional arguments in order, at most [`MAXARGS`].
    pub args: &'static [ArgSlot],
    pub handler: Handler,
    /// Argument synopsis for `help <command>`.
    pub usage: &'static str,
    /// One-line description for `help <command>`.
    pub comment: &'static str,
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("keyword", &self.keyword)
            .field("args", &self.args)
            .finish()
    }
}

impl CommandDescriptor {
    /// Number of leading arguments that must be supplied.
    pub fn required_args(&self) -> usize {
        self.args.iter().filter(|slot| slot.is_required()).count()
    }
}

/// The pair of tables a session resolves against, core first.
#[derive(Debug, Clone, Copy)]
pub struct CommandTables {
    pub core: &'static [CommandDescriptor],
    pub extended: &'static [CommandDescriptor],
}

impl Default for CommandTables {
    fn default() -> Self {
        Self {
            core: core_commands(),
            extended: extended_commands(),
        }
    }
}

impl CommandTables {
    /// Every descriptor in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &'static CommandDescriptor> {
        self.core.iter().chain(self.extended.iter())
    }
}

use ArgSlot::{Optional, Required};
use ArgType::{IpVersionFlag, SignedInt, Text, UnsignedInt};

const OPT_TEXT: &[ArgSlot] = &[Optional(Text)];
const OPT_UINT: &[ArgSlot] = &[Optional(UnsignedInt)];
const VARLIST: &[ArgSlot] = &[
    Optional(UnsignedInt),
    Optional(Text),
    Optional(Text),
    Optional(Text),
];

static CORE: &[CommandDescriptor] = &[
    CommandDescriptor {
        keyword: "?",
        args: OPT_TEXT,
        handler: builtins::help,
        usage: "[ command ]",
        comment: "tell the use and syntax of commands",
    },
    CommandDescriptor {
        keyword: "help",
        args: OPT_TEXT,
        handler: builtins::help,
        usage: "[ command ]",
        comment: "tell the use and syntax of commands",
    },
    CommandDescriptor {
        keyword: "timeout",
        args: OPT_UINT,
        handler: builtins::timeout,
        usage: "[ msec ]",
        comment: "set the primary receive time out",
    },
    CommandDescriptor {
        keyword: "delay",
        args: &[Optional(SignedInt)],
        handler: builtins::delay,
        usage: "[ msec ]",
        comment: "set the delay added to encryption time stamps",
    },
    CommandDescriptor {
        keyword: "host",
        args: &[Optional(Text), Optional(Text)],
        handler: builtins::host,
        usage: "[ -4|-6 ] [ hostname ]",
        comment: "specify the host whose NTP server we talk to",
    },
    CommandDescriptor {
        keyword: "hostnames",
        args: OPT_TEXT,
        handler: builtins::hostnames,
        usage: "[ yes|no ]",
        comment: "specify whether hostnames or net numbers are printed",
    },
    CommandDescriptor {
        keyword: "raw",
        args: &[],
        handler: builtins::raw,
        usage: "",
        comment: "do raw mode variable output",
    },
    CommandDescriptor {
        keyword: "cooked",
        args: &[],
        handler: builtins::cooked,
        usage: "",
        comment: "do cooked mode variable output",
    },
    CommandDescriptor {
        keyword: "authenticate",
        args: OPT_TEXT,
        handler: builtins::authenticate,
        usage: "[ yes|no ]",
        comment: "always authenticate requests to this server",
    },
    CommandDescriptor {
        keyword: "ntpversion",
        args: OPT_UINT,
        handler: builtins::ntpversion,
        usage: "[ version number ]",
        comment: "set the NTP version number to use for requests",
    },
    CommandDescriptor {
        keyword: "keyid",
        args: OPT_UINT,
        handler: builtins::keyid,
        usage: "[ key# ]",
        comment: "record a keyid for authenticated requests",
    },
    CommandDescriptor {
        keyword: "version",
        args: &[],
        handler: builtins::version,
        usage: "",
        comment: "print version number",
    },
];

static EXTENDED: &[CommandDescriptor] = &[
    CommandDescriptor {
        keyword: "associations",
        args: &[],
        handler: ops::associations,
        usage: "",
        comment: "print list of association ID's and statuses for the server's peers",
    },
    CommandDescriptor {
        keyword: "passociations",
        args: &[],
        handler: ops::passociations,
        usage: "",
        comment: "print list of associations returned by last associations command",
    },
    CommandDescriptor {
        keyword: "lassociations",
        args: &[],
        handler: ops::lassociations,
        usage: "",
        comment: "print list of associations including all client information",
    },
    CommandDescriptor {
        keyword: "lpassociations",
        args: &[],
        handler: ops::lpassociations,
        usage: "",
        comment: "print last obtained list of associations, including client information",
    },
    CommandDescriptor {
        keyword: "readlist",
        args: OPT_UINT,
        handler: ops::readlist,
        usage: "[ assocID ]",
        comment: "read the system or peer variables included in the variable list",
    },
    CommandDescriptor {
        keyword: "rl",
        args: OPT_UINT,
        handler: ops::readlist,
        usage: "[ assocID ]",
        comment: "read the system or peer variables included in the variable list",
    },
    CommandDescriptor {
        keyword: "readvar",
        args: VARLIST,
        handler: ops::readvar,
        usage: "[ assocID ] [ varname1 ] [ varname2 ] [ varname3 ]",
        comment: "read system or peer variables",
    },
    CommandDescriptor {
        keyword: "rv",
        args: VARLIST,
        handler: ops::readvar,
        usage: "[ assocID ] [ varname1 ] [ varname2 ] [ varname3 ]",
        comment: "read system or peer variables",
    },
    CommandDescriptor {
        keyword: "pstatus",
        args: &[Required(UnsignedInt)],
        handler: ops::pstatus,
        usage: "assocID",
        comment: "print status information returned for a peer",
    },
    CommandDescriptor {
        keyword: "clockvar",
        args: VARLIST,
        handler: ops::clockvar,
        usage: "[ assocID ] [ varname1 ] [ varname2 ] [ varname3 ]",
        comment: "read clock variables",
    },
    CommandDescriptor {
        keyword: "cv",
        args: VARLIST,
        handler: ops::clockvar,
        usage: "[ assocID ] [ varname1 ] [ varname2 ] [ varname3 ]",
        comment: "read clock variables",
    },
    CommandDescriptor {
        keyword: "peers",
        args: &[Optional(IpVersionFlag)],
        handler: ops::peers,
        usage: "-4|-6",
        comment: "obtain and print a list of the server's peers [IP version]",
    },
    CommandDescriptor {
        keyword: "lpeers",
        args: &[Optional(IpVersionFlag)],
        handler: ops::lpeers,
        usage: "-4|-6",
        comment: "obtain and print a list of all peers and clients [IP version]",
    },
];

/// Interactive and configuration commands, resolved first.
pub fn core_commands() -> &'static [CommandDescriptor] {
    CORE
}

/// Server query commands, resolved when no core command matches.
pub fn extended_commands() -> &'static [CommandDescriptor] {
    EXTENDED
}
