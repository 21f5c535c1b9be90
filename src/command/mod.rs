//! Command handling for the query session.
//!
//! ```text
//! argv → Resolve keyword → Coerce arguments → ParsedCommand → handler
//! ```
//!
//! The resolver and the tables are pure; coercion may refresh the engine's
//! association cache when an `&N` index is used.

mod coercer;
mod registry;
mod resolver;

pub use coercer::{coerce, parse_command, ArgValue, CoercionContext, IpVersion, ParsedCommand};
pub use registry::{
    core_commands, extended_commands, ArgSlot, ArgType, CommandDescriptor, CommandTables, Handler,
    MAXARGS,
};
pub use resolver::{resolve, resolve_in};
