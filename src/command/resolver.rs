//! Command resolver: keyword to descriptor by ordered prefix match.

use crate::command::registry::{CommandDescriptor, CommandTables};

/// Resolve a keyword against the built-in tables.
pub fn resolve(keyword: &str) -> Option<&'static CommandDescriptor> {
    resolve_in(&CommandTables::default(), keyword)
}

/// Resolve a keyword against explicit tables.
///
/// A descriptor matches when `keyword` is a non-empty prefix of its name.
/// The core table is scanned in declaration order first and the first match
/// wins; the extended table is only consulted when the core table has none.
/// Ambiguous prefixes therefore select the earliest declared name.
pub fn resolve_in(tables: &CommandTables, keyword: &str) -> Option<&'static CommandDescriptor> {
    if keyword.is_empty() {
        return None;
    }

    let found = first_match(tables.core, keyword).or_else(|| first_match(tables.extended, keyword));

    match found {
        Some(descriptor) => tracing::trace!(keyword, resolved = descriptor.keyword, "Command resolved"),
        None => tracing::debug!(keyword, "No command matches keyword"),
    }

    found
}

fn first_match(
    table: &'static [CommandDescriptor],
    keyword: &str,
) -> Option<&'static CommandDescriptor> {
    table.iter().find(|d| d.keyword.starts_with(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::registry::{core_commands, extended_commands};

    fn keyword_of(keyword: &str) -> Option<&'static str> {
        resolve(keyword).map(|d| d.keyword)
    }

    #[test]
    fn exact_names_resolve_to_themselves() {
        for descriptor in core_commands() {
            let resolved = resolve(descriptor.keyword).unwrap();
            assert_eq!(resolved.keyword, descriptor.keyword);
        }
    }

    #[test]
    fn ambiguous_prefix_takes_first_declared() {
        assert_eq!(keyword_of("h"), Some("help"));
        assert_eq!(keyword_of("ho"), Some("host"));
        assert_eq!(keyword_of("hostn"), Some("hostnames"));
    }

    #[test]
    fn core_table_shadows_extended_table() {
        // "r" prefixes both "raw" (core) and "readlist" (extended).
        assert_eq!(keyword_of("r"), Some("raw"));
        assert_eq!(keyword_of("re"), Some("readlist"));
    }

    #[test]
    fn extended_table_is_consulted_second() {
        assert_eq!(keyword_of("as"), Some("associations"));
        assert_eq!(keyword_of("rv"), Some("rv"));
        assert_eq!(keyword_of("pe"), Some("peers"));
        assert_eq!(keyword_of("ps"), Some("pstatus"));
    }

    #[test]
    fn keyword_longer_than_name_does_not_match() {
        assert_eq!(keyword_of("helpme"), None);
        assert_eq!(keyword_of("rvx"), None);
    }

    #[test]
    fn empty_and_unknown_keywords_do_not_resolve() {
        assert_eq!(keyword_of(""), None);
        assert_eq!(keyword_of("bogus"), None);
    }

    #[test]
    fn every_extended_name_resolves_somewhere() {
        for descriptor in extended_commands() {
            assert!(resolve(descriptor.keyword).is_some(), "{}", descriptor.keyword);
        }
    }
}
