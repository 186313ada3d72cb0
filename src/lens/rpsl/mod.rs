//! RPSL block parsing lens
//!
//! WHOIS servers and Routing Registry dumps both speak a loose dialect of RPSL:
//! `attribute: value` lines grouped into blank-line separated objects. This
//! module turns such line streams into flat records.
//!
//! Two modes are provided:
//!
//! - [`WhoisParser`]: consumes the output of a single `whois AS<n>` query and
//!   produces the [`WhoisRecord`] of the last `aut-num` object, using the
//!   attribute map and stop rule of the queried [`SourceFamily`].
//! - [`RouteObjects`]: an iterator adaptor over the lines of an RR database
//!   dump, yielding one [`RouteRecord`] per `route`/`route6` object.
//!
//! Neither parser fails on malformed input. Lines that cannot be split or
//! values that do not coerce are dropped and the record is left partial.
//!
//! # Example
//!
//! ```rust
//! use obmp_cron::lens::rpsl::{RouteObjects, SourceFamily, WhoisField, WhoisParser};
//!
//! let record = WhoisParser::parse_lines(SourceFamily::Arin, "ASName: FOO-AS\nOrgName: Foo Inc\n\n".lines());
//! assert_eq!(record.get(WhoisField::AsName), Some("FOO-AS"));
//!
//! let dump = "route: 192.0.2.0/24\ndescr: test\norigin: AS64500\n\n";
//! let routes: Vec<_> = RouteObjects::new(dump.lines()).collect();
//! assert_eq!(routes[0].origin, Some(64500));
//! ```

mod route;
mod types;
mod whois;

pub use route::{RouteObjects, RouteRecord};
pub use types::{SourceFamily, WhoisField};
pub use whois::{WhoisParser, WhoisRecord};

/// Strip characters that must not reach the database verbatim
///
/// Values are bound as statement parameters when persisted; this keeps the
/// stored text identical to what the original cron scripts produced.
pub fn sanitize_value(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '\\'))
        .collect()
}

/// Comment lines are skipped by both parsing modes
pub(crate) fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('%')
}
