//! AS path conditioning lens
//!
//! Turns raw AS_PATH strings, as stored in `path_attrs.as_path`, into the set of
//! transit ASNs that the statistics jobs tally. Reserved and private ASNs never
//! make it into the result, neither does the origin AS.
//!
//! # Example
//!
//! ```rust
//! use obmp_cron::lens::aspath::{condition, TransitCounter};
//!
//! let asns = condition("{701} 701 3356 3356 7018", 701, true);
//! assert_eq!(asns, vec![3356, 7018]);
//!
//! let mut counter = TransitCounter::new();
//! counter.add_path("174 3356 13335", 13335, true);
//! assert_eq!(counter.get(3356), 1);
//! ```

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// ASN used by 2-byte speakers to represent a 4-byte ASN (RFC 6793)
pub const AS_TRANS: u32 = 23456;

/// Check if an ASN falls into a reserved or private range
///
/// Covers AS0, AS_TRANS, documentation and private-use ranges, the reserved
/// block above 65535, and the 4-byte private-use range.
pub fn is_reserved_asn(asn: u32) -> bool {
    asn == 0
        || asn == AS_TRANS
        || (64496..=65535).contains(&asn)
        || (65536..=131071).contains(&asn)
        || asn >= 4_200_000_000
}

/// Result of conditioning a single AS path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConditionedPath {
    /// Unique transit ASNs in ascending order
    pub asns: Vec<u32>,

    /// Leftmost public ASN of the path, if any
    pub peer_as: Option<u32>,
}

/// Condition an AS path and keep track of the peering AS
///
/// The peer is the first public ASN in the path, even when it equals the origin.
/// With `remove_peer_as` set, that ASN is excluded from the result altogether.
pub fn condition_path(as_path: &str, origin_as: u32, remove_peer_as: bool) -> ConditionedPath {
    let stripped: String = as_path.chars().filter(|c| *c != '{' && *c != '}').collect();

    let mut peer_as: Option<u32> = None;
    let mut set = BTreeSet::new();

    for asn in stripped.split(' ').filter_map(|t| t.parse::<u32>().ok()) {
        if is_reserved_asn(asn) {
            continue;
        }

        if peer_as.is_none() {
            peer_as = Some(asn);
        }

        if asn == origin_as {
            continue;
        }

        set.insert(asn);
    }

    if remove_peer_as {
        if let Some(peer) = peer_as {
            set.remove(&peer);
        }
    }

    ConditionedPath {
        asns: set.into_iter().collect(),
        peer_as,
    }
}

/// Condition an AS path into the sorted set of transit ASNs
pub fn condition(as_path: &str, origin_as: u32, remove_peer_as: bool) -> Vec<u32> {
    condition_path(as_path, origin_as, remove_peer_as).asns
}

/// Clean an AS path while keeping its order
///
/// Removes AS-SET braces, prepended ASNs and reserved ASNs. Tokens that are not
/// numbers are dropped.
pub fn clean_as_path(as_path: &str) -> String {
    let stripped: String = as_path.chars().filter(|c| *c != '{' && *c != '}').collect();

    let mut cleaned: Vec<&str> = vec![];
    let mut prev = "";

    for token in stripped.split(' ') {
        if token != prev {
            if let Ok(asn) = token.parse::<u32>() {
                if !is_reserved_asn(asn) {
                    cleaned.push(token);
                }
            }
        }
        prev = token;
    }

    cleaned.join(" ")
}

/// Accumulator of transit occurrences per ASN
///
/// Each conditioned path contributes one count to every transit ASN it contains.
/// Since the statistics queries return one row per distinct prefix, the final
/// count for an ASN is the number of prefixes it provides transit for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransitCounter {
    counts: BTreeMap<u32, u64>,
}

impl TransitCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Condition a path and tally its transit ASNs
    pub fn add_path(&mut self, as_path: &str, origin_as: u32, remove_peer_as: bool) {
        for asn in condition(as_path, origin_as, remove_peer_as) {
            self.add(asn, 1);
        }
    }

    /// Add `count` occurrences for a single ASN
    pub fn add(&mut self, asn: u32, count: u64) {
        *self.counts.entry(asn).or_insert(0) += count;
    }

    /// Merge another counter into this one
    pub fn merge(&mut self, other: TransitCounter) {
        for (asn, count) in other.counts {
            self.add(asn, count);
        }
    }

    /// Occurrence count for an ASN, zero if never seen
    pub fn get(&self, asn: u32) -> u64 {
        self.counts.get(&asn).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over `(asn, count)` pairs in ascending ASN order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.counts.iter().map(|(asn, count)| (*asn, *count))
    }
}

impl FromIterator<(u32, u64)> for TransitCounter {
    fn from_iter<T: IntoIterator<Item = (u32, u64)>>(iter: T) -> Self {
        let mut counter = TransitCounter::new();
        for (asn, count) in iter {
            counter.add(asn, count);
        }
        counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_asn() {
        assert!(is_reserved_asn(0));
        assert!(is_reserved_asn(23456));
        assert!(is_reserved_asn(64496));
        assert!(is_reserved_asn(64512));
        assert!(is_reserved_asn(65535));
        assert!(is_reserved_asn(65536));
        assert!(is_reserved_asn(131071));
        assert!(is_reserved_asn(4_200_000_000));
        assert!(is_reserved_asn(u32::MAX));

        assert!(!is_reserved_asn(1));
        assert!(!is_reserved_asn(64495));
        assert!(!is_reserved_asn(131072));
        assert!(!is_reserved_asn(4_199_999_999));
    }

    #[test]
    fn test_condition_empty() {
        assert!(condition("", 701, true).is_empty());
        assert!(condition("", 701, false).is_empty());
        assert_eq!(condition_path("", 701, false).peer_as, None);
    }

    #[test]
    fn test_condition_only_origin_and_reserved() {
        assert!(condition("64512 65000 23456 701", 701, false).is_empty());
        assert!(condition("0 4200000001 701 701", 701, true).is_empty());
        assert!(condition("701", 701, false).is_empty());
    }

    #[test]
    fn test_condition_as_set_and_dedup() {
        assert_eq!(condition("{701} 701 3356 3356 7018", 701, true), vec![3356, 7018]);
        assert_eq!(
            condition("174 {3356 1299} 3356 1299", 13335, false),
            vec![174, 1299, 3356]
        );
    }

    #[test]
    fn test_condition_peer_after_private() {
        let res = condition_path("64512 701 3356", 701, false);
        assert_eq!(res.peer_as, Some(701));
        assert_eq!(res.asns, vec![3356]);

        assert_eq!(condition("64512 701 3356", 701, true), vec![3356]);
    }

    #[test]
    fn test_condition_peer_removal() {
        assert_eq!(condition("174 3356 13335", 13335, false), vec![174, 3356]);
        assert_eq!(condition("174 3356 13335", 13335, true), vec![3356]);

        // prepended peer is removed entirely
        assert_eq!(condition("174 174 3356 174 13335", 13335, true), vec![3356]);
    }

    #[test]
    fn test_condition_origin_mid_path() {
        assert_eq!(condition("3356 701 1299 701", 701, false), vec![1299, 3356]);
    }

    #[test]
    fn test_condition_ascending_order() {
        assert_eq!(
            condition("7018 3356 174 2914 1299", 1, false),
            vec![174, 1299, 2914, 3356, 7018]
        );
    }

    #[test]
    fn test_condition_skips_noise() {
        assert_eq!(condition("174  abc 3356 -1 99999999999", 1, false), vec![174, 3356]);
    }

    #[test]
    fn test_clean_as_path() {
        assert_eq!(clean_as_path("{701} 701 3356 3356 7018"), "701 3356 7018");
        assert_eq!(clean_as_path("64512 174 174 65000 3356"), "174 3356");
        assert_eq!(clean_as_path(""), "");
    }

    #[test]
    fn test_transit_counter() {
        let mut counter = TransitCounter::new();
        counter.add_path("174 3356 13335", 13335, true);
        counter.add_path("1299 3356 13335", 13335, true);
        counter.add_path("2914 3356 3356 1299 15169", 15169, true);

        assert_eq!(counter.get(3356), 3);
        assert_eq!(counter.get(1299), 1);
        assert_eq!(counter.get(174), 0);
        assert_eq!(counter.get(2914), 0);
        assert_eq!(counter.len(), 2);

        let pairs: Vec<(u32, u64)> = counter.iter().collect();
        assert_eq!(pairs, vec![(1299, 1), (3356, 3)]);
    }

    #[test]
    fn test_transit_counter_merge() {
        let mut a: TransitCounter = vec![(174, 2), (3356, 1)].into_iter().collect();
        let b: TransitCounter = vec![(3356, 4), (1299, 1)].into_iter().collect();
        a.merge(b);

        assert_eq!(a.get(174), 2);
        assert_eq!(a.get(3356), 5);
        assert_eq!(a.get(1299), 1);
        assert!(!a.is_empty());
    }
}
