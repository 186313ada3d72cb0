//! ASN statistics repository
//!
//! Reads prefix/path data from the OpenBMP `rib`, `path_attrs` and
//! `as_path_analysis` tables and writes per-ASN counts into `gen_asn_stats`.

use crate::database::core::DatabaseConn;
use crate::lens::aspath::{is_reserved_asn, TransitCounter};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::info;

/// Address family of the prefixes being counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn is_ipv4(&self) -> bool {
        matches!(self, AddressFamily::Ipv4)
    }

    fn suffix(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "v4",
            AddressFamily::Ipv6 => "v6",
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// Kind of prefix count stored in `gen_asn_stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatKind {
    Origin,
    Transit,
}

impl StatKind {
    /// Column holding the count, e.g. `transit_v6_prefixes`
    pub fn column(&self, family: AddressFamily) -> String {
        match self {
            StatKind::Origin => format!("origin_{}_prefixes", family.suffix()),
            StatKind::Transit => format!("transit_{}_prefixes", family.suffix()),
        }
    }

    /// Flag column marking the ASN role
    pub fn flag_column(&self) -> &'static str {
        match self {
            StatKind::Origin => "isOrigin",
            StatKind::Transit => "isTransit",
        }
    }
}

/// A row of `gen_asn_stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AsnStatsRecord {
    pub asn: u32,
    pub is_transit: bool,
    pub is_origin: bool,
    pub transit_v4_prefixes: u64,
    pub transit_v6_prefixes: u64,
    pub origin_v4_prefixes: u64,
    pub origin_v6_prefixes: u64,
    pub timestamp: i64,
}

const QUERY_ORIGIN_PREFIXES: &str = r#"
    SELECT origin_as, COUNT(*) FROM (
        SELECT DISTINCT p.origin_as AS origin_as, r.prefix, r.prefix_len
        FROM rib r JOIN path_attrs p
            ON (r.path_attr_hash_id = p.hash_id AND r.peer_hash_id = p.peer_hash_id)
        WHERE r.isIPv4 = ?1 AND r.isWithdrawn = 0
    )
    GROUP BY origin_as
"#;

const QUERY_DISTINCT_AS_PATHS: &str = r#"
    SELECT DISTINCT p.as_path, p.origin_as, r.prefix, r.prefix_len
    FROM rib r JOIN path_attrs p
        ON (r.path_attr_hash_id = p.hash_id AND r.peer_hash_id = p.peer_hash_id)
    WHERE r.isIPv4 = ?1 AND r.isWithdrawn = 0
"#;

const QUERY_TRANSIT_ASNS: &str = r#"
    SELECT DISTINCT asn FROM as_path_analysis WHERE asn_right != 0 AND asn_left != 0
"#;

const QUERY_TRANSIT_PREFIXES_FOR_ASN: &str = r#"
    SELECT COUNT(*) FROM (
        SELECT DISTINCT r.prefix, r.prefix_len
        FROM as_path_analysis a JOIN rib r
            ON (a.path_attr_hash_id = r.path_attr_hash_id AND a.peer_hash_id = r.peer_hash_id)
        WHERE a.asn = ?1 AND a.asn_right != 0 AND a.asn_left != 0
            AND r.isIPv4 = ?2 AND r.isWithdrawn = 0
    )
"#;

/// Repository for ASN statistics
pub struct AsnStatsRepository<'a> {
    db: &'a DatabaseConn,
}

impl<'a> AsnStatsRepository<'a> {
    pub fn new(db: &'a DatabaseConn) -> Self {
        Self { db }
    }

    /// Number of unique prefixes originated per ASN, reserved ASNs excluded
    pub fn origin_prefix_counts(&self, family: AddressFamily) -> Option<Vec<(u32, u64)>> {
        let rows = self.db.query(QUERY_ORIGIN_PREFIXES, [family.is_ipv4()], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, u64>(1)?))
        })?;
        info!(
            "query for {} origin prefixes took {:?}",
            family,
            self.db.last_query_time()
        );

        Some(
            rows.into_iter()
                .filter(|(asn, _)| !is_reserved_asn(*asn))
                .collect(),
        )
    }

    /// Tally transit ASNs of every distinct `(as_path, prefix)` row into `counter`
    ///
    /// The peering AS of each path is not counted as transit.
    pub fn transit_prefix_counts(
        &self,
        family: AddressFamily,
        mut counter: TransitCounter,
    ) -> Option<TransitCounter> {
        self.db
            .query_each(QUERY_DISTINCT_AS_PATHS, [family.is_ipv4()], |row| {
                let as_path: String = row.get(0)?;
                let origin: u32 = row.get(1)?;
                counter.add_path(as_path.as_str(), origin, true);
                Ok(())
            })?;
        info!(
            "query for {} transit prefixes took {:?}",
            family,
            self.db.last_query_time()
        );
        Some(counter)
    }

    /// ASNs seen in a transit position by the path analysis
    pub fn transit_asns(&self) -> Option<Vec<u32>> {
        let rows = self
            .db
            .query(QUERY_TRANSIT_ASNS, [], |row| row.get::<_, u32>(0))?;
        Some(rows.into_iter().filter(|a| !is_reserved_asn(*a)).collect())
    }

    /// Number of unique prefixes an ASN provides transit for
    pub fn transit_prefix_count_for_asn(&self, asn: u32, family: AddressFamily) -> Option<u64> {
        self.db
            .query(
                QUERY_TRANSIT_PREFIXES_FOR_ASN,
                rusqlite::params![asn, family.is_ipv4()],
                |row| row.get::<_, u64>(0),
            )?
            .into_iter()
            .next()
    }

    /// Bulk insert or update counts for one interval
    ///
    /// Statements are split into batches of `batch_size` rows. Returns the
    /// number of rows written, or `None` if any batch failed.
    pub fn upsert_counts(
        &self,
        kind: StatKind,
        family: AddressFamily,
        counts: &[(u32, u64)],
        timestamp: i64,
        batch_size: usize,
    ) -> Option<usize> {
        let column = kind.column(family);
        let flag = kind.flag_column();
        let mut written = 0;
        let mut failed = false;

        for chunk in counts.chunks(batch_size.max(1)) {
            let values = chunk
                .iter()
                .map(|(asn, count)| format!("({},{},1,{})", asn, count, timestamp))
                .join(",");
            let sql = format!(
                "INSERT INTO gen_asn_stats (asn,{col},{flag},timestamp) VALUES {values} \
                 ON CONFLICT(asn,timestamp) DO UPDATE SET {col}=excluded.{col},{flag}=1",
                col = column,
                flag = flag,
                values = values,
            );

            match self.db.query_no_results(sql.as_str(), []) {
                Some(n) => written += n,
                None => failed = true,
            }
        }

        info!(
            "insert/update for {} took {:?} ({} rows)",
            column,
            self.db.last_query_time(),
            written
        );

        (!failed).then_some(written)
    }

    /// Most recent stats row for an ASN
    pub fn latest(&self, asn: u32) -> Option<AsnStatsRecord> {
        self.db
            .query(
                "SELECT asn, isTransit, isOrigin, transit_v4_prefixes, transit_v6_prefixes,
                        origin_v4_prefixes, origin_v6_prefixes, timestamp
                 FROM gen_asn_stats WHERE asn = ?1 ORDER BY timestamp DESC LIMIT 1",
                [asn],
                |row| {
                    Ok(AsnStatsRecord {
                        asn: row.get(0)?,
                        is_transit: row.get(1)?,
                        is_origin: row.get(2)?,
                        transit_v4_prefixes: row.get(3)?,
                        transit_v6_prefixes: row.get(4)?,
                        origin_v4_prefixes: row.get(5)?,
                        origin_v6_prefixes: row.get(6)?,
                        timestamp: row.get(7)?,
                    })
                },
            )?
            .into_iter()
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::openbmp::test_fixtures::seeded_database;
    use crate::database::ObmpDatabase;

    #[test]
    fn test_column_names() {
        assert_eq!(StatKind::Origin.column(AddressFamily::Ipv4), "origin_v4_prefixes");
        assert_eq!(StatKind::Transit.column(AddressFamily::Ipv6), "transit_v6_prefixes");
        assert_eq!(StatKind::Transit.flag_column(), "isTransit");
    }

    #[test]
    fn test_origin_prefix_counts() {
        let db = seeded_database();
        let repo = db.asn_stats();

        let mut v4 = repo.origin_prefix_counts(AddressFamily::Ipv4).unwrap();
        v4.sort();
        // 64512 is private and dropped
        assert_eq!(v4, vec![(13335, 2), (15169, 1)]);

        let v6 = repo.origin_prefix_counts(AddressFamily::Ipv6).unwrap();
        assert_eq!(v6, vec![(13335, 1)]);
    }

    #[test]
    fn test_transit_prefix_counts() {
        let db = seeded_database();
        let repo = db.asn_stats();

        let counter = repo
            .transit_prefix_counts(AddressFamily::Ipv4, TransitCounter::new())
            .unwrap();
        assert_eq!(counter.get(3356), 4);
        assert_eq!(counter.get(1299), 1);
        // peers are never transit
        assert_eq!(counter.get(174), 0);
        assert_eq!(counter.get(2914), 0);
    }

    #[test]
    fn test_transit_asns_and_per_asn_count() {
        let db = seeded_database();
        let repo = db.asn_stats();

        let mut asns = repo.transit_asns().unwrap();
        asns.sort();
        assert_eq!(asns, vec![1299, 3356]);

        assert_eq!(
            repo.transit_prefix_count_for_asn(3356, AddressFamily::Ipv4),
            Some(4)
        );
        assert_eq!(
            repo.transit_prefix_count_for_asn(3356, AddressFamily::Ipv6),
            Some(1)
        );
        assert_eq!(
            repo.transit_prefix_count_for_asn(1299, AddressFamily::Ipv4),
            Some(1)
        );
    }

    #[test]
    fn test_upsert_counts_is_idempotent() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        let repo = db.asn_stats();
        let counts = vec![(174, 10), (3356, 20), (1299, 5)];

        assert_eq!(
            repo.upsert_counts(StatKind::Origin, AddressFamily::Ipv4, &counts, 1000, 2),
            Some(3)
        );
        repo.upsert_counts(StatKind::Origin, AddressFamily::Ipv4, &counts, 1000, 2)
            .unwrap();
        repo.upsert_counts(
            StatKind::Transit,
            AddressFamily::Ipv6,
            &[(3356, 7)],
            1000,
            2000,
        )
        .unwrap();

        assert_eq!(db.connection().table_count("gen_asn_stats"), Some(3));

        let rec = repo.latest(3356).unwrap();
        assert!(rec.is_origin);
        assert!(rec.is_transit);
        assert_eq!(rec.origin_v4_prefixes, 20);
        assert_eq!(rec.transit_v6_prefixes, 7);
        assert_eq!(rec.timestamp, 1000);

        // a later interval adds new rows
        repo.upsert_counts(StatKind::Origin, AddressFamily::Ipv4, &counts, 2000, 10)
            .unwrap();
        assert_eq!(db.connection().table_count("gen_asn_stats"), Some(6));
        assert_eq!(repo.latest(3356).unwrap().timestamp, 2000);
    }

    #[test]
    fn test_query_without_source_tables() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        assert!(db
            .asn_stats()
            .origin_prefix_counts(AddressFamily::Ipv4)
            .is_none());
    }
}
