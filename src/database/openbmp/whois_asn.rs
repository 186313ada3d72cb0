//! WHOIS ASN repository
//!
//! Stores one row per ASN in `gen_whois_asn`. Rows are replaced wholesale on
//! every lookup so that stale fields from an earlier source do not linger.

use crate::database::core::DatabaseConn;
use crate::lens::aspath::is_reserved_asn;
use crate::lens::rpsl::{WhoisField, WhoisRecord};
use itertools::Itertools;
use rusqlite::types::Value;
use serde::Serialize;
use tracing::debug;

const QUERY_ALL_ASNS: &str = r#"
    SELECT DISTINCT asn FROM gen_asn_stats ORDER BY asn
"#;

const QUERY_MISSING_ASNS: &str = r#"
    SELECT DISTINCT s.asn FROM gen_asn_stats s
    LEFT JOIN gen_whois_asn w ON s.asn = w.asn
    WHERE w.as_name IS NULL OR w.as_name = ''
    ORDER BY s.asn
"#;

/// A stored `gen_whois_asn` row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WhoisAsnRow {
    pub asn: u32,
    pub as_name: Option<String>,
    pub org_id: Option<String>,
    pub org_name: Option<String>,
    pub remarks: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state_prov: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub source: Option<String>,
    pub raw_output: Option<String>,
}

pub struct WhoisAsnRepository<'a> {
    db: &'a DatabaseConn,
}

impl<'a> WhoisAsnRepository<'a> {
    pub fn new(db: &'a DatabaseConn) -> Self {
        Self { db }
    }

    /// ASNs seen by the statistics job, reserved ASNs excluded
    ///
    /// With `missing_only`, ASNs that already have an AS name are skipped.
    pub fn asn_list(&self, missing_only: bool) -> Option<Vec<u32>> {
        let sql = if missing_only {
            QUERY_MISSING_ASNS
        } else {
            QUERY_ALL_ASNS
        };
        let asns = self.db.query(sql, [], |row| row.get::<_, u32>(0))?;
        Some(asns.into_iter().filter(|a| !is_reserved_asn(*a)).collect())
    }

    /// Insert or replace the row of an ASN
    pub fn replace(&self, asn: u32, record: &WhoisRecord) -> Option<usize> {
        let columns = std::iter::once("asn")
            .chain(WhoisField::ALL.iter().map(|f| f.as_str()))
            .chain(std::iter::once("raw_output"))
            .collect::<Vec<_>>();

        let mut values: Vec<Value> = Vec::with_capacity(columns.len());
        values.push(Value::Integer(asn as i64));
        for field in WhoisField::ALL {
            values.push(match record.get(field) {
                Some(v) => Value::Text(v.to_string()),
                None => Value::Null,
            });
        }
        values.push(Value::Text(record.raw_output.clone()));

        let sql = format!(
            "REPLACE INTO gen_whois_asn ({}) VALUES ({})",
            columns.iter().join(","),
            (1..=columns.len()).map(|i| format!("?{}", i)).join(",")
        );
        debug!("replacing whois record for AS{}", asn);

        self.db
            .query_no_results(sql.as_str(), rusqlite::params_from_iter(values))
    }

    /// Stored row of an ASN
    pub fn lookup(&self, asn: u32) -> Option<WhoisAsnRow> {
        self.db
            .query(
                "SELECT asn, as_name, org_id, org_name, remarks, address, city, state_prov,
                        postal_code, country, source, raw_output
                 FROM gen_whois_asn WHERE asn = ?1",
                [asn],
                |row| {
                    Ok(WhoisAsnRow {
                        asn: row.get(0)?,
                        as_name: row.get(1)?,
                        org_id: row.get(2)?,
                        org_name: row.get(3)?,
                        remarks: row.get(4)?,
                        address: row.get(5)?,
                        city: row.get(6)?,
                        state_prov: row.get(7)?,
                        postal_code: row.get(8)?,
                        country: row.get(9)?,
                        source: row.get(10)?,
                        raw_output: row.get(11)?,
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
    use crate::database::openbmp::{AddressFamily, StatKind};
    use crate::database::ObmpDatabase;

    fn record(as_name: Option<&str>, country: &str) -> WhoisRecord {
        let mut record = WhoisRecord::new();
        if let Some(name) = as_name {
            record.set(WhoisField::AsName, name);
        }
        record.set(WhoisField::Country, country);
        record.set(WhoisField::Source, "arin");
        record.raw_output = "ASName: test".to_string();
        record
    }

    #[test]
    fn test_asn_list() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        db.asn_stats()
            .upsert_counts(
                StatKind::Origin,
                AddressFamily::Ipv4,
                &[(3356, 1), (13335, 2), (64512, 1)],
                100,
                2000,
            )
            .unwrap();
        db.asn_stats()
            .upsert_counts(StatKind::Origin, AddressFamily::Ipv4, &[(3356, 1)], 200, 2000)
            .unwrap();

        let repo = db.whois_asn();
        assert_eq!(repo.asn_list(false), Some(vec![3356, 13335]));

        repo.replace(3356, &record(Some("LEVEL3"), "US")).unwrap();
        repo.replace(13335, &record(None, "US")).unwrap();
        assert_eq!(repo.asn_list(true), Some(vec![13335]));
    }

    #[test]
    fn test_replace_overwrites_row() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        let repo = db.whois_asn();

        let mut first = record(Some("FIRST"), "US");
        first.set(WhoisField::City, "Somewhere");
        assert_eq!(repo.replace(64496, &first), Some(1));
        assert_eq!(repo.replace(64496, &record(Some("SECOND"), "DE")), Some(1));
        assert_eq!(db.connection().table_count("gen_whois_asn"), Some(1));

        let row = repo.lookup(64496).unwrap();
        assert_eq!(row.as_name.as_deref(), Some("SECOND"));
        assert_eq!(row.country.as_deref(), Some("DE"));
        assert_eq!(row.source.as_deref(), Some("arin"));
        assert_eq!(row.raw_output.as_deref(), Some("ASName: test"));
        // replaced rows do not keep fields of the previous version
        assert_eq!(row.city, None);
    }

    #[test]
    fn test_quotes_are_bound_not_interpolated() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        let repo = db.whois_asn();

        let mut rec = record(Some("EXAMPLE"), "IE");
        rec.set(WhoisField::OrgName, "O'Neill; DROP TABLE gen_whois_asn");
        repo.replace(1, &rec).unwrap();

        assert_eq!(
            repo.lookup(1).unwrap().org_name.as_deref(),
            Some("O'Neill; DROP TABLE gen_whois_asn")
        );
    }

    #[test]
    fn test_lookup_missing() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        assert_eq!(db.whois_asn().lookup(42), None);
    }
}
