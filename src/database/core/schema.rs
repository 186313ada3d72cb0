//! Database schema definitions
//!
//! The `gen_*` tables are owned by the cron jobs and created on demand. The
//! OpenBMP source tables (`rib`, `path_attrs`, `as_path_analysis`) belong to
//! the collector; their definitions here describe the columns the jobs read and
//! are used to build fixtures.

use crate::database::core::DatabaseConn;
use anyhow::{anyhow, Result};

pub const TBL_GEN_ASN_STATS: &str = "gen_asn_stats";
pub const TBL_GEN_WHOIS_ASN: &str = "gen_whois_asn";
pub const TBL_GEN_WHOIS_ROUTE: &str = "gen_whois_route";

/// Schema definitions for all tables touched by the jobs
pub struct SchemaDefinitions;

impl SchemaDefinitions {
    /// Per-interval ASN statistics
    pub const GEN_ASN_STATS: &'static str = r#"
        CREATE TABLE IF NOT EXISTS gen_asn_stats (
            asn INTEGER NOT NULL,
            isTransit INTEGER NOT NULL DEFAULT 0,
            isOrigin INTEGER NOT NULL DEFAULT 0,
            transit_v4_prefixes INTEGER NOT NULL DEFAULT 0,
            transit_v6_prefixes INTEGER NOT NULL DEFAULT 0,
            origin_v4_prefixes INTEGER NOT NULL DEFAULT 0,
            origin_v6_prefixes INTEGER NOT NULL DEFAULT 0,
            timestamp INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            PRIMARY KEY (asn, timestamp)
        );
    "#;

    /// WHOIS details per ASN
    pub const GEN_WHOIS_ASN: &'static str = r#"
        CREATE TABLE IF NOT EXISTS gen_whois_asn (
            asn INTEGER PRIMARY KEY,
            as_name TEXT,
            org_id TEXT,
            org_name TEXT,
            remarks TEXT,
            address TEXT,
            city TEXT,
            state_prov TEXT,
            postal_code TEXT,
            country TEXT,
            raw_output TEXT,
            source TEXT,
            timestamp INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    "#;

    /// Route objects imported from RR dumps
    pub const GEN_WHOIS_ROUTE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS gen_whois_route (
            prefix TEXT NOT NULL,
            prefix_len INTEGER NOT NULL,
            descr TEXT,
            origin INTEGER NOT NULL,
            timestamp INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            PRIMARY KEY (prefix, prefix_len, origin)
        );
    "#;

    /// OpenBMP RIB (columns read by the jobs)
    pub const RIB: &'static str = r#"
        CREATE TABLE IF NOT EXISTS rib (
            hash_id TEXT PRIMARY KEY,
            path_attr_hash_id TEXT NOT NULL,
            peer_hash_id TEXT NOT NULL,
            prefix TEXT NOT NULL,
            prefix_len INTEGER NOT NULL,
            origin_as INTEGER NOT NULL DEFAULT 0,
            isIPv4 INTEGER NOT NULL DEFAULT 1,
            isWithdrawn INTEGER NOT NULL DEFAULT 0
        );
    "#;

    /// OpenBMP path attributes (columns read by the jobs)
    pub const PATH_ATTRS: &'static str = r#"
        CREATE TABLE IF NOT EXISTS path_attrs (
            hash_id TEXT NOT NULL,
            peer_hash_id TEXT NOT NULL,
            as_path TEXT NOT NULL,
            origin_as INTEGER NOT NULL,
            PRIMARY KEY (hash_id, peer_hash_id)
        );
    "#;

    /// OpenBMP per-ASN path analysis; `asn_right` is 0 when the ASN is the origin
    pub const AS_PATH_ANALYSIS: &'static str = r#"
        CREATE TABLE IF NOT EXISTS as_path_analysis (
            asn INTEGER NOT NULL,
            asn_left INTEGER NOT NULL DEFAULT 0,
            asn_right INTEGER NOT NULL DEFAULT 0,
            path_attr_hash_id TEXT NOT NULL,
            peer_hash_id TEXT NOT NULL,
            PRIMARY KEY (asn, path_attr_hash_id, peer_hash_id)
        );
    "#;

    pub const OUTPUT_TABLES: &'static [(&'static str, &'static str)] = &[
        (TBL_GEN_ASN_STATS, Self::GEN_ASN_STATS),
        (TBL_GEN_WHOIS_ASN, Self::GEN_WHOIS_ASN),
        (TBL_GEN_WHOIS_ROUTE, Self::GEN_WHOIS_ROUTE),
    ];

    pub const SOURCE_TABLES: &'static [(&'static str, &'static str)] = &[
        ("rib", Self::RIB),
        ("path_attrs", Self::PATH_ATTRS),
        ("as_path_analysis", Self::AS_PATH_ANALYSIS),
    ];
}

/// Creates tables that do not exist yet; existing tables are never dropped
pub struct SchemaManager<'a> {
    db: &'a DatabaseConn,
}

impl<'a> SchemaManager<'a> {
    pub fn new(db: &'a DatabaseConn) -> Self {
        Self { db }
    }

    /// Create a single output table by name
    pub fn ensure_table(&self, table_name: &str) -> Result<()> {
        let (_, schema) = SchemaDefinitions::OUTPUT_TABLES
            .iter()
            .chain(SchemaDefinitions::SOURCE_TABLES.iter())
            .find(|(name, _)| *name == table_name)
            .ok_or_else(|| anyhow!("Unknown table: {}", table_name))?;

        if !self.db.create_table(table_name, schema, false) {
            return Err(anyhow!("Failed to create table {}", table_name));
        }
        Ok(())
    }

    /// Create all `gen_*` tables
    pub fn initialize_output_tables(&self) -> Result<()> {
        for (name, _) in SchemaDefinitions::OUTPUT_TABLES {
            self.ensure_table(name)?;
        }
        Ok(())
    }

    /// Create the OpenBMP source tables, for fixtures and empty databases
    pub fn initialize_source_tables(&self) -> Result<()> {
        for (name, _) in SchemaDefinitions::SOURCE_TABLES {
            self.ensure_table(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_all_tables() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let schema = SchemaManager::new(&db);
        schema.initialize_output_tables().unwrap();
        schema.initialize_source_tables().unwrap();

        for (name, _) in SchemaDefinitions::OUTPUT_TABLES
            .iter()
            .chain(SchemaDefinitions::SOURCE_TABLES.iter())
        {
            assert!(db.table_exists(name), "missing table {}", name);
        }

        // idempotent
        schema.initialize_output_tables().unwrap();
    }

    #[test]
    fn test_unknown_table() {
        let db = DatabaseConn::open_in_memory().unwrap();
        assert!(SchemaManager::new(&db).ensure_table("nope").is_err());
    }
}
