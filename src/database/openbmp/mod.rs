//! OpenBMP database storage
//!
//! The collector owns `rib`, `path_attrs` and `as_path_analysis`; the cron jobs
//! read those and maintain the derived tables:
//! - `gen_asn_stats`: per-interval origin/transit prefix counts
//! - `gen_whois_asn`: WHOIS details per ASN
//! - `gen_whois_route`: route objects from RR dumps

mod asn_stats;
mod whois_asn;
mod whois_route;

pub use asn_stats::{AddressFamily, AsnStatsRecord, AsnStatsRepository, StatKind};
pub use whois_asn::{WhoisAsnRepository, WhoisAsnRow};
pub use whois_route::{BulkWriteStats, RouteBulkWriter, WhoisRouteRepository};

use crate::database::core::{ConnectError, DatabaseConn, DbTarget, SchemaManager};
use anyhow::Result;
use tracing::info;

/// Connection to an OpenBMP database with access to the job repositories
pub struct ObmpDatabase {
    db: DatabaseConn,
}

impl ObmpDatabase {
    /// Connect to an existing OpenBMP database
    ///
    /// Connection failures are returned as-is so the caller can tell an access
    /// problem from a missing database.
    pub fn connect(target: &DbTarget) -> Result<Self, ConnectError> {
        let db = DatabaseConn::connect(target)?;
        info!("connected to database '{}'", target.path);
        Ok(Self { db })
    }

    /// Create an in-memory database with the output tables (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            db: DatabaseConn::open_in_memory()?,
        };
        db.initialize()?;
        Ok(db)
    }

    /// Create the `gen_*` tables if missing
    pub fn initialize(&self) -> Result<()> {
        SchemaManager::new(&self.db).initialize_output_tables()
    }

    /// Create the collector tables if missing, for empty databases
    pub fn initialize_source_tables(&self) -> Result<()> {
        SchemaManager::new(&self.db).initialize_source_tables()
    }

    pub fn asn_stats(&self) -> AsnStatsRepository<'_> {
        AsnStatsRepository::new(&self.db)
    }

    pub fn whois_asn(&self) -> WhoisAsnRepository<'_> {
        WhoisAsnRepository::new(&self.db)
    }

    pub fn whois_route(&self) -> WhoisRouteRepository<'_> {
        WhoisRouteRepository::new(&self.db)
    }

    /// Get the underlying connection wrapper
    pub fn connection(&self) -> &DatabaseConn {
        &self.db
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    /// `(hash_id, peer_hash_id, as_path, origin_as)`
    const PATH_ATTRS: &[(&str, &str, &str, u32)] = &[
        ("pa1", "peerA", "174 3356 13335", 13335),
        ("pa2", "peerB", "2914 3356 1299 15169", 15169),
        ("pa3", "peerA", "174 3356 3356 64512", 64512),
        ("pa4", "peerA", "174 3356 13335", 13335),
    ];

    /// `(hash_id, path_attr_hash_id, peer_hash_id, prefix, prefix_len, origin_as, isIPv4, isWithdrawn)`
    const RIB: &[(&str, &str, &str, &str, u8, u32, bool, bool)] = &[
        ("r1", "pa1", "peerA", "1.1.1.0", 24, 13335, true, false),
        ("r2", "pa1", "peerA", "1.0.0.0", 24, 13335, true, false),
        ("r3", "pa2", "peerB", "8.8.8.0", 24, 15169, true, false),
        ("r4", "pa3", "peerA", "10.0.0.0", 8, 64512, true, false),
        ("r5", "pa4", "peerA", "2606:4700::", 32, 13335, false, false),
        ("r6", "pa1", "peerA", "9.9.9.0", 24, 13335, true, true),
    ];

    /// `(asn, asn_left, asn_right, path_attr_hash_id, peer_hash_id)`
    const AS_PATH_ANALYSIS: &[(u32, u32, u32, &str, &str)] = &[
        (174, 0, 3356, "pa1", "peerA"),
        (3356, 174, 13335, "pa1", "peerA"),
        (13335, 3356, 0, "pa1", "peerA"),
        (2914, 0, 3356, "pa2", "peerB"),
        (3356, 2914, 1299, "pa2", "peerB"),
        (1299, 3356, 15169, "pa2", "peerB"),
        (15169, 1299, 0, "pa2", "peerB"),
        (174, 0, 3356, "pa3", "peerA"),
        (3356, 174, 64512, "pa3", "peerA"),
        (64512, 3356, 0, "pa3", "peerA"),
        (174, 0, 3356, "pa4", "peerA"),
        (3356, 174, 13335, "pa4", "peerA"),
        (13335, 3356, 0, "pa4", "peerA"),
    ];

    /// Write the collector rows into an initialized database
    pub fn seed(db: &DatabaseConn) {
        SchemaManager::new(db).initialize_source_tables().unwrap();

        for (hash, peer, path, origin) in PATH_ATTRS {
            db.conn
                .execute(
                    "INSERT INTO path_attrs (hash_id, peer_hash_id, as_path, origin_as) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![hash, peer, path, origin],
                )
                .unwrap();
        }
        for (hash, pa, peer, prefix, len, origin, v4, withdrawn) in RIB {
            db.conn
                .execute(
                    "INSERT INTO rib (hash_id, path_attr_hash_id, peer_hash_id, prefix, prefix_len, origin_as, isIPv4, isWithdrawn)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![hash, pa, peer, prefix, len, origin, v4, withdrawn],
                )
                .unwrap();
        }
        for (asn, left, right, pa, peer) in AS_PATH_ANALYSIS {
            db.conn
                .execute(
                    "INSERT INTO as_path_analysis (asn, asn_left, asn_right, path_attr_hash_id, peer_hash_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![asn, left, right, pa, peer],
                )
                .unwrap();
        }
    }

    /// In-memory database with output tables and a small collector snapshot
    pub fn seeded_database() -> ObmpDatabase {
        let db = ObmpDatabase::open_in_memory().unwrap();
        seed(db.connection());
        db
    }

    /// File-backed copy of [`seeded_database`], for code that opens its own connections
    pub fn seeded_file_database(dir: &std::path::Path) -> String {
        let path = dir.join("openbmp.sqlite3");
        rusqlite::Connection::open(&path).unwrap();
        let path = path.to_string_lossy().to_string();

        let db = ObmpDatabase::connect(&DbTarget::new(path.as_str())).unwrap();
        db.initialize().unwrap();
        seed(db.connection());
        path
    }
}
