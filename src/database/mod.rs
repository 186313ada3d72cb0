//! Database module
//!
//! This module provides all database functionality for the cron jobs, organized into:
//!
//! - **core**: Core database infrastructure (SQLite connections, schema management)
//! - **openbmp**: Repositories over the OpenBMP tables read and written by the jobs
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/             # Foundation
//! │   ├── connection    # SQLite DatabaseConn wrapper, ConnectError
//! │   └── schema        # gen_* and collector table definitions
//! │
//! └── openbmp/          # Job storage
//!     ├── asn_stats     # origin/transit prefix counts (gen_asn_stats)
//!     ├── whois_asn     # WHOIS details per ASN (gen_whois_asn)
//!     └── whois_route   # RR route objects (gen_whois_route)
//! ```
//!
//! # Failure semantics
//!
//! Query helpers log SQL failures and return `None`. Jobs treat a `None` as a
//! failed step and move on to the next one.
//!
//! # Usage
//!
//! ```rust,ignore
//! use obmp_cron::database::{DbTarget, ObmpDatabase};
//!
//! let db = ObmpDatabase::connect(&DbTarget::new("/var/lib/openbmp/openbmp.sqlite3"))?;
//! db.initialize()?;
//!
//! let asns = db.whois_asn().asn_list(true).unwrap_or_default();
//! ```

pub mod core;
pub mod openbmp;

// SQLite connection and schema management
pub use core::{
    ConnectError, DatabaseConn, DbTarget, SchemaDefinitions, SchemaManager, IN_MEMORY,
    TBL_GEN_ASN_STATS, TBL_GEN_WHOIS_ASN, TBL_GEN_WHOIS_ROUTE,
};

// OpenBMP database (main entry point for the jobs)
pub use openbmp::ObmpDatabase;

pub use openbmp::{
    AddressFamily, AsnStatsRecord, AsnStatsRepository, BulkWriteStats, RouteBulkWriter,
    StatKind, WhoisAsnRepository, WhoisAsnRow, WhoisRouteRepository,
};

/// Ensure the data directory exists
pub fn ensure_data_dir(data_dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory '{}': {}", data_dir, e))
}
