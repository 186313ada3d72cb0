#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! obmp-cron - Periodic batch jobs for an OpenBMP database
//!
//! obmp-cron derives summary tables from the data an OpenBMP collector stores
//! and enriches them with registry information. It can be used as both a
//! command-line application (run from cron) and a library.
//!
//! # Jobs
//!
//! | Job | Reads | Writes |
//! |-----|-------|--------|
//! | ASN statistics | `rib`, `path_attrs`, `as_path_analysis` | `gen_asn_stats` |
//! | WHOIS ASN | `gen_asn_stats`, regional WHOIS servers | `gen_whois_asn` |
//! | WHOIS route | Routing Registry dumps (FTP) | `gen_whois_route` |
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `remote` | Download and read RR dumps | `oneio` |
//! | `cli` | The `obmp-cron` binary | All above + `clap`, `indicatif`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - **[`database`]**: All database functionality
//!   - `core`: SQLite connection management and schema definitions
//!   - `openbmp`: Repositories for the tables the jobs read and write
//!
//! - **[`lens`]**: Job logic
//!   - `aspath`: AS path conditioning and transit counting
//!   - `rpsl`: WHOIS response and RR dump parsing
//!   - `asn_stats`, `whois_asn`, `whois_route`: one lens per job
//!
//! - **[`config`]**: Configuration management
//!
//! # Quick Start Examples
//!
//! ## ASN Statistics
//!
//! ```rust,ignore
//! use obmp_cron::database::{DbTarget, ObmpDatabase};
//! use obmp_cron::lens::asn_stats::{AsnStatsArgs, AsnStatsLens};
//!
//! let target = DbTarget::new("/var/lib/openbmp/openbmp.sqlite3");
//! let db = ObmpDatabase::connect(&target)?;
//! db.initialize()?;
//!
//! let summary = AsnStatsLens::new(&db, &target).run(&AsnStatsArgs::default());
//! for step in &summary.steps {
//!     println!("{}: {:?}", step.step, step.rows);
//! }
//! ```
//!
//! ## AS Path Conditioning
//!
//! ```rust
//! use obmp_cron::lens::aspath::{clean_as_path, condition};
//!
//! assert_eq!(clean_as_path("64512 3356 3356 {174}"), "3356 174");
//! assert_eq!(condition("701 3356 7018", 7018, true), vec![3356]);
//! ```

pub mod config;
pub mod database;
pub mod lens;

// =============================================================================
// Configuration
// =============================================================================

pub use config::ObmpCronConfig;

// =============================================================================
// Database Module - Re-export commonly used types
// =============================================================================

pub use database::{ConnectError, DatabaseConn, DbTarget, ObmpDatabase};

pub use database::{SchemaDefinitions, SchemaManager};

// =============================================================================
// Lens Module
// =============================================================================

pub use lens::asn_stats::{AsnStatsArgs, AsnStatsLens, TransitMode};
pub use lens::whois_asn::{CommandWhoisClient, WhoisAsnArgs, WhoisAsnLens, WhoisClient};
pub use lens::whois_route::{WhoisRouteArgs, WhoisRouteLens};
