//! Lens module
//!
//! This module provides high-level "lens" abstractions on top of the database
//! repositories. Each cron job is a lens; the CLI only parses arguments, opens
//! the database and prints the summary a lens returns.
//!
//! # Feature Requirements
//!
//! | Lens | Feature Required | Dependencies |
//! |------|-----------------|--------------|
//! | `aspath` | (none) | |
//! | `rpsl` | (none) | ipnet |
//! | `AsnStatsLens` | (none) | rayon, chrono |
//! | `WhoisAsnLens` | (none) | `whois` command |
//! | `WhoisRouteLens` | `remote` for downloads and file imports | oneio |
//!
//! # Architecture
//!
//! Each job lens module exports:
//! - A **Lens struct** (e.g., `AsnStatsLens`) - the main entry point for a run
//! - An **Args struct** - input arguments, usable as clap args with the `cli` feature
//! - A **Summary type** - what a run did, serializable for JSON output
//!
//! The `aspath` and `rpsl` modules hold the parsing building blocks shared by
//! the jobs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use obmp_cron::lens::asn_stats::{AsnStatsArgs, AsnStatsLens};
//! use obmp_cron::lens::whois_asn::{CommandWhoisClient, WhoisAsnLens};
//! use obmp_cron::lens::whois_route::WhoisRouteLens;
//! ```

// AS path conditioning and transit counting
pub mod aspath;

// RPSL parsing for WHOIS responses and RR dumps
pub mod rpsl;

// AsnStatsLens - origin/transit prefix counts
pub mod asn_stats;

// WhoisAsnLens - WHOIS details per ASN
pub mod whois_asn;

// WhoisRouteLens - route objects from RR dumps
pub mod whois_route;
