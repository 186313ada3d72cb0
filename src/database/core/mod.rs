//! Core database infrastructure
//!
//! This module provides the foundational database components used by the jobs:
//! - `DatabaseConn`: SQLite connection wrapper with logged, non-raising queries
//! - `SchemaDefinitions`/`SchemaManager`: table definitions and creation

mod connection;
mod schema;

pub use connection::{ConnectError, DatabaseConn, DbTarget, IN_MEMORY};
pub use schema::{
    SchemaDefinitions, SchemaManager, TBL_GEN_ASN_STATS, TBL_GEN_WHOIS_ASN, TBL_GEN_WHOIS_ROUTE,
};
