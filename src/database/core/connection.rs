//! Database connection management
//!
//! This module provides the connection wrapper shared by all cron jobs. Query
//! helpers never propagate SQL failures: they log them and hand back `None`,
//! leaving it to the caller to treat the step as failed.

use rusqlite::{Connection, ErrorCode, OpenFlags, Params, Row};
use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

/// Path that selects a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// Where and as whom to connect
#[derive(Debug, Clone, Default)]
pub struct DbTarget {
    /// Database file path, or `:memory:`
    pub path: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl DbTarget {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }
}

/// Reasons a connection could not be established
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("access denied to database '{0}'")]
    AccessDenied(String),

    #[error("database '{0}' does not exist")]
    UnknownDatabase(String),

    #[error("failed to connect to '{path}': {source}")]
    Other {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl ConnectError {
    fn from_sqlite(path: &str, err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::PermissionDenied)
            | Some(ErrorCode::ReadOnly)
            | Some(ErrorCode::AuthorizationForStatementDenied) => {
                ConnectError::AccessDenied(path.to_string())
            }
            Some(ErrorCode::NotADatabase) => ConnectError::UnknownDatabase(path.to_string()),
            _ => ConnectError::Other {
                path: path.to_string(),
                source: err,
            },
        }
    }
}

/// Core database connection wrapper
pub struct DatabaseConn {
    pub conn: Connection,
    last_query_time: Cell<Duration>,
}

impl DatabaseConn {
    /// Connect to an existing database
    ///
    /// The OpenBMP database is populated by the collector and is never created
    /// here: a missing file is reported as an unknown database.
    pub fn connect(target: &DbTarget) -> Result<Self, ConnectError> {
        let path = target.path.as_str();
        if path == IN_MEMORY {
            return Self::open_in_memory();
        }

        if let Some(user) = &target.user {
            debug!("credentials for user '{}' are not used by the SQLite backend", user);
        }

        let metadata =
            std::fs::metadata(Path::new(path)).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ConnectError::UnknownDatabase(path.to_string()),
                std::io::ErrorKind::PermissionDenied => ConnectError::AccessDenied(path.to_string()),
                _ => ConnectError::UnknownDatabase(path.to_string()),
            })?;
        if metadata.permissions().readonly() {
            return Err(ConnectError::AccessDenied(path.to_string()));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| ConnectError::from_sqlite(path, e))?;

        let db = DatabaseConn {
            conn,
            last_query_time: Cell::new(Duration::ZERO),
        };
        db.configure().map_err(|e| ConnectError::from_sqlite(path, e))?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn open_in_memory() -> Result<Self, ConnectError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ConnectError::from_sqlite(IN_MEMORY, e))?;
        let db = DatabaseConn {
            conn,
            last_query_time: Cell::new(Duration::ZERO),
        };
        db.configure()
            .map_err(|e| ConnectError::from_sqlite(IN_MEMORY, e))?;
        Ok(db)
    }

    /// Configure the connection; also forces the file to be read so that a
    /// non-database file fails here rather than on the first query
    fn configure(&self) -> rusqlite::Result<()> {
        // WAL lets the transit worker connections read while another writes
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        self.conn.execute("PRAGMA synchronous=NORMAL", [])?;
        self.conn.busy_timeout(Duration::from_secs(30))?;
        let _: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))?;
        Ok(())
    }

    /// Elapsed time of the most recent query
    pub fn last_query_time(&self) -> Duration {
        self.last_query_time.get()
    }

    /// Run a query and collect all rows
    ///
    /// Returns `None` if the query failed; the error is logged.
    pub fn query<T, P, F>(&self, sql: &str, params: P, f: F) -> Option<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let start = Instant::now();
        let result = self.conn.prepare(sql).and_then(|mut stmt| {
            let rows = stmt.query_map(params, f)?;
            rows.collect::<rusqlite::Result<Vec<T>>>()
        });
        self.last_query_time.set(start.elapsed());

        match result {
            Ok(rows) => Some(rows),
            Err(e) => {
                error!("query failed - {}", e);
                None
            }
        }
    }

    /// Run a query and hand each row to `f` without collecting
    ///
    /// Returns the number of rows visited, or `None` if the query failed.
    pub fn query_each<P, F>(&self, sql: &str, params: P, mut f: F) -> Option<usize>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<()>,
    {
        let start = Instant::now();
        let result = self.conn.prepare(sql).and_then(|mut stmt| {
            let mut rows = stmt.query(params)?;
            let mut visited = 0;
            while let Some(row) = rows.next()? {
                f(row)?;
                visited += 1;
            }
            Ok(visited)
        });
        self.last_query_time.set(start.elapsed());

        match result {
            Ok(visited) => Some(visited),
            Err(e) => {
                error!("query failed - {}", e);
                None
            }
        }
    }

    /// Run a statement that returns no rows, such as an insert or update
    ///
    /// Returns the number of changed rows, or `None` if the statement failed.
    pub fn query_no_results<P: Params>(&self, sql: &str, params: P) -> Option<usize> {
        let start = Instant::now();
        let result = self.conn.execute(sql, params);
        self.last_query_time.set(start.elapsed());

        match result {
            Ok(changed) => Some(changed),
            Err(e) => {
                error!("query failed - {}", e);
                None
            }
        }
    }

    /// Create a table from its schema definition
    ///
    /// Returns false if creating (or dropping) the table failed.
    pub fn create_table(&self, table_name: &str, schema: &str, drop_if_exists: bool) -> bool {
        if drop_if_exists {
            let drop = format!("DROP TABLE IF EXISTS {}", table_name);
            if let Err(e) = self.conn.execute(drop.as_str(), []) {
                error!("failed to drop table {} - {}", table_name, e);
                return false;
            }
        }

        match self.conn.execute_batch(schema) {
            Ok(_) => true,
            Err(e) => {
                error!("failed to create table {} - {}", table_name, e);
                false
            }
        }
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> bool {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table_name],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)
            .unwrap_or(false)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Option<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", table_name);
        self.query(query.as_str(), [], |row| row.get::<_, u64>(0))
            .and_then(|rows| rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = DatabaseConn::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_connect_memory_target() {
        let db = DatabaseConn::connect(&DbTarget::new(IN_MEMORY));
        assert!(db.is_ok());
    }

    #[test]
    fn test_connect_unknown_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sqlite3");
        let res = DatabaseConn::connect(&DbTarget::new(path.to_str().unwrap()));
        assert!(matches!(res, Err(ConnectError::UnknownDatabase(_))));
    }

    #[test]
    fn test_connect_not_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.sqlite3");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();
        let res = DatabaseConn::connect(&DbTarget::new(path.to_str().unwrap()));
        assert!(matches!(res, Err(ConnectError::UnknownDatabase(_))));
    }

    #[test]
    fn test_connect_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obmp.sqlite3");
        Connection::open(&path).unwrap();

        let target = DbTarget::new(path.to_str().unwrap())
            .with_credentials(Some("openbmp".to_string()), Some("secret".to_string()));
        let db = DatabaseConn::connect(&target).unwrap();
        assert!(db.create_table("t", "CREATE TABLE t (id INTEGER PRIMARY KEY)", false));
        assert!(db.table_exists("t"));
    }

    #[test]
    fn test_query_and_no_results() {
        let db = DatabaseConn::open_in_memory().unwrap();
        assert!(db.create_table(
            "test_table",
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY, name TEXT)",
            false
        ));

        let changed = db.query_no_results(
            "INSERT INTO test_table (id, name) VALUES (?1, ?2), (?3, ?4)",
            rusqlite::params![1, "one", 2, "two"],
        );
        assert_eq!(changed, Some(2));

        let rows = db
            .query("SELECT id, name FROM test_table ORDER BY id", [], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
            })
            .unwrap();
        assert_eq!(rows, vec![(1, "one".to_string()), (2, "two".to_string())]);
        assert_eq!(db.table_count("test_table"), Some(2));

        let mut sum = 0u32;
        let visited = db.query_each("SELECT id FROM test_table", [], |row| {
            sum += row.get::<_, u32>(0)?;
            Ok(())
        });
        assert_eq!(visited, Some(2));
        assert_eq!(sum, 3);
    }

    #[test]
    fn test_failed_query_returns_none() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let rows = db.query("SELECT * FROM no_such_table", [], |row| row.get::<_, i64>(0));
        assert!(rows.is_none());
        assert!(db
            .query_no_results("INSERT INTO no_such_table VALUES (1)", [])
            .is_none());
        assert_eq!(db.table_count("no_such_table"), None);
    }

    #[test]
    fn test_create_table_drop_if_exists() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let schema = "CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY)";
        assert!(db.create_table("t", schema, false));
        db.query_no_results("INSERT INTO t (id) VALUES (1)", []);
        assert_eq!(db.table_count("t"), Some(1));

        assert!(db.create_table("t", schema, true));
        assert_eq!(db.table_count("t"), Some(0));

        assert!(!db.create_table("bad", "CREATE TABLE (", false));
    }
}
