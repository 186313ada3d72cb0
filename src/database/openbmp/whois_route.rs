//! WHOIS route repository
//!
//! Route objects are written in multi-row `REPLACE INTO gen_whois_route`
//! statements keyed by `(prefix, prefix_len, origin)`.

use crate::database::core::DatabaseConn;
use crate::lens::rpsl::RouteRecord;
use itertools::Itertools;
use rusqlite::types::Value;
use serde::Serialize;
use tracing::{debug, warn};

/// Bound values per route row: prefix, prefix_len, descr, origin
const PARAMS_PER_ROUTE: usize = 4;

/// Host parameter limit of the bundled SQLite (`SQLITE_MAX_VARIABLE_NUMBER`)
const MAX_BOUND_PARAMS: usize = 32_766;

pub struct WhoisRouteRepository<'a> {
    db: &'a DatabaseConn,
}

impl<'a> WhoisRouteRepository<'a> {
    pub fn new(db: &'a DatabaseConn) -> Self {
        Self { db }
    }

    /// Replace a batch of route records
    ///
    /// Records missing part of the key are skipped. Large batches are split so
    /// that no statement exceeds the SQLite host parameter limit. Returns the
    /// number of rows changed, or `None` if any statement failed.
    pub fn replace_batch(&self, records: &[RouteRecord]) -> Option<usize> {
        let rows: Vec<[Value; PARAMS_PER_ROUTE]> = records
            .iter()
            .filter_map(|record| {
                let (Some(prefix), Some(prefix_len), Some(origin)) =
                    (&record.prefix, record.prefix_len, record.origin)
                else {
                    return None;
                };
                Some([
                    Value::Text(prefix.clone()),
                    Value::Integer(prefix_len as i64),
                    match &record.descr {
                        Some(descr) => Value::Text(descr.clone()),
                        None => Value::Null,
                    },
                    Value::Integer(origin as i64),
                ])
            })
            .collect();

        let mut changed = 0;
        let mut failed = false;
        for chunk in rows.chunks(MAX_BOUND_PARAMS / PARAMS_PER_ROUTE) {
            let placeholders = chunk.iter().map(|_| "(?,?,?,?)").join(",");
            let sql = format!(
                "REPLACE INTO gen_whois_route (prefix,prefix_len,descr,origin) VALUES {}",
                placeholders
            );
            let values = chunk.iter().flat_map(|row| row.iter().cloned());
            match self
                .db
                .query_no_results(sql.as_str(), rusqlite::params_from_iter(values))
            {
                Some(n) => changed += n,
                None => failed = true,
            }
        }

        (!failed).then_some(changed)
    }

    /// Number of stored route objects
    pub fn count(&self) -> Option<u64> {
        self.db.table_count("gen_whois_route")
    }

    /// Stored route object for a key
    pub fn get(&self, prefix: &str, prefix_len: u8, origin: u32) -> Option<RouteRecord> {
        self.db
            .query(
                "SELECT prefix, prefix_len, origin, descr FROM gen_whois_route
                 WHERE prefix = ?1 AND prefix_len = ?2 AND origin = ?3",
                rusqlite::params![prefix, prefix_len, origin],
                |row| {
                    Ok(RouteRecord {
                        prefix: row.get(0)?,
                        prefix_len: row.get(1)?,
                        origin: row.get(2)?,
                        descr: row.get(3)?,
                    })
                },
            )?
            .into_iter()
            .next()
    }
}

/// Outcome of a bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkWriteStats {
    pub queued: usize,
    pub written: usize,
    pub failed_batches: usize,
}

/// Queue of route records flushed in batches
///
/// A batch is written as soon as more than `batch_size` records are queued;
/// [`RouteBulkWriter::finish`] writes what is left.
pub struct RouteBulkWriter<'a> {
    repo: WhoisRouteRepository<'a>,
    queue: Vec<RouteRecord>,
    batch_size: usize,
    stats: BulkWriteStats,
}

impl<'a> RouteBulkWriter<'a> {
    pub fn new(db: &'a DatabaseConn, batch_size: usize) -> Self {
        Self {
            repo: WhoisRouteRepository::new(db),
            queue: Vec::with_capacity(batch_size + 1),
            batch_size,
            stats: BulkWriteStats::default(),
        }
    }

    /// Queue a record; records without the full key are dropped
    pub fn push(&mut self, record: RouteRecord) {
        if !record.is_persistable() {
            debug!("skipping incomplete route object {:?}", record);
            return;
        }

        self.queue.push(record);
        self.stats.queued += 1;
        if self.queue.len() > self.batch_size {
            self.flush();
        }
    }

    /// Number of records waiting to be written
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn flush(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        match self.repo.replace_batch(&self.queue) {
            Some(n) => self.stats.written += n,
            None => {
                warn!("dropping batch of {} route objects", self.queue.len());
                self.stats.failed_batches += 1;
            }
        }
        self.queue.clear();
    }

    /// Write the remaining records
    pub fn finish(mut self) -> BulkWriteStats {
        self.flush();
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ObmpDatabase;

    fn route(prefix: &str, len: u8, origin: u32, descr: Option<&str>) -> RouteRecord {
        RouteRecord {
            prefix: Some(prefix.to_string()),
            prefix_len: Some(len),
            origin: Some(origin),
            descr: descr.map(|d| d.to_string()),
        }
    }

    #[test]
    fn test_replace_batch() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        let repo = db.whois_route();

        let records = vec![
            route("192.0.2.0", 24, 64500, Some("first")),
            route("198.51.100.0", 24, 64501, None),
            RouteRecord {
                prefix: Some("203.0.113.0".to_string()),
                ..Default::default()
            },
        ];
        assert_eq!(repo.replace_batch(&records), Some(2));
        assert_eq!(repo.count(), Some(2));

        repo.replace_batch(&[route("192.0.2.0", 24, 64500, Some("second"))])
            .unwrap();
        assert_eq!(repo.count(), Some(2));
        assert_eq!(
            repo.get("192.0.2.0", 24, 64500).unwrap().descr.as_deref(),
            Some("second")
        );
        assert_eq!(repo.get("198.51.100.0", 24, 64501).unwrap().descr, None);
        assert_eq!(repo.replace_batch(&[]), Some(0));
    }

    #[test]
    fn test_bulk_writer_flushes_at_boundary() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        let mut writer = RouteBulkWriter::new(db.connection(), 2);

        writer.push(route("10.0.0.0", 8, 1, None));
        writer.push(route("10.1.0.0", 16, 1, None));
        assert_eq!(writer.pending(), 2);
        assert_eq!(db.whois_route().count(), Some(0));

        // the third record pushes the queue over the batch size
        writer.push(route("10.2.0.0", 16, 1, None));
        assert_eq!(writer.pending(), 0);
        assert_eq!(db.whois_route().count(), Some(3));

        writer.push(route("10.3.0.0", 16, 1, None));
        writer.push(RouteRecord::default());
        assert_eq!(writer.pending(), 1);

        let stats = writer.finish();
        assert_eq!(
            stats,
            BulkWriteStats {
                queued: 4,
                written: 4,
                failed_batches: 0
            }
        );
        assert_eq!(db.whois_route().count(), Some(4));
    }

    #[test]
    fn test_bulk_writer_large_batch_size() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        let mut writer = RouteBulkWriter::new(db.connection(), 10_000);

        for i in 0..9000u32 {
            let prefix = format!("10.{}.{}.0", i / 256, i % 256);
            writer.push(route(prefix.as_str(), 24, 64500, Some("bulk")));
        }
        assert_eq!(writer.pending(), 9000);

        let stats = writer.finish();
        assert_eq!(stats.queued, 9000);
        assert_eq!(stats.written, 9000);
        assert_eq!(stats.failed_batches, 0);
        assert_eq!(db.whois_route().count(), Some(9000));
    }

    #[test]
    fn test_bulk_writer_reports_failed_batches() {
        let db = crate::database::core::DatabaseConn::open_in_memory().unwrap();
        let mut writer = RouteBulkWriter::new(&db, 10);
        writer.push(route("10.0.0.0", 8, 1, None));

        let stats = writer.finish();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.failed_batches, 1);
    }
}
