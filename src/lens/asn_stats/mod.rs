//! ASN statistics lens module
//!
//! This module provides the `AsnStatsLens`, which refreshes `gen_asn_stats`
//! from the collector tables. A run performs four steps, in order:
//!
//! 1. origin prefix counts, IPv4
//! 2. origin prefix counts, IPv6
//! 3. transit prefix counts, IPv4
//! 4. transit prefix counts, IPv6
//!
//! All rows written by a run share one interval timestamp, taken when the run
//! starts. A failed step is logged and the run continues with the next one.
//!
//! Transit prefixes are counted in one of two ways:
//! - [`TransitMode::Path`]: every distinct AS path is conditioned locally and
//!   tallied into a [`TransitCounter`]
//! - [`TransitMode::Analysis`]: the per-ASN path analysis table is queried
//!   once per transit ASN, fanned out over a fixed pool of worker threads
//!
//! # Example
//!
//! ```rust,ignore
//! use obmp_cron::database::{DbTarget, ObmpDatabase};
//! use obmp_cron::lens::asn_stats::{AsnStatsArgs, AsnStatsLens, TransitMode};
//!
//! let target = DbTarget::new("/var/lib/openbmp/openbmp.sqlite3");
//! let db = ObmpDatabase::connect(&target)?;
//! let lens = AsnStatsLens::new(&db, &target).workers(8);
//!
//! let summary = lens.run(&AsnStatsArgs::default().transit_mode(TransitMode::Analysis));
//! println!("{} steps failed", summary.failed_steps());
//! ```

use crate::config::{DEFAULT_BULK_INSERT_SIZE, DEFAULT_WORKERS};
use crate::database::{
    AddressFamily, AsnStatsRepository, DatabaseConn, DbTarget, ObmpDatabase, StatKind,
};
use crate::lens::aspath::TransitCounter;
use anyhow::{anyhow, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

// =============================================================================
// Types
// =============================================================================

/// How transit prefix counts are computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TransitMode {
    /// Condition every distinct AS path (default)
    #[default]
    Path,
    /// Query the path analysis table per transit ASN
    Analysis,
}

impl std::fmt::Display for TransitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitMode::Path => write!(f, "path"),
            TransitMode::Analysis => write!(f, "analysis"),
        }
    }
}

/// Outcome of a single step of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Target column, e.g. `origin_v4_prefixes`
    pub step: String,
    /// Rows written, `None` if the step failed
    pub rows: Option<usize>,
    pub elapsed_ms: u128,
}

/// Summary of a statistics run
#[derive(Debug, Clone, Serialize)]
pub struct AsnStatsSummary {
    pub timestamp: i64,
    pub transit_mode: TransitMode,
    pub steps: Vec<StepOutcome>,
}

impl AsnStatsSummary {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.rows.is_none()).count()
    }
}

/// Per-ASN transit counts gathered by the worker pool
#[derive(Debug, Clone, Default)]
pub struct ParallelTransitCounts {
    pub counter: TransitCounter,
    /// ASNs whose query failed or whose worker had no connection
    pub failed: Vec<u32>,
}

// =============================================================================
// Args
// =============================================================================

/// Arguments for a statistics run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::Args))]
pub struct AsnStatsArgs {
    /// How transit prefixes are counted
    #[cfg_attr(feature = "cli", clap(long, value_enum, default_value = "path"))]
    #[serde(default)]
    pub transit_mode: TransitMode,

    /// Interval timestamp (unix seconds) to store, defaults to the start of the run
    #[cfg_attr(feature = "cli", clap(long))]
    pub timestamp: Option<i64>,
}

impl AsnStatsArgs {
    pub fn transit_mode(mut self, mode: TransitMode) -> Self {
        self.transit_mode = mode;
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

// =============================================================================
// Lens
// =============================================================================

/// ASN statistics lens
pub struct AsnStatsLens<'a> {
    db: &'a ObmpDatabase,
    target: &'a DbTarget,
    bulk_insert_size: usize,
    workers: usize,
}

impl<'a> AsnStatsLens<'a> {
    /// `target` is where worker threads open their own connections
    pub fn new(db: &'a ObmpDatabase, target: &'a DbTarget) -> Self {
        Self {
            db,
            target,
            bulk_insert_size: DEFAULT_BULK_INSERT_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn bulk_insert_size(mut self, size: usize) -> Self {
        self.bulk_insert_size = size.max(1);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    fn repo(&self) -> AsnStatsRepository<'_> {
        self.db.asn_stats()
    }

    /// Run all four steps
    pub fn run(&self, args: &AsnStatsArgs) -> AsnStatsSummary {
        let timestamp = args
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        info!(
            "updating asn stats for interval {} (transit mode: {})",
            timestamp, args.transit_mode
        );

        let mut steps = Vec::with_capacity(4);
        for family in [AddressFamily::Ipv4, AddressFamily::Ipv6] {
            let start = Instant::now();
            let rows = self.update_origin(family, timestamp);
            steps.push(Self::outcome(StatKind::Origin, family, rows, start));
        }
        for family in [AddressFamily::Ipv4, AddressFamily::Ipv6] {
            let start = Instant::now();
            let rows = self.update_transit(family, args.transit_mode, timestamp);
            steps.push(Self::outcome(StatKind::Transit, family, rows, start));
        }

        AsnStatsSummary {
            timestamp,
            transit_mode: args.transit_mode,
            steps,
        }
    }

    fn outcome(
        kind: StatKind,
        family: AddressFamily,
        rows: Option<usize>,
        start: Instant,
    ) -> StepOutcome {
        let step = kind.column(family);
        if rows.is_none() {
            error!("step {} failed, continuing", step);
        }
        StepOutcome {
            step,
            rows,
            elapsed_ms: start.elapsed().as_millis(),
        }
    }

    /// Count and store origin prefixes for one address family
    pub fn update_origin(&self, family: AddressFamily, timestamp: i64) -> Option<usize> {
        let counts = self.repo().origin_prefix_counts(family)?;
        self.repo().upsert_counts(
            StatKind::Origin,
            family,
            &counts,
            timestamp,
            self.bulk_insert_size,
        )
    }

    /// Count and store transit prefixes for one address family
    pub fn update_transit(
        &self,
        family: AddressFamily,
        mode: TransitMode,
        timestamp: i64,
    ) -> Option<usize> {
        let counter = match mode {
            TransitMode::Path => self
                .repo()
                .transit_prefix_counts(family, TransitCounter::new())?,
            TransitMode::Analysis => {
                let asns = self.repo().transit_asns()?;
                match transit_prefix_counts_parallel(self.target, family, &asns, self.workers) {
                    Ok(counts) if counts.failed.is_empty() => counts.counter,
                    Ok(counts) => {
                        warn!(
                            "{} of {} transit ASN queries failed",
                            counts.failed.len(),
                            asns.len()
                        );
                        return None;
                    }
                    Err(e) => {
                        error!("transit worker pool failed: {}", e);
                        return None;
                    }
                }
            }
        };

        // ASNs with no transit prefixes in this family are not stored
        let counts: Vec<(u32, u64)> = counter.iter().filter(|(_, c)| *c > 0).collect();
        self.repo().upsert_counts(
            StatKind::Transit,
            family,
            &counts,
            timestamp,
            self.bulk_insert_size,
        )
    }
}

/// ASNs handed to each worker so that `total` ASNs form at most `workers` chunks
pub fn worker_chunk_size(total: usize, workers: usize) -> usize {
    total.div_ceil(workers.max(1)).max(1)
}

/// Count transit prefixes per ASN over a fixed pool of `workers` threads
///
/// The ASN list is split into at most `workers` chunks and each chunk is
/// counted over a single connection to `target`, so no more than `workers`
/// connections are opened. The call returns once all ASNs have been processed.
pub fn transit_prefix_counts_parallel(
    target: &DbTarget,
    family: AddressFamily,
    asns: &[u32],
    workers: usize,
) -> Result<ParallelTransitCounts> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| anyhow!("Failed to build worker pool: {}", e))?;

    let start = Instant::now();
    let chunk_size = worker_chunk_size(asns.len(), workers);
    let results: Vec<(u32, Option<u64>)> = pool.install(|| {
        asns.par_chunks(chunk_size)
            .flat_map_iter(|chunk| {
                let conn = match DatabaseConn::connect(target) {
                    Ok(conn) => Some(conn),
                    Err(e) => {
                        error!("worker failed to connect: {}", e);
                        None
                    }
                };
                chunk
                    .iter()
                    .map(|asn| {
                        let count = conn.as_ref().and_then(|conn| {
                            AsnStatsRepository::new(conn)
                                .transit_prefix_count_for_asn(*asn, family)
                        });
                        (*asn, count)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    });
    info!(
        "counted {} transit prefixes for {} ASNs with {} workers in {:?}",
        family,
        asns.len(),
        workers,
        start.elapsed()
    );

    let mut counts = ParallelTransitCounts::default();
    for (asn, count) in results {
        match count {
            Some(c) => counts.counter.add(asn, c),
            None => counts.failed.push(asn),
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::openbmp::test_fixtures::{seeded_database, seeded_file_database};
    use crate::database::IN_MEMORY;

    #[test]
    fn test_run_path_mode() {
        let db = seeded_database();
        let target = DbTarget::new(IN_MEMORY);
        let lens = AsnStatsLens::new(&db, &target);

        let summary = lens.run(&AsnStatsArgs::default().timestamp(1_700_000_000));
        assert_eq!(summary.failed_steps(), 0);
        let steps: Vec<&str> = summary.steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(
            steps,
            vec![
                "origin_v4_prefixes",
                "origin_v6_prefixes",
                "transit_v4_prefixes",
                "transit_v6_prefixes"
            ]
        );

        let repo = db.asn_stats();
        let cf = repo.latest(13335).unwrap();
        assert!(cf.is_origin);
        assert!(!cf.is_transit);
        assert_eq!(cf.origin_v4_prefixes, 2);
        assert_eq!(cf.origin_v6_prefixes, 1);
        assert_eq!(cf.timestamp, 1_700_000_000);

        let lumen = repo.latest(3356).unwrap();
        assert!(lumen.is_transit);
        assert!(!lumen.is_origin);
        assert_eq!(lumen.transit_v4_prefixes, 4);
        assert_eq!(lumen.transit_v6_prefixes, 1);

        // peers only ever appear in the leftmost position
        assert!(repo.latest(174).is_none());
        assert!(repo.latest(64512).is_none());
    }

    #[test]
    fn test_run_is_idempotent_for_same_interval() {
        let db = seeded_database();
        let target = DbTarget::new(IN_MEMORY);
        let lens = AsnStatsLens::new(&db, &target).bulk_insert_size(1);
        let args = AsnStatsArgs::default().timestamp(1000);

        lens.run(&args);
        let rows = db.connection().table_count("gen_asn_stats");
        lens.run(&args);
        assert_eq!(db.connection().table_count("gen_asn_stats"), rows);
    }

    #[test]
    fn test_failed_steps_do_not_stop_the_run() {
        let db = ObmpDatabase::open_in_memory().unwrap();
        let target = DbTarget::new(IN_MEMORY);
        let summary = AsnStatsLens::new(&db, &target).run(&AsnStatsArgs::default());

        assert_eq!(summary.steps.len(), 4);
        assert_eq!(summary.failed_steps(), 4);
    }

    #[test]
    fn test_parallel_counts_match_path_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_file_database(dir.path());
        let target = DbTarget::new(path.as_str());

        let counts =
            transit_prefix_counts_parallel(&target, AddressFamily::Ipv4, &[3356, 1299, 7018], 3)
                .unwrap();
        assert!(counts.failed.is_empty());
        assert_eq!(counts.counter.get(3356), 4);
        assert_eq!(counts.counter.get(1299), 1);
        assert_eq!(counts.counter.get(7018), 0);
    }

    #[test]
    fn test_run_analysis_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_file_database(dir.path());
        let target = DbTarget::new(path.as_str());
        let db = ObmpDatabase::connect(&target).unwrap();

        let summary = AsnStatsLens::new(&db, &target)
            .workers(2)
            .run(&AsnStatsArgs::default().transit_mode(TransitMode::Analysis));
        assert_eq!(summary.failed_steps(), 0);

        let lumen = db.asn_stats().latest(3356).unwrap();
        assert_eq!(lumen.transit_v4_prefixes, 4);
        assert_eq!(lumen.transit_v6_prefixes, 1);
        assert_eq!(db.asn_stats().latest(1299).unwrap().transit_v6_prefixes, 0);
    }

    #[test]
    fn test_worker_chunks_never_exceed_workers() {
        for (total, workers) in [(0, 4), (1, 4), (3, 4), (7, 2), (100, 4), (101, 4), (5, 0)] {
            let size = worker_chunk_size(total, workers);
            let asns: Vec<u32> = (0..total as u32).collect();
            assert!(asns.chunks(size).count() <= workers.max(1));
            assert_eq!(asns.chunks(size).map(|c| c.len()).sum::<usize>(), total);
        }
    }

    #[test]
    fn test_parallel_counts_more_asns_than_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_file_database(dir.path());
        let target = DbTarget::new(path.as_str());

        let asns = [174, 1299, 2914, 3356, 7018, 13335, 15169];
        let counts =
            transit_prefix_counts_parallel(&target, AddressFamily::Ipv4, &asns, 2).unwrap();
        assert!(counts.failed.is_empty());
        assert_eq!(counts.counter.get(3356), 4);
        assert_eq!(counts.counter.get(1299), 1);
        assert_eq!(counts.counter.get(174), 0);
    }

    #[test]
    fn test_parallel_counts_without_database() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.sqlite3");
        let target = DbTarget::new(missing.to_str().unwrap());

        let counts =
            transit_prefix_counts_parallel(&target, AddressFamily::Ipv4, &[3356], 1).unwrap();
        assert_eq!(counts.failed, vec![3356]);
    }
}
