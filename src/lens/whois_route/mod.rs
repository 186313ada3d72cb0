//! WHOIS route lens module
//!
//! This module provides the `WhoisRouteLens`, which imports `route` and
//! `route6` objects from Routing Registry database dumps into
//! `gen_whois_route`.
//!
//! Dumps are fetched from the registries' FTP sites listed in [`RR_SOURCES`].
//! Compressed dumps are decompressed while downloading, so the files left in
//! the download directory are always plain text.
//!
//! # Feature Requirements
//!
//! Downloading and reading dump files requires the `remote` feature (`oneio`).
//! [`WhoisRouteLens::import_reader`] is always available.
//!
//! # Example
//!
//! ```rust,ignore
//! use obmp_cron::lens::whois_route::{WhoisRouteArgs, WhoisRouteLens};
//!
//! let lens = WhoisRouteLens::new(&db, "/tmp/rr_dbase");
//! let summary = lens.run(&WhoisRouteArgs {
//!     sources: vec!["radb".to_string()],
//!     ..Default::default()
//! })?;
//! ```

use crate::config::DEFAULT_BULK_INSERT_SIZE;
use crate::database::{BulkWriteStats, ObmpDatabase, RouteBulkWriter};
use crate::lens::rpsl::RouteObjects;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tracing::warn;

#[cfg(feature = "remote")]
use crate::database::ensure_data_dir;
#[cfg(feature = "remote")]
use anyhow::{anyhow, Result};
#[cfg(feature = "remote")]
use std::io::BufReader;
#[cfg(feature = "remote")]
use tracing::info;

// =============================================================================
// Sources
// =============================================================================

/// A Routing Registry dump published over FTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RrSource {
    pub name: &'static str,
    pub site: &'static str,
    pub path: &'static str,
    pub filename: &'static str,
}

impl RrSource {
    pub fn url(&self) -> String {
        format!("ftp://{}{}{}", self.site, self.path, self.filename)
    }

    /// Name of the decompressed dump in the download directory
    pub fn local_filename(&self) -> &'static str {
        self.filename.strip_suffix(".gz").unwrap_or(self.filename)
    }
}

pub static RR_SOURCES: [RrSource; 11] = [
    RrSource {
        name: "nttcom",
        site: "rr1.ntt.net",
        path: "/nttcomRR/",
        filename: "nttcom.db.gz",
    },
    RrSource {
        name: "level3",
        site: "rr.Level3.net",
        path: "/pub/rr/",
        filename: "level3.db.gz",
    },
    RrSource {
        name: "savvis",
        site: "ftp.radb.net",
        path: "/radb/dbase/",
        filename: "savvis.db.gz",
    },
    RrSource {
        name: "radb",
        site: "ftp.radb.net",
        path: "/radb/dbase/",
        filename: "radb.db.gz",
    },
    RrSource {
        name: "arin",
        site: "ftp.arin.net",
        path: "/pub/rr/",
        filename: "arin.db",
    },
    RrSource {
        name: "afrinic",
        site: "ftp.afrinic.net",
        path: "/pub/dbase/",
        filename: "afrinic.db.gz",
    },
    RrSource {
        name: "apnic",
        site: "ftp.apnic.net",
        path: "/pub/apnic/whois/",
        filename: "apnic.db.route.gz",
    },
    RrSource {
        name: "jpirr",
        site: "ftp.radb.net",
        path: "/radb/dbase/",
        filename: "jpirr.db.gz",
    },
    RrSource {
        name: "apnic_v6",
        site: "ftp.apnic.net",
        path: "/pub/apnic/whois/",
        filename: "apnic.db.route6.gz",
    },
    RrSource {
        name: "ripe",
        site: "ftp.ripe.net",
        path: "/ripe/dbase/split/",
        filename: "ripe.db.route.gz",
    },
    RrSource {
        name: "ripe_v6",
        site: "ftp.ripe.net",
        path: "/ripe/dbase/split/",
        filename: "ripe.db.route6.gz",
    },
];

/// Find a registry by name (case-insensitive)
pub fn find_source(name: &str) -> Option<&'static RrSource> {
    RR_SOURCES
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
}

// =============================================================================
// Args
// =============================================================================

/// Arguments for a route import
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::Args))]
pub struct WhoisRouteArgs {
    /// Only import these registries, e.g. radb or ripe_v6 (default: all)
    #[cfg_attr(feature = "cli", clap(long = "source", value_name = "NAME"))]
    #[serde(default)]
    pub sources: Vec<String>,

    /// Import a local RR dump instead of downloading
    #[cfg_attr(feature = "cli", clap(long, value_name = "PATH"))]
    pub file: Option<String>,

    /// Keep downloaded dumps after importing
    #[cfg_attr(feature = "cli", clap(long))]
    #[serde(default)]
    pub keep_files: bool,
}

/// Import result for one dump
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    /// Registry name, or the file path for local imports
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<BulkWriteStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a route import run
#[derive(Debug, Clone, Default, Serialize)]
pub struct WhoisRouteSummary {
    pub imports: Vec<ImportOutcome>,
}

impl WhoisRouteSummary {
    pub fn routes_written(&self) -> usize {
        self.imports
            .iter()
            .filter_map(|i| i.stats.as_ref())
            .map(|s| s.written)
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.imports.iter().filter(|i| i.error.is_some()).count()
    }
}

// =============================================================================
// Lens
// =============================================================================

pub struct WhoisRouteLens<'a> {
    db: &'a ObmpDatabase,
    download_dir: String,
    bulk_insert_size: usize,
}

impl<'a> WhoisRouteLens<'a> {
    pub fn new(db: &'a ObmpDatabase, download_dir: &str) -> Self {
        Self {
            db,
            download_dir: download_dir.to_string(),
            bulk_insert_size: DEFAULT_BULK_INSERT_SIZE,
        }
    }

    pub fn bulk_insert_size(mut self, size: usize) -> Self {
        self.bulk_insert_size = size.max(1);
        self
    }

    pub fn download_dir(&self) -> &str {
        self.download_dir.as_str()
    }

    /// Import the route objects of a dump
    ///
    /// Bytes that are not valid UTF-8 are replaced. A read error ends the
    /// import; everything parsed up to that point is still written.
    pub fn import_reader<R: BufRead>(&self, reader: R) -> BulkWriteStats {
        let lines = reader.split(b'\n').map_while(|line| match line {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!("stopped reading dump: {}", e);
                None
            }
        });

        let mut writer = RouteBulkWriter::new(self.db.connection(), self.bulk_insert_size);
        for record in RouteObjects::new(lines) {
            writer.push(record);
        }
        writer.finish()
    }
}

#[cfg(feature = "remote")]
impl WhoisRouteLens<'_> {
    /// Import a dump file; `.gz` files are decompressed
    pub fn import_file(&self, path: &str) -> Result<BulkWriteStats> {
        info!("parsing {}", path);
        let reader = oneio::get_reader(path)
            .map_err(|e| anyhow!("Failed to open dump '{}': {}", path, e))?;
        let stats = self.import_reader(BufReader::new(reader));
        info!(
            "imported {} route objects from {} ({} failed batches)",
            stats.written, path, stats.failed_batches
        );
        Ok(stats)
    }

    /// Download a registry dump into `dir`, returning the local path
    pub fn download(&self, source: &RrSource, dir: &str) -> Result<String> {
        let url = source.url();
        let local = format!("{}/{}", dir.trim_end_matches('/'), source.local_filename());
        info!("downloading {} from {}", source.name, url);

        let mut reader = oneio::get_reader(url.as_str())
            .map_err(|e| anyhow!("Failed to download {}: {}", url, e))?;
        let mut file = std::fs::File::create(local.as_str())
            .map_err(|e| anyhow!("Failed to create {}: {}", local, e))?;
        let bytes = std::io::copy(&mut reader, &mut file)
            .map_err(|e| anyhow!("Failed to download {}: {}", url, e))?;

        info!("done downloading {} ({} bytes)", source.name, bytes);
        Ok(local)
    }

    /// Sources selected by name, all of them when none are given
    pub fn select_sources(names: &[String]) -> Result<Vec<&'static RrSource>> {
        if names.is_empty() {
            return Ok(RR_SOURCES.iter().collect());
        }
        names
            .iter()
            .map(|n| find_source(n).ok_or_else(|| anyhow!("Unknown RR source '{}'", n)))
            .collect()
    }

    /// Download and import the selected dumps, or import a local file
    pub fn run(&self, args: &WhoisRouteArgs) -> Result<WhoisRouteSummary> {
        let mut summary = WhoisRouteSummary::default();

        if let Some(file) = &args.file {
            let stats = self.import_file(file)?;
            summary.imports.push(ImportOutcome {
                source: file.clone(),
                stats: Some(stats),
                error: None,
            });
            return Ok(summary);
        }

        let sources = Self::select_sources(&args.sources)?;
        ensure_data_dir(self.download_dir.as_str())?;

        for source in sources {
            let result = self
                .download(source, self.download_dir.as_str())
                .and_then(|path| self.import_file(path.as_str()));
            let outcome = match result {
                Ok(stats) => ImportOutcome {
                    source: source.name.to_string(),
                    stats: Some(stats),
                    error: None,
                },
                Err(e) => {
                    warn!("skipping {}: {}", source.name, e);
                    ImportOutcome {
                        source: source.name.to_string(),
                        stats: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            summary.imports.push(outcome);
        }

        if !args.keep_files {
            if let Err(e) = std::fs::remove_dir_all(self.download_dir.as_str()) {
                warn!("failed to remove {}: {}", self.download_dir, e);
            }
        }

        Ok(summary)
    }
}
