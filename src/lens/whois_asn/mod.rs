//! WHOIS ASN lens module
//!
//! This module provides the `WhoisAsnLens`, which walks the ASNs known to the
//! statistics table, looks each one up in the regional WHOIS registries and
//! stores the result in `gen_whois_asn`.
//!
//! Registries are tried in a fixed order (ARIN, RIPE, APNIC, AFRINIC, LACNIC,
//! NTT). The first response that yields an AS name wins. ASNs without any
//! answer are left untouched.
//!
//! Lookups are paced: after `max_requests_per_interval` ASNs the walk pauses
//! for `throttle_pause` before continuing.
//!
//! # Example
//!
//! ```rust,ignore
//! use obmp_cron::database::ObmpDatabase;
//! use obmp_cron::lens::whois_asn::{CommandWhoisClient, WhoisAsnArgs, WhoisAsnLens};
//!
//! let db = ObmpDatabase::connect(&target)?;
//! let lens = WhoisAsnLens::new(&db, CommandWhoisClient::default());
//! let summary = lens.run(&WhoisAsnArgs { missing_only: true, ..Default::default() });
//! ```

use crate::config::{DEFAULT_MAX_REQUESTS_PER_INTERVAL, DEFAULT_THROTTLE_PAUSE_SECS};
use crate::database::ObmpDatabase;
use crate::lens::aspath::is_reserved_asn;
use crate::lens::rpsl::{SourceFamily, WhoisField, WhoisParser, WhoisRecord};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Sources
// =============================================================================

/// WHOIS registry queried for AS objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhoisSource {
    Arin,
    Ripe,
    Apnic,
    Afrinic,
    Lacnic,
    Ntt,
}

impl WhoisSource {
    /// Sources in lookup order
    pub const ALL: [WhoisSource; 6] = [
        WhoisSource::Arin,
        WhoisSource::Ripe,
        WhoisSource::Apnic,
        WhoisSource::Afrinic,
        WhoisSource::Lacnic,
        WhoisSource::Ntt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WhoisSource::Arin => "arin",
            WhoisSource::Ripe => "ripe",
            WhoisSource::Apnic => "apnic",
            WhoisSource::Afrinic => "afrinic",
            WhoisSource::Lacnic => "lacnic",
            WhoisSource::Ntt => "ntt",
        }
    }

    pub fn host(&self) -> &'static str {
        match self {
            WhoisSource::Arin => "whois.arin.net",
            WhoisSource::Ripe => "whois.ripe.net",
            WhoisSource::Apnic => "whois.apnic.net",
            WhoisSource::Afrinic => "whois.afrinic.net",
            WhoisSource::Lacnic => "whois.lacnic.net",
            WhoisSource::Ntt => "rr.ntt.net",
        }
    }

    /// Output dialect of the source
    pub fn family(&self) -> SourceFamily {
        match self {
            WhoisSource::Arin => SourceFamily::Arin,
            WhoisSource::Lacnic => SourceFamily::LacnicLike,
            WhoisSource::Ripe | WhoisSource::Apnic | WhoisSource::Afrinic | WhoisSource::Ntt => {
                SourceFamily::RipeLike
            }
        }
    }
}

impl std::fmt::Display for WhoisSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Clients
// =============================================================================

/// Something that can answer a WHOIS query line by line
pub trait WhoisClient {
    /// Query `source` for `AS<asn>` and feed every response line to `parser`
    fn query(&self, source: WhoisSource, asn: u32, parser: &mut WhoisParser) -> Result<()>;
}

/// Client that runs the system `whois` command
#[derive(Debug, Clone)]
pub struct CommandWhoisClient {
    command: String,
}

impl Default for CommandWhoisClient {
    fn default() -> Self {
        Self::new("whois")
    }
}

impl CommandWhoisClient {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl WhoisClient for CommandWhoisClient {
    fn query(&self, source: WhoisSource, asn: u32, parser: &mut WhoisParser) -> Result<()> {
        let mut child = Command::new(self.command.as_str())
            .arg("-h")
            .arg(source.host())
            .arg(format!("AS{}", asn))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| anyhow!("Failed to run '{}': {}", self.command, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("No output from '{}'", self.command))?;

        if let Err(e) = feed_lines(BufReader::new(stdout), parser) {
            // reap the child before giving up on it
            if let Err(kill_err) = child.kill() {
                debug!("failed to kill '{}': {}", self.command, kill_err);
            }
            if let Err(wait_err) = child.wait() {
                debug!("failed to wait for '{}': {}", self.command, wait_err);
            }
            return Err(anyhow!("Failed to read output of '{}': {}", self.command, e));
        }

        let status = child.wait()?;
        if !status.success() {
            debug!("whois for AS{} at {} exited with {}", asn, source, status);
        }
        Ok(())
    }
}

/// Feed every line of `reader` to `parser`
///
/// Registries do not agree on an encoding, so lines are decoded lossily.
fn feed_lines<R: BufRead>(mut reader: R, parser: &mut WhoisParser) -> std::io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        parser.feed_line(String::from_utf8_lossy(&buf).as_ref());
    }
}

/// Look an ASN up, trying every source in order
///
/// Returns the first record whose response carried an AS name, with its
/// `source` set. A response with only an org ID moves on to the next source.
pub fn lookup<C: WhoisClient + ?Sized>(client: &C, asn: u32) -> Option<WhoisRecord> {
    for source in WhoisSource::ALL {
        let mut parser = WhoisParser::new(source.family());
        if let Err(e) = client.query(source, asn, &mut parser) {
            warn!("whois AS{} at {} failed: {}", asn, source, e);
            continue;
        }

        // checked before finish() fills in the org id fallback
        if !parser.collected(WhoisField::AsName) {
            continue;
        }

        let mut record = parser.finish();
        record.set(WhoisField::Source, source.name());
        return Some(record);
    }
    None
}

// =============================================================================
// Args
// =============================================================================

/// Arguments for a WHOIS walk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::Args))]
pub struct WhoisAsnArgs {
    /// Only look up ASNs that have no AS name stored yet
    #[cfg_attr(feature = "cli", clap(long))]
    #[serde(default)]
    pub missing_only: bool,

    /// Look up these ASNs instead of the ones in gen_asn_stats
    #[cfg_attr(feature = "cli", clap(long = "asn", value_name = "ASN"))]
    #[serde(default)]
    pub asns: Vec<u32>,
}

/// Result of a WHOIS walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WhoisAsnSummary {
    pub total: usize,
    pub updated: usize,
    pub not_found: usize,
    pub failed_writes: usize,
}

// =============================================================================
// Lens
// =============================================================================

pub struct WhoisAsnLens<'a, C> {
    db: &'a ObmpDatabase,
    client: C,
    max_requests_per_interval: usize,
    throttle_pause: Duration,
}

impl<'a, C: WhoisClient> WhoisAsnLens<'a, C> {
    pub fn new(db: &'a ObmpDatabase, client: C) -> Self {
        Self {
            db,
            client,
            max_requests_per_interval: DEFAULT_MAX_REQUESTS_PER_INTERVAL,
            throttle_pause: Duration::from_secs(DEFAULT_THROTTLE_PAUSE_SECS),
        }
    }

    pub fn throttle(mut self, max_requests_per_interval: usize, pause: Duration) -> Self {
        self.max_requests_per_interval = max_requests_per_interval.max(1);
        self.throttle_pause = pause;
        self
    }

    /// ASNs to walk for the given arguments
    pub fn asn_list(&self, args: &WhoisAsnArgs) -> Result<Vec<u32>> {
        if !args.asns.is_empty() {
            return Ok(args
                .asns
                .iter()
                .copied()
                .filter(|a| !is_reserved_asn(*a))
                .collect());
        }

        let asns = self
            .db
            .whois_asn()
            .asn_list(args.missing_only)
            .ok_or_else(|| anyhow!("Failed to load the ASN list"))?;
        info!("{} ASNs to look up", asns.len());
        Ok(asns)
    }

    /// Walk the ASN list
    pub fn run(&self, args: &WhoisAsnArgs) -> Result<WhoisAsnSummary> {
        self.run_with_progress(args, |_, _| {})
    }

    /// Walk the ASN list, reporting `(processed, total)` after every ASN
    pub fn run_with_progress<F>(
        &self,
        args: &WhoisAsnArgs,
        mut progress: F,
    ) -> Result<WhoisAsnSummary>
    where
        F: FnMut(usize, usize),
    {
        let asns = self.asn_list(args)?;
        let mut summary = WhoisAsnSummary {
            total: asns.len(),
            ..Default::default()
        };

        let mut requests = 0;
        for (idx, asn) in asns.iter().enumerate() {
            requests += 1;

            match lookup(&self.client, *asn) {
                Some(record) => match self.db.whois_asn().replace(*asn, &record) {
                    Some(_) => summary.updated += 1,
                    None => summary.failed_writes += 1,
                },
                None => {
                    debug!("no whois record found for AS{}", asn);
                    summary.not_found += 1;
                }
            }
            progress(idx + 1, summary.total);

            if requests >= self.max_requests_per_interval {
                info!(
                    "{}: processed {} of {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                    idx + 1,
                    summary.total
                );
                if !self.throttle_pause.is_zero() {
                    std::thread::sleep(self.throttle_pause);
                }
                requests = 0;
            }
        }

        Ok(summary)
    }
}
