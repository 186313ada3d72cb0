use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BULK_INSERT_SIZE: usize = 2000;
pub const DEFAULT_MAX_REQUESTS_PER_INTERVAL: usize = 200;
pub const DEFAULT_THROTTLE_PAUSE_SECS: u64 = 5;
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct ObmpCronConfig {
    /// Directory for downloaded RR dumps
    pub data_dir: String,

    /// Maximum rows per bulk insert statement
    pub bulk_insert_size: usize,

    /// Command used to query WHOIS servers
    pub whois_command: String,

    /// WHOIS lookups before pausing
    pub max_requests_per_interval: usize,

    /// Pause between WHOIS request intervals in seconds
    pub throttle_pause_secs: u64,

    /// Worker threads for the per-ASN transit queries
    pub workers: usize,
}

const EMPTY_CONFIG: &str = r#"### obmp-cron configuration file

### directory for downloaded routing registry dumps
# data_dir = "~/.obmp-cron"

### rows per bulk insert statement
# bulk_insert_size = 2000

### whois lookups
# whois_command = "whois"
# max_requests_per_interval = 200
# throttle_pause_secs = 5

### worker threads for transit counting in analysis mode
# workers = 4
"#;

impl Default for ObmpCronConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            data_dir: format!("{}/.obmp-cron", home_dir),
            bulk_insert_size: DEFAULT_BULK_INSERT_SIZE,
            whois_command: "whois".to_string(),
            max_requests_per_interval: DEFAULT_MAX_REQUESTS_PER_INTERVAL,
            throttle_pause_secs: DEFAULT_THROTTLE_PAUSE_SECS,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl ObmpCronConfig {
    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<ObmpCronConfig> {
        let mut builder = Config::builder();

        // By default use $HOME/.obmp-cron/obmp-cron.toml as the configuration file path
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();

        let cron_dir = format!("{}/.obmp-cron", home_dir.as_str());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(cron_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create obmp-cron directory: {}", e))?;
                let p = format!("{}/obmp-cron.toml", cron_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g., `OBMP_CRON_WORKERS=8 obmp-cron asn-stats ...`
        builder = builder.add_source(config::Environment::with_prefix("OBMP_CRON"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config, cron_dir.as_str())
    }

    /// Build the configuration from flat key/value settings
    ///
    /// Missing or unparsable numbers fall back to their defaults.
    pub fn from_map(config: &HashMap<String, String>, default_data_dir: &str) -> Result<Self> {
        let data_dir = match config.get("data_dir") {
            Some(p) => match p.strip_prefix("~/") {
                Some(rest) => {
                    let home =
                        dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
                    home.join(rest).to_string_lossy().to_string()
                }
                None => p.to_string(),
            },
            None => default_data_dir.to_string(),
        };

        let bulk_insert_size = config
            .get("bulk_insert_size")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BULK_INSERT_SIZE);

        let whois_command = config
            .get("whois_command")
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| "whois".to_string());

        let max_requests_per_interval = config
            .get("max_requests_per_interval")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_REQUESTS_PER_INTERVAL);

        let throttle_pause_secs = config
            .get("throttle_pause_secs")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_THROTTLE_PAUSE_SECS);

        let workers = config
            .get("workers")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_WORKERS);

        Ok(ObmpCronConfig {
            data_dir,
            bulk_insert_size,
            whois_command,
            max_requests_per_interval,
            throttle_pause_secs,
            workers,
        })
    }

    /// Get the WHOIS throttle pause as Duration
    pub fn throttle_pause(&self) -> Duration {
        Duration::from_secs(self.throttle_pause_secs)
    }

    /// Directory that RR dumps are downloaded into
    pub fn download_dir(&self) -> String {
        format!("{}/rr_dbase", self.data_dir.trim_end_matches('/'))
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        [
            format!("Data Directory:        {}", self.data_dir),
            format!("Bulk Insert Size:      {}", self.bulk_insert_size),
            format!("WHOIS Command:         {}", self.whois_command),
            format!("Requests per Interval: {}", self.max_requests_per_interval),
            format!("Throttle Pause:        {} seconds", self.throttle_pause_secs),
            format!("Workers:               {}", self.workers),
        ]
        .join("\n")
    }
}
