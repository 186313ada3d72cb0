use clap::Args;
use obmp_cron::{ConnectError, DbTarget, ObmpDatabase};
use serde::Serialize;
use tracing::debug;

pub mod asn_stats;
pub mod whois_asn;
pub mod whois_route;

/// Database connection arguments shared by every job
#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// Database user
    #[clap(short, long)]
    pub user: Option<String>,

    /// Database password
    #[clap(short, long)]
    pub password: Option<String>,

    /// Create missing OpenBMP source tables before running
    #[clap(long)]
    pub init_schema: bool,

    /// Database to connect to (SQLite file path, or :memory:)
    #[clap(value_name = "DATABASE")]
    pub database: String,
}

impl DbArgs {
    pub fn target(&self) -> DbTarget {
        DbTarget::new(self.database.as_str())
            .with_credentials(self.user.clone(), self.password.clone())
    }
}

/// Connect and create the output tables, exiting on failure
pub fn open_database(args: &DbArgs) -> (ObmpDatabase, DbTarget) {
    let target = args.target();
    if target.user.is_some() || target.password.is_some() {
        debug!("credentials are not used by the SQLite backend");
    }

    let db = match ObmpDatabase::connect(&target) {
        Ok(db) => db,
        Err(ConnectError::AccessDenied(path)) => {
            eprintln!("ERROR: access denied to '{}', check the user and password", path);
            std::process::exit(2);
        }
        Err(ConnectError::UnknownDatabase(path)) => {
            eprintln!("ERROR: '{}' is not an OpenBMP database", path);
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(2);
        }
    };

    if args.init_schema {
        if let Err(e) = db.initialize_source_tables() {
            eprintln!("ERROR: failed to create source tables: {}", e);
            std::process::exit(1);
        }
    }
    if let Err(e) = db.initialize() {
        eprintln!("ERROR: failed to create output tables: {}", e);
        std::process::exit(1);
    }

    (db, target)
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("ERROR: failed to serialize output: {}", e),
    }
}
