use clap::{Parser, Subcommand};
use obmp_cron::ObmpCronConfig;
use tracing::Level;

mod commands;

use commands::asn_stats::AsnStatsCmdArgs;
use commands::whois_asn::WhoisAsnCmdArgs;
use commands::whois_route::WhoisRouteCmdArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.obmp-cron/obmp-cron.toml is used
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Print debug information
    #[clap(long, global = true)]
    debug: bool,

    /// Print the run summary as JSON
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count origin and transit prefixes per ASN into gen_asn_stats
    AsnStats(AsnStatsCmdArgs),

    /// Look up ASNs in the regional WHOIS registries into gen_whois_asn
    WhoisAsn(WhoisAsnCmdArgs),

    /// Import route objects from Routing Registry dumps into gen_whois_route
    WhoisRoute(WhoisRouteCmdArgs),
}

fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match ObmpCronConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::AsnStats(args) => commands::asn_stats::run(&config, args, cli.json),
        Commands::WhoisAsn(args) => commands::whois_asn::run(&config, args, cli.json),
        Commands::WhoisRoute(args) => commands::whois_route::run(&config, args, cli.json),
    }
}
