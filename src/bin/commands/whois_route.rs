use clap::Args;
use obmp_cron::lens::whois_route::{WhoisRouteArgs, WhoisRouteLens};
use obmp_cron::ObmpCronConfig;

use super::{open_database, print_json, DbArgs};

/// Arguments for the WhoisRoute command
#[derive(Args)]
pub struct WhoisRouteCmdArgs {
    #[clap(flatten)]
    pub db: DbArgs,

    #[clap(flatten)]
    pub route: WhoisRouteArgs,
}

pub fn run(config: &ObmpCronConfig, args: WhoisRouteCmdArgs, json_output: bool) {
    let WhoisRouteCmdArgs { db, route } = args;
    let (database, _) = open_database(&db);

    let download_dir = config.download_dir();
    let lens = WhoisRouteLens::new(&database, download_dir.as_str())
        .bulk_insert_size(config.bulk_insert_size);

    let summary = match lens.run(&route) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        print_json(&summary);
    } else {
        for import in &summary.imports {
            match (&import.stats, &import.error) {
                (Some(stats), _) => println!(
                    "  {:<12} {:>9} routes written ({} failed batches)",
                    import.source, stats.written, stats.failed_batches
                ),
                (None, Some(err)) => println!("  {:<12} FAILED: {}", import.source, err),
                (None, None) => println!("  {:<12} skipped", import.source),
            }
        }
        println!(
            "Imported {} route objects from {} dumps",
            summary.routes_written(),
            summary.imports.len()
        );
    }

    if summary.failed() > 0 && summary.failed() == summary.imports.len() {
        std::process::exit(1);
    }
}
