use clap::Args;
use obmp_cron::lens::asn_stats::{AsnStatsArgs, AsnStatsLens};
use obmp_cron::ObmpCronConfig;

use super::{open_database, print_json, DbArgs};

/// Arguments for the AsnStats command
#[derive(Args)]
pub struct AsnStatsCmdArgs {
    #[clap(flatten)]
    pub db: DbArgs,

    #[clap(flatten)]
    pub stats: AsnStatsArgs,

    /// Worker threads for analysis mode (default from the config file)
    #[clap(short, long)]
    pub workers: Option<usize>,
}

pub fn run(config: &ObmpCronConfig, args: AsnStatsCmdArgs, json_output: bool) {
    let AsnStatsCmdArgs { db, stats, workers } = args;
    let (database, target) = open_database(&db);

    let lens = AsnStatsLens::new(&database, &target)
        .bulk_insert_size(config.bulk_insert_size)
        .workers(workers.unwrap_or(config.workers));

    let summary = lens.run(&stats);

    if json_output {
        print_json(&summary);
    } else {
        println!(
            "ASN statistics at {} (transit mode: {})",
            summary.timestamp, summary.transit_mode
        );
        for step in &summary.steps {
            match step.rows {
                Some(rows) => println!(
                    "  {:<22} {:>8} rows  {:>6} ms",
                    step.step, rows, step.elapsed_ms
                ),
                None => println!("  {:<22}   FAILED  {:>6} ms", step.step, step.elapsed_ms),
            }
        }
    }

    if summary.failed_steps() > 0 {
        std::process::exit(1);
    }
}
