use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use obmp_cron::lens::whois_asn::{CommandWhoisClient, WhoisAsnArgs, WhoisAsnLens};
use obmp_cron::ObmpCronConfig;

use super::{open_database, print_json, DbArgs};

/// Arguments for the WhoisAsn command
#[derive(Args)]
pub struct WhoisAsnCmdArgs {
    #[clap(flatten)]
    pub db: DbArgs,

    #[clap(flatten)]
    pub whois: WhoisAsnArgs,

    /// Hide the progress bar
    #[clap(short, long)]
    pub quiet: bool,
}

pub fn run(config: &ObmpCronConfig, args: WhoisAsnCmdArgs, json_output: bool) {
    let WhoisAsnCmdArgs { db, whois, quiet } = args;
    let (database, _) = open_database(&db);

    let lens = WhoisAsnLens::new(
        &database,
        CommandWhoisClient::new(config.whois_command.as_str()),
    )
    .throttle(config.max_requests_per_interval, config.throttle_pause());

    let pb = if quiet || json_output {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {eta}",
        ) {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    };

    let result = lens.run_with_progress(&whois, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();

    let summary = match result {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        print_json(&summary);
    } else {
        println!(
            "Looked up {} ASNs: {} updated, {} not found, {} failed writes",
            summary.total, summary.updated, summary.not_found, summary.failed_writes
        );
    }
}
