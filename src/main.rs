use clap::Parser;
use panelmon::{AllInfo, Config, SystemHost, SystemLink};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "panelmon")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Print a single snapshot and exit.
    #[arg(long)]
    once: bool,
    /// Emit snapshots as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load_or_default(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    info!(
        config = %cli.config,
        interval = %humantime::format_duration(cfg.interval),
        "starting panelmon"
    );

    let host = Arc::new(SystemHost::new(cfg.command_timeout));
    let mut link = SystemLink::with_config(host, &cfg);

    if cli.once {
        let all = link.get_all_info().await;
        print_snapshot(&all, cli.json);
        return;
    }

    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    error!(error = %err, "failed to wait for Ctrl+C");
                }
                info!("received Ctrl+C, shutting down");
                break;
            }
            _ = ticker.tick() => {
                let all = link.get_all_info().await;
                print_snapshot(&all, cli.json);
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_snapshot(all: &AllInfo, json: bool) {
    if json {
        match serde_json::to_string(all) {
            Ok(line) => println!("{line}"),
            Err(err) => error!(error = %err, "failed to serialize snapshot"),
        }
    } else {
        println!("{}\n", all.render_text());
    }
}
