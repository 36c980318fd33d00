use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dimse::DcmtkConnector;
use study_sender::config::Config;
use study_sender::logging::init_logging;
use study_sender::sender::DicomSender;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(
    name = "study-sender",
    about = "Send pending DICOM studies to a Storage SCP"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Send every pending study to the configured destination
    Send {
        /// Override the configured worker count
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// C-ECHO the configured destination
    Echo,
    /// Register a study directory as pending
    Register { dir: PathBuf },
    /// List registered studies
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(&config.logging)?;

    let sender = Arc::new(DicomSender::from_config(
        &config,
        Arc::new(DcmtkConnector::new()),
    )?);

    match cli.cmd {
        Cmd::Send { threads } => {
            let threads = threads.unwrap_or(config.sender.threads);
            let handle = sender.start_send(config.destination.clone(), threads);

            let on_interrupt = sender.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            ticker.tick().await;
            while !handle.is_finished() {
                tokio::select! {
                    _ = ticker.tick() => {
                        let progress = sender.progress();
                        tracing::info!(
                            progress = %serde_json::to_string(&progress)?,
                            "{} of {} studies sent",
                            progress.studies_sent,
                            progress.studies_queued
                        );
                    }
                    _ = tokio::time::sleep(Duration::from_millis(250)) => {}
                }
            }

            let summary = handle.join().await?;
            tracing::info!(
                "Done: {} sent, {} left pending, {} instances",
                summary.studies_sent(),
                summary.studies_unfinished(),
                summary.instances_sent()
            );
            if summary.studies_unfinished() > 0 {
                std::process::exit(2);
            }
            Ok(())
        }
        Cmd::Echo => {
            let ok = sender.echo(&config.destination).await;
            println!(
                "C-ECHO {} {}",
                config.destination,
                if ok { "succeeded" } else { "failed" }
            );
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Cmd::Register { dir } => {
            let registration = sender.register_study(&dir).await?;
            println!(
                "Registered {} ({} instances) at {}",
                registration.study_uid,
                registration.instances,
                registration.path.display()
            );
            Ok(())
        }
        Cmd::List => {
            for study in sender.studies().await? {
                println!(
                    "{}\t{}\t{}",
                    study.study_uid,
                    if study.pending { "pending" } else { "sent" },
                    study.path.display()
                );
            }
            Ok(())
        }
    }
}
