use std::io::Write;

use anyhow::Context;
use themesync::config::SyncConfig;
use themesync::sync::backoff::BackoffController;
use themesync::sync::report::ErrorReporter;
use themesync::{DownloadOptions, Syncer, ThemeProject, UploadOptions};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Upload { delete: bool, wait_assets: bool },
    Download { delete: bool },
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut download = false;
    let mut delete = true;
    let mut wait_assets = false;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "upload" => download = false,
            "download" => download = true,
            "--no-delete" => delete = false,
            "--wait-assets" => wait_assets = true,
            "--help" | "-h" => return Ok(CliMode::Help),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(if download {
        CliMode::Download { delete }
    } else {
        CliMode::Upload {
            delete,
            wait_assets,
        }
    })
}

fn print_progress(pending: usize, total: usize) {
    let done = total.saturating_sub(pending);
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r[themesync] {done}/{total} files synced");
    if pending == 0 {
        let _ = writeln!(stderr);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("THEMESYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: themesync [upload|download] [--no-delete] [--wait-assets]");
        println!("  upload         Push local theme files to the store (default)");
        println!("  download       Pull remote theme files into the local root");
        println!("  --no-delete    Keep files that only exist on one side");
        println!("  --wait-assets  Wait for asset uploads and deletes to finish");
        return Ok(());
    }

    let config = SyncConfig::from_env()?;
    let client = config.client().context("invalid store configuration")?;
    let project = ThemeProject::open(&config.root)
        .with_context(|| format!("failed to open theme at {:?}", config.root))?;
    let syncer = Syncer::with_parts(
        client,
        project,
        BackoffController::new(config.backoff_interval),
        ErrorReporter::new(),
        config.verbose,
    );

    syncer.start(config.workers);
    syncer.reporter().set_delayed(true);
    let result = match mode {
        CliMode::Upload {
            delete,
            wait_assets,
        } => {
            let options = UploadOptions {
                delay_low_priority_files: !wait_assets,
                delete,
            };
            syncer
                .upload_theme_with_progress(options, print_progress)
                .await
        }
        CliMode::Download { delete } => {
            syncer
                .download_theme_with_progress(DownloadOptions { delete }, print_progress)
                .await
        }
        CliMode::Help => Ok(()),
    };
    syncer.reporter().flush();
    syncer.reporter().set_delayed(false);

    // Background uploads still need to land before the process exits.
    syncer.wait().await?;
    syncer.shutdown().await;
    result.context("theme sync failed")?;

    if syncer.reporter().has_any_error() {
        anyhow::bail!(
            "{} operation(s) failed",
            syncer.reporter().error_count()
        );
    }
    Ok(())
}
