use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use feishu_core::{AuthClient, DriveFile, FeishuClient};
use feishu_dl::config::{DEFAULT_OUTPUT_DIR, DownloaderConfig};
use feishu_dl::downloader::FolderDownloader;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Download files from a Feishu drive folder.
#[derive(Debug, Parser)]
#[command(name = "feishu-dl", version)]
#[command(about = "Download files from a Feishu drive folder")]
#[command(after_help = "Credentials are read from FEISHU_APP_ID and FEISHU_APP_SECRET (a .env file is honoured).

Examples:
  feishu-dl download DR8cfYq3XlTzq6d00r0cCq5rnDb
  feishu-dl download DR8cfYq3XlTzq6d00r0cCq5rnDb ./my-output
  feishu-dl list DR8cfYq3XlTzq6d00r0cCq5rnDb")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Show debug output.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Only print errors.
    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Download a folder tree, exporting online documents.
    Download {
        /// Token of the folder to download.
        folder_token: String,
        /// Local directory to write into.
        #[arg(default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
        /// Print the final summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the direct children of a folder.
    List {
        /// Token of the folder to list.
        folder_token: String,
    },
    /// Print metadata for a single file as JSON.
    Info {
        /// Token of the file.
        file_token: String,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("feishu_dl=debug,feishu_core=debug,info")
        } else {
            EnvFilter::new("feishu_dl=info,warn")
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = DownloaderConfig::from_env()?;
    let downloader = connect(&config).await?;

    match command {
        Command::Download {
            folder_token,
            output_dir,
            json,
        } => {
            info!("listing files in folder {folder_token}");
            let entries = downloader
                .list(&folder_token)
                .await
                .with_context(|| format!("failed to list folder {folder_token}"))?;
            print_listing(&entries);

            info!("downloading files to {}", output_dir.display());
            let report = downloader
                .download_entries(entries, &output_dir)
                .await
                .with_context(|| format!("failed to prepare {}", output_dir.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Download complete: {} downloaded, {} exported, {} folder(s), {} failed",
                    report.downloaded, report.exported, report.folders, report.failed
                );
            }
        }
        Command::List { folder_token } => {
            let entries = downloader
                .list(&folder_token)
                .await
                .with_context(|| format!("failed to list folder {folder_token}"))?;
            print_listing(&entries);
        }
        Command::Info { file_token } => {
            let metadata = downloader
                .client()
                .get_file_metadata(&file_token)
                .await
                .with_context(|| format!("failed to get metadata for {file_token}"))?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
    }
    Ok(())
}

async fn connect(config: &DownloaderConfig) -> anyhow::Result<FolderDownloader> {
    info!("getting access token");
    let auth = AuthClient::with_base_url(&config.api_base, &config.app_id, &config.app_secret)?;
    let token = auth
        .tenant_access_token()
        .await
        .context("failed to get tenant access token")?;
    info!("access token obtained: {}", token.redacted());

    let client = FeishuClient::with_base_url(&config.api_base, token.access_token)?;
    Ok(FolderDownloader::new(client)
        .with_page_size(config.page_size)
        .with_poller(config.export_poller()))
}

fn print_listing(entries: &[DriveFile]) {
    println!("Found {} item(s):", entries.len());
    for line in listing_lines(entries) {
        println!("  {line}");
    }
}

fn listing_lines(entries: &[DriveFile]) -> Vec<String> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let kind = if entry.file_type.is_empty() {
                "UNKNOWN".to_string()
            } else {
                entry.file_type.to_uppercase()
            };
            format!(
                "{}. [{kind}] {} (token: {})",
                i + 1,
                entry.name.as_deref().unwrap_or_default(),
                entry.token
            )
        })
        .collect()
}
