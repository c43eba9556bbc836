//! Main entry point for the zipknit CLI application.
//!
//! Merges the zip files named on the command line into a single zip file
//! written to stdout or to the `-o` path.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::process::ExitCode;
use tokio::io::{AsyncWrite, BufWriter};

use zipknit::io::open_input;
use zipknit::{Cli, KnitSummary, MergeError, ZipKnitter};

/// Application entry point.
///
/// Parses command-line arguments, sets up logging, and maps any failure to
/// the exit code of its error kind.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();

    match run(&cli).await {
        Ok(summary) => {
            info!(
                "{} entries, {} bytes{}",
                summary.total_entries,
                summary.output_size,
                if summary.zip64 { " (Zip64)" } else { "" }
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#} -- aborting");
            let code = err
                .downcast_ref::<MergeError>()
                .map(MergeError::exit_code)
                .unwrap_or(2);
            ExitCode::from(code)
        }
    }
}

/// Open the requested sink and merge every input into it.
async fn run(cli: &Cli) -> Result<KnitSummary> {
    match &cli.output {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("could not create {}", path.display()))?;
            knit(cli, BufWriter::new(file)).await
        }
        None => knit(cli, BufWriter::new(tokio::io::stdout())).await,
    }
}

/// Add each input in command-line order, then finish the archive.
///
/// Each input is closed before the next one is opened.
async fn knit<W: AsyncWrite + Unpin>(cli: &Cli, writer: W) -> Result<KnitSummary> {
    let mut knitter = ZipKnitter::new(writer);

    for input in &cli.inputs {
        let reader = open_input(input).await.map_err(|source| MergeError::Open {
            path: input.clone(),
            source,
        })?;
        knitter.add_archive(&*reader, input).await?;
    }

    let (summary, _writer) = knitter.finish().await?;
    Ok(summary)
}
