use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "zipknit")]
#[command(version)]
#[command(about = "Merge zip files into one zip file without recompressing", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipknit a.zip b.zip c.zip > all.zip     merge three archives to stdout\n  \
  zipknit -o all.zip a.zip https://example.com/b.zip   merge a local and a remote archive\n  \
  zipknit > empty.zip                     write an empty zip file")]
pub struct Cli {
    /// ZIP files or HTTP URLs to merge, in order
    #[arg(value_name = "FILES")]
    pub inputs: Vec<String>,

    /// Write the merged archive to FILE instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Verbose mode (-vv => more verbose)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    /// Log level picked by the -v and -q counts; warnings by default
    pub fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (q, _) if q > 1 => LevelFilter::Off,
            (1, _) => LevelFilter::Error,
            (_, 0) => LevelFilter::Warn,
            (_, 1) => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}
