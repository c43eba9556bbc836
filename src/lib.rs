//! # zipknit
//!
//! Merge zip archives into a single archive without decompressing or
//! recompressing any entry.
//!
//! Local entries are copied byte for byte from each input, in order. The
//! central directory headers are collected in memory and their local header
//! offsets rewritten for the entries' new positions, then written out with
//! fresh end records once every input has been added.
//!
//! ## Features
//!
//! - Merge any number of archives, including none (an empty archive results)
//! - Inputs from the local filesystem or HTTP/HTTPS URLs using Range requests
//! - Zip64 input, and Zip64 output whenever the merged size or entry count
//!   calls for it
//! - Agnostic to compression method and entry encryption
//! - Warnings for entry names that occur more than once
//!
//! ## Example
//!
//! ```no_run
//! use zipknit::{MemoryReader, ZipKnitter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let first = MemoryReader::new(std::fs::read("first.zip")?);
//!     let second = MemoryReader::new(std::fs::read("second.zip")?);
//!
//!     let mut knitter = ZipKnitter::new(Vec::<u8>::new());
//!     knitter.add_archive(&first, "first.zip").await?;
//!     knitter.add_archive(&second, "second.zip").await?;
//!
//!     let (summary, merged) = knitter.finish().await?;
//!     assert_eq!(merged.len() as u64, summary.output_size);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use crate::cli::Cli;
pub use crate::error::{ErrorKind, MalformedReason, MergeError};
pub use crate::io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use crate::zip::{ArchiveLayout, ArchiveSummary, KnitSummary, ZipKnitter};
