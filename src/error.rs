//! Error types for the merge engine.

use std::io;

use thiserror::Error;

/// Broad classes of failure, used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening, seeking or reading an input failed.
    IoRead,
    /// Writing the output failed, or the output grew past 64-bit offsets.
    IoWrite,
    /// An input archive is corrupt or uses an unsupported feature.
    MalformedInput,
    /// An allocation failed or an input holds more entries than fit in memory.
    ResourceExhaustion,
}

/// Why an input archive was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("not a zip file")]
    NotAZipFile,
    #[error("cannot process split or spanned zip file")]
    SplitOrSpanned,
    #[error("cannot process encrypted or compressed central directory")]
    EncryptedCentralDirectory,
    #[error("no end record found")]
    NoEndRecord,
    #[error("central directory overlaps end record")]
    CentralDirectoryOverlapsEnd,
    #[error("missing central directory signature")]
    MissingCentralSignature,
    #[error("missing zip64 extra field")]
    MissingZip64Extra,
    #[error("invalid zip64 extra field")]
    InvalidZip64Extra,
    #[error("extra field too large to add Zip64 field")]
    ExtraFieldTooLarge,
    #[error("central directory does not reach end record")]
    CentralDirectoryShort,
    #[error("first entry not at start of file")]
    FirstEntryNotAtStart,
    #[error("invalid central offsets")]
    InvalidCentralOffsets,
    #[error("invalid local header")]
    InvalidLocalHeader,
    #[error("local header offset lies before the first entry")]
    OffsetOverflow,
}

/// Errors raised while merging archives.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("{path}: could not open")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path}: could not read")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("error writing output")]
    Write(#[source] io::Error),

    #[error("{0} too large for 64-bit output")]
    OutputOverflow(&'static str),

    #[error("{path}: {reason}")]
    Malformed {
        path: String,
        reason: MalformedReason,
    },

    #[error("out of memory on a {requested} byte request")]
    OutOfMemory { requested: usize },

    #[error("{path}: too many entries to process in memory ({entries})")]
    TooManyEntries { path: String, entries: u64 },

    /// An earlier input failed, so the output is incomplete.
    #[error("merge abandoned after an earlier error")]
    Abandoned,
}

impl MergeError {
    pub(crate) fn malformed(path: &str, reason: MalformedReason) -> Self {
        MergeError::Malformed {
            path: path.to_string(),
            reason,
        }
    }

    pub(crate) fn read(path: &str, source: io::Error) -> Self {
        MergeError::Read {
            path: path.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::Open { .. } | MergeError::Read { .. } => ErrorKind::IoRead,
            MergeError::Write(_) | MergeError::OutputOverflow(_) | MergeError::Abandoned => {
                ErrorKind::IoWrite
            }
            MergeError::Malformed { .. } => ErrorKind::MalformedInput,
            MergeError::OutOfMemory { .. } | MergeError::TooManyEntries { .. } => {
                ErrorKind::ResourceExhaustion
            }
        }
    }

    /// The malformed-input reason, if this is a malformed-input error.
    pub fn reason(&self) -> Option<MalformedReason> {
        match self {
            MergeError::Malformed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::IoRead => 1,
            ErrorKind::IoWrite => 2,
            ErrorKind::MalformedInput => 3,
            ErrorKind::ResourceExhaustion => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
