//! Finding the central directory of an input archive.
//!
//! The end of central directory record is normally the last 22 bytes of
//! the file. When the archive carries a comment (or junk after the record)
//! the tail of the file is scanned backwards for a record whose central
//! directory ends exactly where the record begins. A zip file embedded in
//! the comment has offsets relative to its own start, so it cannot satisfy
//! that check and is never mistaken for the real record.

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::error::{MalformedReason, MergeError, Result};
use crate::io::ReadAt;

use super::read_exact;
use super::structures::*;

/// Where the pieces of one input archive live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveLayout {
    /// Total length of the input in bytes
    pub length: u64,
    /// Number of central directory entries
    pub entry_count: u64,
    /// Offset of the first central directory header
    pub central_dir_offset: u64,
    /// Offset of the record that follows the central directory: the
    /// Zip64 end record if there is one, else the end record
    pub end_record_offset: u64,
    /// Offset of the first local header (4 after a spanning marker)
    pub entries_begin: u64,
    /// Bytes after the end record's comment
    pub trailing_junk: u64,
}

/// Values pulled out of the end record or its Zip64 counterpart.
struct EndRecord {
    multi_disk: bool,
    entries_here: u64,
    entries_total: u64,
    cd_size: u64,
    cd_offset: u64,
    /// Offset the central directory must end at
    record_offset: u64,
    encrypted: bool,
}

/// Locate and validate the central directory of `reader`.
pub async fn locate<R: ReadAt + ?Sized>(reader: &R, path: &str) -> Result<ArchiveLayout> {
    let length = reader.size();
    if length < EndOfCentralDirectory::SIZE as u64 {
        return Err(MergeError::malformed(path, MalformedReason::NotAZipFile));
    }

    let mut head = [0u8; 4];
    read_exact(reader, path, 0, &mut head).await?;
    if &head[..] == SPLIT_SIGNATURE {
        return Err(MergeError::malformed(path, MalformedReason::SplitOrSpanned));
    }
    let mut entries_begin = 0;
    if &head[..] == SPAN_SIGNATURE {
        entries_begin = 4;
        read_exact(reader, path, 4, &mut head).await?;
    }
    if &head[..] != LFH_SIGNATURE {
        if &head[..] != EndOfCentralDirectory::SIGNATURE && &head[..] != Zip64EOCD::SIGNATURE {
            return Err(MergeError::malformed(path, MalformedReason::NotAZipFile));
        }
        debug!("{path}: archive holds no entries");
        return Ok(ArchiveLayout {
            length,
            entry_count: 0,
            central_dir_offset: entries_begin,
            end_record_offset: entries_begin,
            entries_begin,
            trailing_junk: 0,
        });
    }

    // Common case first: no archive comment, so the record is the last 22 bytes.
    let tail_offset = length - EndOfCentralDirectory::SIZE as u64;
    let mut tail = [0u8; EndOfCentralDirectory::SIZE];
    read_exact(reader, path, tail_offset, &mut tail).await?;
    if let Some(eocd) = EndOfCentralDirectory::from_bytes(&tail) {
        if let Some(layout) =
            check_end_record(reader, path, length, entries_begin, &eocd, tail_offset).await?
        {
            return Ok(layout);
        }
    }

    let window_len = length.min(MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64) as usize;
    let window_start = length - window_len as u64;
    let mut window = vec![0u8; window_len];
    read_exact(reader, path, window_start, &mut window).await?;

    // The last candidate was covered above; walk backwards from the one before it.
    for i in (0..window_len - EndOfCentralDirectory::SIZE).rev() {
        let Some(eocd) = EndOfCentralDirectory::from_bytes(&window[i..]) else {
            continue;
        };
        let offset = window_start + i as u64;
        if let Some(layout) =
            check_end_record(reader, path, length, entries_begin, &eocd, offset).await?
        {
            return Ok(layout);
        }
    }

    Err(MergeError::malformed(path, MalformedReason::NoEndRecord))
}

/// Validate a candidate end record found at `offset`.
///
/// Returns `Ok(None)` if the candidate is not a consistent end record, and
/// an error if it is consistent but describes an archive that cannot be merged.
async fn check_end_record<R: ReadAt + ?Sized>(
    reader: &R,
    path: &str,
    length: u64,
    entries_begin: u64,
    eocd: &EndOfCentralDirectory,
    offset: u64,
) -> Result<Option<ArchiveLayout>> {
    let end = if eocd.defers_to_zip64(offset) {
        match read_zip64_end(reader, path, offset).await? {
            Some(end) => end,
            None => return Ok(None),
        }
    } else {
        EndRecord {
            multi_disk: eocd.disk_number != 0 || eocd.disk_with_cd != 0,
            entries_here: eocd.disk_entries as u64,
            entries_total: eocd.total_entries as u64,
            cd_size: eocd.cd_size as u64,
            cd_offset: eocd.cd_offset as u64,
            record_offset: offset,
            encrypted: false,
        }
    };

    if end.cd_offset.checked_add(end.cd_size) != Some(end.record_offset) {
        return Ok(None);
    }
    if end.encrypted {
        return Err(MergeError::malformed(
            path,
            MalformedReason::EncryptedCentralDirectory,
        ));
    }
    if end.multi_disk || end.entries_here != end.entries_total {
        return Err(MergeError::malformed(path, MalformedReason::SplitOrSpanned));
    }
    if usize::try_from(end.entries_total).is_err() {
        return Err(MergeError::TooManyEntries {
            path: path.to_string(),
            entries: end.entries_total,
        });
    }

    let comment_end = offset + EndOfCentralDirectory::SIZE as u64 + eocd.comment_len as u64;
    let trailing_junk = length.saturating_sub(comment_end);
    if trailing_junk > 0 {
        warn!("{path}: has {trailing_junk} junk bytes at the end");
    }

    debug!(
        "{path}: {} entries, central directory at {} ({} bytes)",
        end.entries_total, end.cd_offset, end.cd_size
    );

    Ok(Some(ArchiveLayout {
        length,
        entry_count: end.entries_total,
        central_dir_offset: end.cd_offset,
        end_record_offset: end.record_offset,
        entries_begin,
        trailing_junk,
    }))
}

/// Follow the Zip64 locator just before the end record at `eocd_offset`.
async fn read_zip64_end<R: ReadAt + ?Sized>(
    reader: &R,
    path: &str,
    eocd_offset: u64,
) -> Result<Option<EndRecord>> {
    if eocd_offset < (Zip64EOCD::MIN_SIZE + Zip64EOCDLocator::SIZE) as u64 {
        return Ok(None);
    }

    let locator_offset = eocd_offset - Zip64EOCDLocator::SIZE as u64;
    let mut buf = [0u8; Zip64EOCD::MIN_SIZE];
    read_exact(reader, path, locator_offset, &mut buf[..Zip64EOCDLocator::SIZE]).await?;
    let Some(locator) = Zip64EOCDLocator::from_bytes(&buf) else {
        return Ok(None);
    };
    if locator.eocd64_offset > locator_offset - Zip64EOCD::MIN_SIZE as u64 {
        return Ok(None);
    }

    read_exact(reader, path, locator.eocd64_offset, &mut buf).await?;
    let Some(record) = Zip64EOCD::from_bytes(&buf) else {
        return Ok(None);
    };
    // The record must run right up to the locator
    let record_end = locator
        .eocd64_offset
        .checked_add(Zip64EOCD::SIZE_FIELD_EXCLUDES)
        .and_then(|end| end.checked_add(record.eocd64_size));
    if record_end != Some(locator_offset) {
        return Ok(None);
    }

    let mut encrypted = false;
    let extensible = record.extensible_data_len();
    if record.version_needed >= Zip64EOCD::CENTRAL_ENCRYPTION_VERSION && extensible > 0 {
        // Compression method at 0, encryption algorithm at 18
        let mut sector = [0u8; 20];
        let n = extensible.min(sector.len() as u64) as usize;
        let sector_offset = locator.eocd64_offset + Zip64EOCD::MIN_SIZE as u64;
        read_exact(reader, path, sector_offset, &mut sector[..n]).await?;
        encrypted =
            LittleEndian::read_u16(&sector[0..]) != 0 || LittleEndian::read_u16(&sector[18..]) != 0;
    }

    Ok(Some(EndRecord {
        multi_disk: locator.disk_with_eocd64 != 0
            || locator.total_disks != 1
            || record.disk_number != 0
            || record.disk_with_cd != 0,
        entries_here: record.disk_entries,
        entries_total: record.total_entries,
        cd_size: record.cd_size,
        cd_offset: record.cd_offset,
        record_offset: locator.eocd64_offset,
        encrypted,
    }))
}
