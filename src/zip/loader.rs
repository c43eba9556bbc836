//! Appending an input's central directory to the merged directory.
//!
//! Each header is copied verbatim, then its local header offset is rebased
//! to where the entry will land in the output. Offsets that no longer fit
//! 32 bits move into a Zip64 extended information extra field, which is
//! synthesized if the entry did not already carry one.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::error::{MalformedReason, MergeError, Result};
use crate::io::ReadAt;

use super::knitter::KnitState;
use super::locator::ArchiveLayout;
use super::read_exact;
use super::structures::*;

/// Load every central header of one input into `state.directory`.
///
/// Returns the original local header offsets, in directory order, with
/// room reserved for the sentinel the copier appends.
pub(crate) async fn load_central_directory<R: ReadAt + ?Sized>(
    reader: &R,
    path: &str,
    layout: &ArchiveLayout,
    state: &mut KnitState,
) -> Result<Vec<u64>> {
    let count = layout.entry_count;
    let end = layout.end_record_offset;

    // Each entry needs at least a fixed header, so this bounds the allocation
    let room = end.saturating_sub(layout.central_dir_offset) / CDFH_MIN_SIZE as u64;
    if count > room {
        return Err(MergeError::malformed(
            path,
            MalformedReason::CentralDirectoryOverlapsEnd,
        ));
    }
    let capacity = count as usize + 1;
    let mut local_offsets = Vec::new();
    local_offsets
        .try_reserve_exact(capacity)
        .map_err(|_| MergeError::OutOfMemory {
            requested: capacity * size_of::<u64>(),
        })?;

    let mut cursor = layout.central_dir_offset;
    for _ in 0..count {
        if cursor + CDFH_MIN_SIZE as u64 > end {
            return Err(MergeError::malformed(
                path,
                MalformedReason::CentralDirectoryOverlapsEnd,
            ));
        }
        let start = state.directory.len();
        let fixed = state.directory.grow(CDFH_MIN_SIZE)?;
        read_exact(reader, path, cursor, fixed).await?;
        cursor += CDFH_MIN_SIZE as u64;

        let header = CentralHeader(fixed);
        if !header.has_signature() {
            return Err(MergeError::malformed(
                path,
                MalformedReason::MissingCentralSignature,
            ));
        }
        let variable = header.variable_len();
        if cursor + variable as u64 > end {
            return Err(MergeError::malformed(
                path,
                MalformedReason::CentralDirectoryOverlapsEnd,
            ));
        }
        let rest = state.directory.grow(variable)?;
        read_exact(reader, path, cursor, rest).await?;
        cursor += variable as u64;

        let original = rebase_entry(path, layout, state, start)?;
        local_offsets.push(original);
    }

    if cursor != end {
        return Err(MergeError::malformed(
            path,
            MalformedReason::CentralDirectoryShort,
        ));
    }
    Ok(local_offsets)
}

/// Rewrite the local header offset of the entry starting at `start` in the
/// merged directory. Returns the entry's original offset in its input.
fn rebase_entry(
    path: &str,
    layout: &ArchiveLayout,
    state: &mut KnitState,
    start: usize,
) -> Result<u64> {
    let output_position = state.output_position;
    let rebase = |original: u64| {
        original
            .checked_sub(layout.entries_begin)
            .and_then(|offset| offset.checked_add(output_position))
            .ok_or_else(|| MergeError::malformed(path, MalformedReason::OffsetOverflow))
    };

    let entry = state.directory.tail_mut(start);
    let header = CentralHeader(entry);
    state.max_version_needed = state.max_version_needed.max(header.version_needed());

    // Zip64 fields ahead of the offset: uncompressed then compressed size
    let mut skip = 0;
    if header.uncompressed_size() == ZIP64_SENTINEL_32 {
        skip += 8;
    }
    if header.compressed_size() == ZIP64_SENTINEL_32 {
        skip += 8;
    }
    let more = if header.disk_start() == ZIP64_SENTINEL_16 { 4 } else { 0 };
    if skip > 0 || more > 0 {
        state.needs_zip64 = true;
    }

    let name_len = header.name_len();
    let extra_len = header.extra_len();
    let comment_len = header.comment_len();

    if header.local_header_offset() == ZIP64_SENTINEL_32 {
        state.needs_zip64 = true;
        let extra_start = CDFH_MIN_SIZE + name_len;
        let extra = &entry[extra_start..extra_start + extra_len];
        let (field, size) = find_zip64_extra(extra)
            .ok_or_else(|| MergeError::malformed(path, MalformedReason::MissingZip64Extra))?;
        if size != 4 + skip + 8 + more {
            return Err(MergeError::malformed(
                path,
                MalformedReason::InvalidZip64Extra,
            ));
        }
        let at = extra_start + field + 4 + skip;
        let original = LittleEndian::read_u64(&entry[at..]);
        LittleEndian::write_u64(&mut entry[at..], rebase(original)?);
        return Ok(original);
    }

    let original = header.local_header_offset() as u64;
    let moved = rebase(original)?;
    if moved < ZIP64_SENTINEL_32 as u64 {
        LittleEndian::write_u32(&mut entry[CentralHeader::LOCAL_HEADER_OFFSET..], moved as u32);
        return Ok(original);
    }

    // The new offset needs 64 bits: append a Zip64 field after the existing extras
    let grown = extra_len + ZIP64_OFFSET_EXTRA_SIZE;
    if grown > u16::MAX as usize {
        return Err(MergeError::malformed(
            path,
            MalformedReason::ExtraFieldTooLarge,
        ));
    }
    state.needs_zip64 = true;
    LittleEndian::write_u16(&mut entry[CentralHeader::EXTRA_LEN..], grown as u16);
    LittleEndian::write_u32(
        &mut entry[CentralHeader::LOCAL_HEADER_OFFSET..],
        ZIP64_SENTINEL_32,
    );
    debug!("{path}: offset {moved} moved into a Zip64 extra field");

    let insert_at = start + CDFH_MIN_SIZE + name_len + extra_len;
    debug_assert_eq!(insert_at + comment_len, state.directory.len());
    let field = state
        .directory
        .insert_at(insert_at, ZIP64_OFFSET_EXTRA_SIZE)?;
    LittleEndian::write_u16(&mut field[0..], ZIP64_EXTRA_ID);
    LittleEndian::write_u16(&mut field[2..], 8);
    LittleEndian::write_u64(&mut field[4..], moved);
    Ok(original)
}

/// Find the Zip64 extended information field in an extra area.
///
/// Returns its offset within `extra` and its total size including the
/// 4-byte id/size prefix. Fields whose declared size overruns the area end
/// the search.
fn find_zip64_extra(extra: &[u8]) -> Option<(usize, usize)> {
    let mut pos = 0;
    while extra.len() - pos >= 4 {
        let id = LittleEndian::read_u16(&extra[pos..]);
        let size = 4 + LittleEndian::read_u16(&extra[pos + 2..]) as usize;
        if size > extra.len() - pos {
            return None;
        }
        if id == ZIP64_EXTRA_ID {
            return Some((pos, size));
        }
        pos += size;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;

    /// A central header with the given name, extra field and comment.
    fn central(name: &[u8], offset: u32, extra: &[u8], comment: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; CDFH_MIN_SIZE];
        bytes[..4].copy_from_slice(CDFH_SIGNATURE);
        LittleEndian::write_u16(&mut bytes[CentralHeader::VERSION_NEEDED..], 20);
        LittleEndian::write_u16(&mut bytes[CentralHeader::NAME_LEN..], name.len() as u16);
        LittleEndian::write_u16(&mut bytes[CentralHeader::EXTRA_LEN..], extra.len() as u16);
        LittleEndian::write_u16(&mut bytes[CentralHeader::COMMENT_LEN..], comment.len() as u16);
        LittleEndian::write_u32(&mut bytes[CentralHeader::LOCAL_HEADER_OFFSET..], offset);
        bytes.extend_from_slice(name);
        bytes.extend_from_slice(extra);
        bytes.extend_from_slice(comment);
        bytes
    }

    /// Input whose central directory starts at 0 and is made of `headers`.
    fn layout_for(headers: &[Vec<u8>]) -> (MemoryReader, ArchiveLayout) {
        let data: Vec<u8> = headers.concat();
        let layout = ArchiveLayout {
            length: data.len() as u64,
            entry_count: headers.len() as u64,
            central_dir_offset: 0,
            end_record_offset: data.len() as u64,
            entries_begin: 0,
            trailing_junk: 0,
        };
        (MemoryReader::new(data), layout)
    }

    #[tokio::test]
    async fn rebases_small_offsets_in_place() {
        let (reader, layout) = layout_for(&[central(b"a", 0, b"", b""), central(b"b", 40, b"", b"")]);
        let mut state = KnitState::default();
        state.output_position = 1000;

        let offsets = load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap();
        assert_eq!(offsets, vec![0, 40]);
        assert!(offsets.capacity() >= 3);

        let rewritten: Vec<u32> = state
            .directory
            .entries()
            .map(|e| e.local_header_offset())
            .collect();
        assert_eq!(rewritten, vec![1000, 1040]);
        assert_eq!(state.max_version_needed, 20);
        assert!(!state.needs_zip64);
    }

    #[tokio::test]
    async fn spanning_marker_is_subtracted() {
        let (reader, mut layout) = layout_for(&[central(b"a", 4, b"", b"")]);
        layout.entries_begin = 4;
        let mut state = KnitState::default();
        load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap();
        let entry = state.directory.entries().next().unwrap();
        assert_eq!(entry.local_header_offset(), 0);
    }

    #[tokio::test]
    async fn synthesizes_zip64_field_for_large_offsets() {
        let extra = [0x55, 0x54, 1, 0, 7];
        let (reader, layout) = layout_for(&[central(b"big", 16, &extra, b"note")]);
        let mut state = KnitState::default();
        state.output_position = 0xFFFF_FFF0;

        load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap();
        assert!(state.needs_zip64);

        let bytes = state.directory.as_bytes();
        let entry = CentralHeader(bytes);
        assert_eq!(entry.local_header_offset(), ZIP64_SENTINEL_32);
        assert_eq!(entry.extra_len(), extra.len() + 12);
        assert_eq!(entry.total_len(), bytes.len());
        assert_eq!(entry.name(), b"big");

        let extra_start = CDFH_MIN_SIZE + 3;
        assert_eq!(&bytes[extra_start..extra_start + extra.len()], &extra);
        let field = &bytes[extra_start + extra.len()..];
        assert_eq!(LittleEndian::read_u16(&field[0..]), 1);
        assert_eq!(LittleEndian::read_u16(&field[2..]), 8);
        assert_eq!(LittleEndian::read_u64(&field[4..]), 0x1_0000_0000);
        assert_eq!(&field[12..], b"note");
    }

    #[tokio::test]
    async fn offset_of_exactly_sentinel_uses_zip64() {
        let (reader, layout) = layout_for(&[central(b"a", 0, b"", b"")]);
        let mut state = KnitState::default();
        state.output_position = 0xFFFF_FFFF;
        load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap();
        let entry = state.directory.entries().next().unwrap();
        assert_eq!(entry.local_header_offset(), ZIP64_SENTINEL_32);
        assert_eq!(entry.extra_len(), 12);
    }

    #[tokio::test]
    async fn updates_existing_zip64_field() {
        // uncompressed size, compressed size, then the offset
        let mut extra = vec![1, 0, 24, 0];
        extra.extend_from_slice(&7u64.to_le_bytes());
        extra.extend_from_slice(&9u64.to_le_bytes());
        extra.extend_from_slice(&0x2_0000_0000u64.to_le_bytes());
        let mut header = central(b"z", ZIP64_SENTINEL_32, &extra, b"");
        LittleEndian::write_u32(&mut header[CentralHeader::COMPRESSED_SIZE..], ZIP64_SENTINEL_32);
        LittleEndian::write_u32(&mut header[CentralHeader::UNCOMPRESSED_SIZE..], ZIP64_SENTINEL_32);

        let (reader, layout) = layout_for(&[header]);
        let mut state = KnitState::default();
        state.output_position = 10;
        let offsets = load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap();
        assert_eq!(offsets, vec![0x2_0000_0000]);
        assert!(state.needs_zip64);

        let bytes = state.directory.as_bytes();
        let at = CDFH_MIN_SIZE + 1 + 4 + 16;
        assert_eq!(LittleEndian::read_u64(&bytes[at..]), 0x2_0000_000A);
    }

    #[tokio::test]
    async fn rejects_missing_or_malformed_zip64_field() {
        let (reader, layout) = layout_for(&[central(b"z", ZIP64_SENTINEL_32, b"", b"")]);
        let err = load_central_directory(&reader, "t.zip", &layout, &mut KnitState::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(MalformedReason::MissingZip64Extra));

        let mut extra = vec![1, 0, 16, 0];
        extra.extend_from_slice(&[0u8; 16]);
        let (reader, layout) = layout_for(&[central(b"z", ZIP64_SENTINEL_32, &extra, b"")]);
        let err = load_central_directory(&reader, "t.zip", &layout, &mut KnitState::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(MalformedReason::InvalidZip64Extra));
    }

    #[tokio::test]
    async fn rejects_overflowing_extra_field() {
        let extra = vec![0u8; u16::MAX as usize - 4];
        let mut header = central(b"", 0, b"", b"");
        LittleEndian::write_u16(&mut header[CentralHeader::EXTRA_LEN..], extra.len() as u16);
        // one unknown field spanning the whole area
        let mut field = vec![0x99, 0x99];
        field.extend_from_slice(&((extra.len() - 4) as u16).to_le_bytes());
        field.extend_from_slice(&extra[4..]);
        header.extend_from_slice(&field);

        let (reader, layout) = layout_for(&[header]);
        let mut state = KnitState::default();
        state.output_position = 0x1_0000_0000;
        let err = load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(MalformedReason::ExtraFieldTooLarge));
    }

    #[tokio::test]
    async fn directory_must_reach_end_record() {
        let (reader, mut layout) = layout_for(&[central(b"a", 0, b"", b""), central(b"b", 0, b"", b"")]);
        layout.entry_count = 1;
        let err = load_central_directory(&reader, "t.zip", &layout, &mut KnitState::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(MalformedReason::CentralDirectoryShort));

        layout.entry_count = 2;
        layout.end_record_offset -= 1;
        let err = load_central_directory(&reader, "t.zip", &layout, &mut KnitState::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(MalformedReason::CentralDirectoryOverlapsEnd));
    }

    #[tokio::test]
    async fn rejects_bad_signature() {
        let mut header = central(b"a", 0, b"", b"");
        header[2] = 9;
        let (reader, layout) = layout_for(&[header]);
        let err = load_central_directory(&reader, "t.zip", &layout, &mut KnitState::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(MalformedReason::MissingCentralSignature));
    }

    #[tokio::test]
    async fn offset_before_first_entry_overflows() {
        let (reader, mut layout) = layout_for(&[central(b"a", 0, b"", b"")]);
        layout.entries_begin = 4;
        let err = load_central_directory(&reader, "t.zip", &layout, &mut KnitState::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(MalformedReason::OffsetOverflow));
    }

    #[tokio::test]
    async fn size_sentinel_alone_flags_zip64() {
        let mut header = central(b"s", 0, b"", b"");
        LittleEndian::write_u32(&mut header[CentralHeader::COMPRESSED_SIZE..], ZIP64_SENTINEL_32);
        let (reader, layout) = layout_for(&[header]);
        let mut state = KnitState::default();
        state.output_position = 100;

        let offsets = load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap();
        assert_eq!(offsets, vec![0]);
        assert!(state.needs_zip64);

        // the offset still fits, so it is rewritten in place
        let entry = state.directory.entries().next().unwrap();
        assert_eq!(entry.local_header_offset(), 100);
        assert_eq!(entry.extra_len(), 0);
    }

    #[tokio::test]
    async fn disk_sentinel_alone_flags_zip64() {
        let mut header = central(b"d", 0, b"", b"");
        LittleEndian::write_u16(&mut header[CentralHeader::DISK_START..], ZIP64_SENTINEL_16);
        let (reader, layout) = layout_for(&[header]);
        let mut state = KnitState::default();

        load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap();
        assert!(state.needs_zip64);
        let entry = state.directory.entries().next().unwrap();
        assert_eq!(entry.local_header_offset(), 0);
    }

    /// Zip64 field holding an offset and a disk number, with `disk_len`
    /// bytes for the disk number.
    fn offset_and_disk_header(offset: u64, disk_len: usize) -> Vec<u8> {
        let mut extra = vec![1, 0];
        extra.extend_from_slice(&((8 + disk_len) as u16).to_le_bytes());
        extra.extend_from_slice(&offset.to_le_bytes());
        extra.extend(std::iter::repeat_n(0u8, disk_len));
        let mut header = central(b"d", ZIP64_SENTINEL_32, &extra, b"");
        LittleEndian::write_u16(&mut header[CentralHeader::DISK_START..], ZIP64_SENTINEL_16);
        header
    }

    #[tokio::test]
    async fn disk_sentinel_adds_four_bytes_to_zip64_field() {
        let (reader, layout) = layout_for(&[offset_and_disk_header(5, 4)]);
        let mut state = KnitState::default();
        state.output_position = 100;

        let offsets = load_central_directory(&reader, "t.zip", &layout, &mut state)
            .await
            .unwrap();
        assert_eq!(offsets, vec![5]);
        assert!(state.needs_zip64);
        let at = CDFH_MIN_SIZE + 1 + 4;
        assert_eq!(LittleEndian::read_u64(&state.directory.as_bytes()[at..]), 105);

        // an eight byte disk number does not match the sentinel layout
        let (reader, layout) = layout_for(&[offset_and_disk_header(5, 8)]);
        let err = load_central_directory(&reader, "t.zip", &layout, &mut KnitState::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(MalformedReason::InvalidZip64Extra));
    }

    #[test]
    fn zip64_search_skips_other_fields() {
        let extra = [0x0A, 0, 2, 0, 0xAA, 0xBB, 1, 0, 0, 0];
        assert_eq!(find_zip64_extra(&extra), Some((6, 4)));
        assert_eq!(find_zip64_extra(&[0x0A, 0, 9, 0, 1]), None);
        assert_eq!(find_zip64_extra(&[1, 0]), None);
    }
}
