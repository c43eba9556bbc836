use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Legacy 16-bit sentinel meaning "see the Zip64 record".
pub const ZIP64_SENTINEL_16: u16 = 0xFFFF;
/// Legacy 32-bit sentinel meaning "see the Zip64 record".
pub const ZIP64_SENTINEL_32: u32 = 0xFFFF_FFFF;

/// Version needed to extract for anything using Zip64 (4.5).
pub const ZIP64_VERSION_NEEDED: u16 = 45;

/// Spanning marker at the start of a single-segment "spanned" archive.
pub const SPAN_SIGNATURE: &[u8] = b"PK00";
/// Marker at the start of the first segment of a split archive.
pub const SPLIT_SIGNATURE: &[u8] = b"PK\x07\x08";

/// Maximum ZIP comment size allowed by the format (65535 bytes).
pub const MAX_COMMENT_SIZE: u64 = 65535;

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Parse a candidate record, returning `None` if the signature is absent.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);

        Some(Self {
            disk_number: cursor.read_u16::<LittleEndian>().ok()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>().ok()?,
            disk_entries: cursor.read_u16::<LittleEndian>().ok()?,
            total_entries: cursor.read_u16::<LittleEndian>().ok()?,
            cd_size: cursor.read_u32::<LittleEndian>().ok()?,
            cd_offset: cursor.read_u32::<LittleEndian>().ok()?,
            comment_len: cursor.read_u16::<LittleEndian>().ok()?,
        })
    }

    /// Build a record for a merged archive, saturating fields that do not
    /// fit their legacy width.
    pub fn saturated(entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        let entries = entries.min(ZIP64_SENTINEL_16 as u64) as u16;
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size: cd_size.min(ZIP64_SENTINEL_32 as u64) as u32,
            cd_offset: cd_offset.min(ZIP64_SENTINEL_32 as u64) as u32,
            comment_len: 0,
        }
    }

    /// True if any field defers to the Zip64 records, or if the directory
    /// does not end where this record starts.
    pub fn defers_to_zip64(&self, record_offset: u64) -> bool {
        self.disk_number == ZIP64_SENTINEL_16
            || self.disk_with_cd == ZIP64_SENTINEL_16
            || self.disk_entries == ZIP64_SENTINEL_16
            || self.total_entries == ZIP64_SENTINEL_16
            || self.cd_size == ZIP64_SENTINEL_32
            || self.cd_offset == ZIP64_SENTINEL_32
            || self.cd_offset as u64 + self.cd_size as u64 != record_offset
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(Self::SIGNATURE);
        LittleEndian::write_u16(&mut buf[4..], self.disk_number);
        LittleEndian::write_u16(&mut buf[6..], self.disk_with_cd);
        LittleEndian::write_u16(&mut buf[8..], self.disk_entries);
        LittleEndian::write_u16(&mut buf[10..], self.total_entries);
        LittleEndian::write_u32(&mut buf[12..], self.cd_size);
        LittleEndian::write_u32(&mut buf[16..], self.cd_offset);
        LittleEndian::write_u16(&mut buf[20..], self.comment_len);
        buf
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);

        Some(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>().ok()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>().ok()?,
            total_disks: cursor.read_u32::<LittleEndian>().ok()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(Self::SIGNATURE);
        LittleEndian::write_u32(&mut buf[4..], self.disk_with_eocd64);
        LittleEndian::write_u64(&mut buf[8..], self.eocd64_offset);
        LittleEndian::write_u32(&mut buf[16..], self.total_disks);
        buf
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;
    /// The record size field excludes the signature and the size field itself.
    pub const SIZE_FIELD_EXCLUDES: u64 = 12;
    /// First version whose extensible data sector may describe central
    /// directory compression or encryption.
    pub const CENTRAL_ENCRYPTION_VERSION: u16 = 62;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..Self::MIN_SIZE]);

        Some(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>().ok()?,
            version_made_by: cursor.read_u16::<LittleEndian>().ok()?,
            version_needed: cursor.read_u16::<LittleEndian>().ok()?,
            disk_number: cursor.read_u32::<LittleEndian>().ok()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>().ok()?,
            disk_entries: cursor.read_u64::<LittleEndian>().ok()?,
            total_entries: cursor.read_u64::<LittleEndian>().ok()?,
            cd_size: cursor.read_u64::<LittleEndian>().ok()?,
            cd_offset: cursor.read_u64::<LittleEndian>().ok()?,
        })
    }

    /// Record for a merged single-disk archive with no extensible data.
    pub fn for_output(entries: u64, cd_size: u64, cd_offset: u64, version: u16) -> Self {
        Self {
            eocd64_size: Self::MIN_SIZE as u64 - Self::SIZE_FIELD_EXCLUDES,
            version_made_by: version,
            version_needed: version,
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
        }
    }

    /// Length of the extensible data sector following the 56-byte base.
    pub fn extensible_data_len(&self) -> u64 {
        self.eocd64_size
            .saturating_add(Self::SIZE_FIELD_EXCLUDES)
            .saturating_sub(Self::MIN_SIZE as u64)
    }

    pub fn to_bytes(&self) -> [u8; Self::MIN_SIZE] {
        let mut buf = [0u8; Self::MIN_SIZE];
        buf[0..4].copy_from_slice(Self::SIGNATURE);
        LittleEndian::write_u64(&mut buf[4..], self.eocd64_size);
        LittleEndian::write_u16(&mut buf[12..], self.version_made_by);
        LittleEndian::write_u16(&mut buf[14..], self.version_needed);
        LittleEndian::write_u32(&mut buf[16..], self.disk_number);
        LittleEndian::write_u32(&mut buf[20..], self.disk_with_cd);
        LittleEndian::write_u64(&mut buf[24..], self.disk_entries);
        LittleEndian::write_u64(&mut buf[32..], self.total_entries);
        LittleEndian::write_u64(&mut buf[40..], self.cd_size);
        LittleEndian::write_u64(&mut buf[48..], self.cd_offset);
        buf
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Header id of the Zip64 extended information extra field.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;
/// Size of a synthesized Zip64 extra field holding only the header offset.
pub const ZIP64_OFFSET_EXTRA_SIZE: usize = 12;

/// Field view over a central directory header held in raw bytes.
///
/// The slice must start at the signature and hold at least the 46 fixed bytes.
pub struct CentralHeader<'a>(pub &'a [u8]);

impl<'a> CentralHeader<'a> {
    pub const VERSION_NEEDED: usize = 6;
    pub const COMPRESSED_SIZE: usize = 20;
    pub const UNCOMPRESSED_SIZE: usize = 24;
    pub const NAME_LEN: usize = 28;
    pub const EXTRA_LEN: usize = 30;
    pub const COMMENT_LEN: usize = 32;
    pub const DISK_START: usize = 34;
    pub const LOCAL_HEADER_OFFSET: usize = 42;

    pub fn has_signature(&self) -> bool {
        &self.0[0..4] == CDFH_SIGNATURE
    }

    pub fn version_needed(&self) -> u16 {
        LittleEndian::read_u16(&self.0[Self::VERSION_NEEDED..])
    }

    pub fn compressed_size(&self) -> u32 {
        LittleEndian::read_u32(&self.0[Self::COMPRESSED_SIZE..])
    }

    pub fn uncompressed_size(&self) -> u32 {
        LittleEndian::read_u32(&self.0[Self::UNCOMPRESSED_SIZE..])
    }

    pub fn name_len(&self) -> usize {
        LittleEndian::read_u16(&self.0[Self::NAME_LEN..]) as usize
    }

    pub fn extra_len(&self) -> usize {
        LittleEndian::read_u16(&self.0[Self::EXTRA_LEN..]) as usize
    }

    pub fn comment_len(&self) -> usize {
        LittleEndian::read_u16(&self.0[Self::COMMENT_LEN..]) as usize
    }

    pub fn disk_start(&self) -> u16 {
        LittleEndian::read_u16(&self.0[Self::DISK_START..])
    }

    pub fn local_header_offset(&self) -> u32 {
        LittleEndian::read_u32(&self.0[Self::LOCAL_HEADER_OFFSET..])
    }

    /// Bytes following the fixed header: name, extra field and comment.
    pub fn variable_len(&self) -> usize {
        self.name_len() + self.extra_len() + self.comment_len()
    }

    pub fn total_len(&self) -> usize {
        CDFH_MIN_SIZE + self.variable_len()
    }

    /// The entry name; empty if the slice is truncated.
    pub fn name(&self) -> &'a [u8] {
        let end = CDFH_MIN_SIZE + self.name_len();
        self.0.get(CDFH_MIN_SIZE..end).unwrap_or(&[])
    }
}

/// Field view over the fixed part of a local file header.
pub struct LocalHeader<'a>(pub &'a [u8]);

impl LocalHeader<'_> {
    pub fn has_signature(&self) -> bool {
        &self.0[0..4] == LFH_SIGNATURE
    }

    pub fn compressed_size(&self) -> u32 {
        LittleEndian::read_u32(&self.0[18..])
    }

    pub fn uncompressed_size(&self) -> u32 {
        LittleEndian::read_u32(&self.0[22..])
    }

    /// True if the header defers either size to a Zip64 extra field.
    pub fn uses_zip64(&self) -> bool {
        self.compressed_size() == ZIP64_SENTINEL_32 || self.uncompressed_size() == ZIP64_SENTINEL_32
    }
}
