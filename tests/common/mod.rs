#![allow(dead_code)]

use std::sync::Once;

use zipknit::io::MemoryReader;
use zipknit::{ArchiveLayout, ZipKnitter};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// One stored entry for [`ArchiveBuilder`].
pub struct Entry {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    /// Mark the local header's sizes as Zip64 sentinels, with the real
    /// sizes in a local Zip64 extra field
    pub local_zip64: bool,
}

impl Entry {
    pub fn new(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            data: data.to_vec(),
            local_zip64: false,
        }
    }
}

/// Assembles small zip archives byte by byte.
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<Entry>,
    comment: Vec<u8>,
    span_marker: bool,
    zip64_end: bool,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(Entry::new(name, data));
        self
    }

    pub fn raw_entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn span_marker(mut self) -> Self {
        self.span_marker = true;
        self
    }

    pub fn zip64_end(mut self) -> Self {
        self.zip64_end = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.span_marker {
            out.extend_from_slice(b"PK00");
        }

        let mut central = Vec::new();
        for entry in &self.entries {
            let offset = out.len() as u32;
            let crc = crc32fast::hash(&entry.data);
            let size = entry.data.len() as u32;

            let mut local_extra = Vec::new();
            let local_size = if entry.local_zip64 {
                local_extra.extend_from_slice(&1u16.to_le_bytes());
                local_extra.extend_from_slice(&16u16.to_le_bytes());
                local_extra.extend_from_slice(&(size as u64).to_le_bytes());
                local_extra.extend_from_slice(&(size as u64).to_le_bytes());
                0xFFFF_FFFF
            } else {
                size
            };

            out.extend_from_slice(b"PK\x03\x04");
            put16(&mut out, 20); // version needed
            put16(&mut out, 0); // flags
            put16(&mut out, 0); // stored
            put16(&mut out, 0); // time
            put16(&mut out, 0x21); // date: 1980-01-01
            put32(&mut out, crc);
            put32(&mut out, local_size);
            put32(&mut out, local_size);
            put16(&mut out, entry.name.len() as u16);
            put16(&mut out, local_extra.len() as u16);
            out.extend_from_slice(&entry.name);
            out.extend_from_slice(&local_extra);
            out.extend_from_slice(&entry.data);

            central.extend_from_slice(b"PK\x01\x02");
            put16(&mut central, 20); // version made by
            put16(&mut central, 20); // version needed
            put16(&mut central, 0);
            put16(&mut central, 0);
            put16(&mut central, 0);
            put16(&mut central, 0x21);
            put32(&mut central, crc);
            put32(&mut central, size);
            put32(&mut central, size);
            put16(&mut central, entry.name.len() as u16);
            put16(&mut central, 0); // extra
            put16(&mut central, 0); // comment
            put16(&mut central, 0); // disk start
            put16(&mut central, 0); // internal attributes
            put32(&mut central, 0); // external attributes
            put32(&mut central, offset);
            central.extend_from_slice(&entry.name);
        }

        let cd_offset = out.len() as u64;
        let cd_size = central.len() as u64;
        let count = self.entries.len() as u64;
        out.extend_from_slice(&central);

        if self.zip64_end {
            let record_offset = out.len() as u64;
            out.extend_from_slice(b"PK\x06\x06");
            put64(&mut out, 44);
            put16(&mut out, 45);
            put16(&mut out, 45);
            put32(&mut out, 0);
            put32(&mut out, 0);
            put64(&mut out, count);
            put64(&mut out, count);
            put64(&mut out, cd_size);
            put64(&mut out, cd_offset);

            out.extend_from_slice(b"PK\x06\x07");
            put32(&mut out, 0);
            put64(&mut out, record_offset);
            put32(&mut out, 1);

            push_end_record(&mut out, 0xFFFF, 0xFFFF_FFFF, 0xFFFF_FFFF, &self.comment);
        } else {
            push_end_record(
                &mut out,
                count as u16,
                cd_size as u32,
                cd_offset as u32,
                &self.comment,
            );
        }
        out
    }
}

fn push_end_record(out: &mut Vec<u8>, count: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) {
    out.extend_from_slice(b"PK\x05\x06");
    put16(out, 0);
    put16(out, 0);
    put16(out, count);
    put16(out, count);
    put32(out, cd_size);
    put32(out, cd_offset);
    put16(out, comment.len() as u16);
    out.extend_from_slice(comment);
}

pub fn put16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn put64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn read16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub fn read32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

/// Merge in-memory archives, returning the output bytes.
pub async fn knit(inputs: &[Vec<u8>]) -> (zipknit::KnitSummary, Vec<u8>) {
    init_logging();
    let mut knitter = ZipKnitter::new(Vec::<u8>::new());
    for (i, input) in inputs.iter().enumerate() {
        let reader = MemoryReader::new(input.clone());
        knitter
            .add_archive(&reader, &format!("input{i}.zip"))
            .await
            .unwrap();
    }
    knitter.finish().await.unwrap()
}

/// Central directory names and local header offsets of a merged archive
/// without Zip64 offsets.
pub async fn directory_of(archive: &[u8]) -> (ArchiveLayout, Vec<(Vec<u8>, u64)>) {
    let reader = MemoryReader::new(archive.to_vec());
    let layout = zipknit::zip::locate(&reader, "merged.zip").await.unwrap();

    let mut entries = Vec::new();
    let mut at = layout.central_dir_offset as usize;
    for _ in 0..layout.entry_count {
        let name_len = read16(archive, at + 28) as usize;
        let extra_len = read16(archive, at + 30) as usize;
        let comment_len = read16(archive, at + 32) as usize;
        let offset = read32(archive, at + 42) as u64;
        entries.push((archive[at + 46..at + 46 + name_len].to_vec(), offset));
        at += 46 + name_len + extra_len + comment_len;
    }
    (layout, entries)
}
