//! OLE2 compound-file reader.
//!
//! A compound file is a miniature filesystem: a FAT chains regular sectors
//! together, a MiniFAT chains 64-byte mini sectors inside the root entry's
//! ministream, and a directory table names the streams. This reader loads
//! the allocation structures once and serves whole streams by name.

use std::io::{Read, Seek, SeekFrom};

use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

use super::consts::*;
use crate::common::error::{Error, Result};

/// On-disk compound file header (the first 512 bytes, DIFAT array excluded).
#[derive(Debug, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    dll_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    num_dir_sectors: U32<LE>,
    num_fat_sectors: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    num_minifat_sectors: U32<LE>,
    first_difat_sector: U32<LE>,
    num_difat_sectors: U32<LE>,
}

/// On-disk directory entry (128 bytes).
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE, null-padded
    name: [u8; 64],
    /// Length of name in bytes, including the null terminator
    name_len: U16<LE>,
    entry_type: u8,
    node_color: u8,
    sid_left: U32<LE>,
    sid_right: U32<LE>,
    sid_child: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    creation_time: U64<LE>,
    modified_time: U64<LE>,
    start_sector: U32<LE>,
    stream_size: U64<LE>,
}

/// A named stream in the directory table.
#[derive(Debug, Clone)]
struct StreamEntry {
    name: String,
    start_sector: u32,
    size: u64,
    /// Streams below the cutoff live in the ministream and chain via MiniFAT.
    is_minifat: bool,
}

/// Parsed OLE2 compound file over a seekable reader.
#[derive(Debug)]
pub struct CompoundFile<R: Read + Seek> {
    reader: R,
    sector_size: usize,
    mini_sector_size: usize,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    /// Stream entries only, in directory order.
    streams: Vec<StreamEntry>,
    /// Start sector of the root entry, where the ministream lives.
    ministream_start: u32,
    ministream: Option<Vec<u8>>,
}

impl<R: Read + Seek> CompoundFile<R> {
    /// Open and parse a compound file. Validates the header, then loads the
    /// FAT (with DIFAT continuation), the directory table, and the MiniFAT.
    pub fn open(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        if file_size < MINIMAL_OLEFILE_SIZE as u64 {
            return Err(Error::ContainerFormat(
                "compound file smaller than one header plus one sector".to_string(),
            ));
        }

        let mut header_block = [0u8; 512];
        reader.read_exact(&mut header_block)?;

        let header = RawHeader::read_from_bytes(&header_block[..size_of::<RawHeader>()])
            .map_err(|_| Error::ContainerFormat("unreadable compound file header".to_string()))?;

        if &header.magic != MAGIC {
            return Err(Error::ContainerFormat(
                "missing compound file signature".to_string(),
            ));
        }
        if header.byte_order.get() != 0xFFFE {
            return Err(Error::ContainerFormat(
                "compound file is not little-endian".to_string(),
            ));
        }

        let sector_size = 1usize << header.sector_shift.get();
        let mini_sector_size = 1usize << header.mini_sector_shift.get();
        let dll_version = header.dll_version.get();
        if (dll_version == 3 && sector_size != 512) || (dll_version == 4 && sector_size != 4096) {
            return Err(Error::ContainerFormat(format!(
                "sector size {sector_size} does not match format version {dll_version}"
            )));
        }

        let mut file = CompoundFile {
            reader,
            sector_size,
            mini_sector_size,
            fat: Vec::new(),
            minifat: Vec::new(),
            streams: Vec::new(),
            ministream_start: ENDOFCHAIN,
            ministream: None,
        };

        file.load_fat(
            &header_block,
            header.first_difat_sector.get(),
            header.num_difat_sectors.get(),
        )?;
        file.load_directory(header.first_dir_sector.get(), header.mini_stream_cutoff.get())?;
        if header.num_minifat_sectors.get() > 0 {
            file.load_minifat(header.first_minifat_sector.get())?;
        }

        Ok(file)
    }

    /// Look up a stream by name, case-insensitive, anywhere in the directory.
    /// Returns `None` when no stream by that name exists.
    pub fn open_stream(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let entry = match self
            .streams
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        let data = if entry.is_minifat {
            self.read_minifat_chain(entry.start_sector, entry.size)?
        } else {
            let mut data = self.read_fat_chain(entry.start_sector)?;
            data.truncate(entry.size as usize);
            data
        };
        Ok(Some(data))
    }

    /// The first 109 FAT sector indexes live in the header; further indexes
    /// chain through DIFAT sectors.
    fn load_fat(
        &mut self,
        header_block: &[u8; 512],
        first_difat_sector: u32,
        num_difat_sectors: u32,
    ) -> Result<()> {
        let mut fat_sectors = Vec::new();
        for i in 0..109 {
            let offset = 0x4C + i * 4;
            let sector = read_u32(&header_block[offset..offset + 4]);
            if sector == FREESECT || sector == ENDOFCHAIN {
                break;
            }
            fat_sectors.push(sector);
        }

        let entries_per_difat = self.sector_size / 4 - 1; // last slot chains to the next DIFAT
        let mut difat_sector = first_difat_sector;
        for _ in 0..num_difat_sectors {
            if difat_sector == ENDOFCHAIN || difat_sector == FREESECT {
                break;
            }
            let sector_data = self.read_sector(difat_sector)?;
            for i in 0..entries_per_difat {
                let sector = read_u32(&sector_data[i * 4..i * 4 + 4]);
                if sector == FREESECT || sector == ENDOFCHAIN {
                    break;
                }
                fat_sectors.push(sector);
            }
            difat_sector = read_u32(&sector_data[entries_per_difat * 4..]);
        }

        let entries_per_sector = self.sector_size / 4;
        self.fat.reserve(fat_sectors.len() * entries_per_sector);
        for &sector_id in &fat_sectors {
            let sector_data = self.read_sector(sector_id)?;
            for i in 0..entries_per_sector {
                self.fat.push(read_u32(&sector_data[i * 4..i * 4 + 4]));
            }
        }

        Ok(())
    }

    fn load_minifat(&mut self, first_minifat_sector: u32) -> Result<()> {
        let minifat_data = self.read_fat_chain(first_minifat_sector)?;
        self.minifat.reserve(minifat_data.len() / 4);
        for chunk in minifat_data.chunks_exact(4) {
            self.minifat.push(read_u32(chunk));
        }
        Ok(())
    }

    /// Parse the directory table. The tree structure of sibling/child links
    /// is ignored; streams are collected flat and matched by name only.
    fn load_directory(&mut self, first_dir_sector: u32, mini_stream_cutoff: u32) -> Result<()> {
        let dir_data = self.read_fat_chain(first_dir_sector)?;
        if dir_data.len() < DIRENTRY_SIZE {
            return Err(Error::ContainerFormat("empty directory table".to_string()));
        }

        for (sid, chunk) in dir_data.chunks_exact(DIRENTRY_SIZE).enumerate() {
            let raw = RawDirectoryEntry::read_from_bytes(chunk).map_err(|_| {
                Error::ContainerFormat(format!("unreadable directory entry {sid}"))
            })?;

            // 512-byte-sector files only use the low half of the size field.
            let size = if self.sector_size == 512 {
                raw.stream_size.get() & 0xFFFF_FFFF
            } else {
                raw.stream_size.get()
            };

            match raw.entry_type {
                STGTY_ROOT => self.ministream_start = raw.start_sector.get(),
                STGTY_STREAM => {
                    let name_len = raw.name_len.get() as usize;
                    let name_bytes = &raw.name[..name_len.saturating_sub(2).min(64)];
                    self.streams.push(StreamEntry {
                        name: decode_utf16le(name_bytes),
                        start_sector: raw.start_sector.get(),
                        size,
                        is_minifat: size < mini_stream_cutoff as u64,
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn read_sector(&mut self, sector_id: u32) -> Result<Vec<u8>> {
        let position = (sector_id as u64 + 1) * self.sector_size as u64;
        self.reader.seek(SeekFrom::Start(position))?;
        let mut buffer = vec![0u8; self.sector_size];
        self.reader.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Follow a FAT chain from `start_sector`. A chain longer than the FAT
    /// itself must contain a cycle.
    fn read_fat_chain(&mut self, start_sector: u32) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut sector = start_sector;
        let mut visited = 0usize;

        while sector != ENDOFCHAIN {
            if sector as usize >= self.fat.len() || visited > self.fat.len() {
                return Err(Error::ContainerFormat(
                    "broken sector chain in allocation table".to_string(),
                ));
            }
            let sector_data = self.read_sector(sector)?;
            data.extend_from_slice(&sector_data);
            sector = self.fat[sector as usize];
            visited += 1;
        }

        Ok(data)
    }

    fn read_minifat_chain(&mut self, start_sector: u32, size: u64) -> Result<Vec<u8>> {
        if self.ministream.is_none() {
            if self.ministream_start == ENDOFCHAIN {
                return Err(Error::ContainerFormat(
                    "mini stream requested but root entry has no sectors".to_string(),
                ));
            }
            let ministream = self.read_fat_chain(self.ministream_start)?;
            self.ministream = Some(ministream);
        }
        let ministream = self.ministream.as_ref().ok_or_else(|| {
            Error::ContainerFormat("mini stream unavailable".to_string())
        })?;

        let mut data = Vec::new();
        let mut sector = start_sector;
        let mut visited = 0usize;

        while sector != ENDOFCHAIN {
            if sector as usize >= self.minifat.len() || visited > self.minifat.len() {
                return Err(Error::ContainerFormat(
                    "broken sector chain in mini allocation table".to_string(),
                ));
            }
            let position = sector as usize * self.mini_sector_size;
            let end = position + self.mini_sector_size;
            if end > ministream.len() {
                return Err(Error::ContainerFormat(
                    "mini sector past end of mini stream".to_string(),
                ));
            }
            data.extend_from_slice(&ministream[position..end]);
            sector = self.minifat[sector as usize];
            visited += 1;
        }

        data.truncate(size as usize);
        Ok(data)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    U32::<LE>::read_from_bytes(&bytes[..4]).map(|v| v.get()).unwrap_or(0)
}

/// Decode UTF-16LE bytes to String, dropping trailing nulls.
fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| U16::<LE>::read_from_bytes(chunk).map(|v| v.get()).unwrap_or(0))
        .collect();
    String::from_utf16_lossy(&units)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_short_input() {
        let err = CompoundFile::open(Cursor::new(vec![0u8; 100])).unwrap_err();
        assert!(matches!(err, Error::ContainerFormat(_)));
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut data = vec![0u8; 1536];
        data[..4].copy_from_slice(b"PK\x03\x04");
        let err = CompoundFile::open(Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::ContainerFormat(_)));
    }

    #[test]
    fn decodes_utf16_names() {
        let bytes: Vec<u8> = "Workbook"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        assert_eq!(decode_utf16le(&bytes), "Workbook");
    }
}
