// Sources:
// - https://github.com/libyal/libscca/blob/main/documentation/Windows%20Prefetch%20File%20(PF)%20format.asciidoc
//
// Fixed-size record shapes for each file-format generation. All fields are
// little-endian. Generations 26 and 30 reuse 23's file-metrics shape, 30's
// file-information reuses 26's, and only the trailing padding distinguishes
// the volume-information shapes of 23/26 and 30.

use std::io::{self, Cursor, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::filetime::decode_filetime;
use crate::header::PrefetchVersion;

/// NTFS Master File Table record identifier embedded in file metrics and in
/// the per-volume file-references array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct MftFileReference {
    pub segment_number: u32,
    pub sequence_number: u16,
}

impl MftFileReference {
    pub const SIZE: usize = 8;

    pub fn from_reader(c: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let segment_number = c.read_u32::<LittleEndian>()?;
        c.seek(SeekFrom::Current(2))?;
        let sequence_number = c.read_u16::<LittleEndian>()?;
        Ok(MftFileReference {
            segment_number,
            sequence_number,
        })
    }
}

/// Section descriptors plus execution metadata, directly after the header.
///
/// Raw timestamps are converted to calendar time at decode; a slot that
/// cannot be converted stays `None` so the array keeps its positional
/// correspondence. The 1601-epoch sentinel is *not* filtered here — that is
/// the consumption layer's job.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileInformation {
    pub section_a_offset: u32,
    pub section_a_entries_count: u32,
    pub section_b_offset: u32,
    pub section_b_entries_count: u32,
    pub section_c_offset: u32,
    pub section_c_length: u32,
    pub section_d_offset: u32,
    pub section_d_entries_count: u32,
    pub section_d_length: u32,
    pub raw_last_execution_times: Vec<u64>,
    pub last_execution_times: Vec<Option<DateTime<Utc>>>,
    pub execution_count: u32,
}

impl FileInformation {
    pub fn record_size(version: PrefetchVersion) -> usize {
        match version {
            PrefetchVersion::Xp => 68,
            PrefetchVersion::Seven => 156,
            PrefetchVersion::Eight | PrefetchVersion::Ten => 224,
        }
    }

    /// XP and SEVEN carry one last-execution time, EIGHT and TEN carry eight.
    pub fn timestamp_count(version: PrefetchVersion) -> usize {
        match version {
            PrefetchVersion::Xp | PrefetchVersion::Seven => 1,
            PrefetchVersion::Eight | PrefetchVersion::Ten => 8,
        }
    }

    pub fn from_reader(c: &mut Cursor<&[u8]>, version: PrefetchVersion) -> io::Result<Self> {
        let section_a_offset = c.read_u32::<LittleEndian>()?;
        let section_a_entries_count = c.read_u32::<LittleEndian>()?;
        let section_b_offset = c.read_u32::<LittleEndian>()?;
        let section_b_entries_count = c.read_u32::<LittleEndian>()?;
        let section_c_offset = c.read_u32::<LittleEndian>()?;
        let section_c_length = c.read_u32::<LittleEndian>()?;
        let section_d_offset = c.read_u32::<LittleEndian>()?;
        let section_d_entries_count = c.read_u32::<LittleEndian>()?;
        let section_d_length = c.read_u32::<LittleEndian>()?;

        if version != PrefetchVersion::Xp {
            c.seek(SeekFrom::Current(8))?;
        }

        let count = Self::timestamp_count(version);
        let mut raw_last_execution_times = Vec::with_capacity(count);
        let mut last_execution_times = Vec::with_capacity(count);
        for _ in 0..count {
            let low = c.read_u32::<LittleEndian>()?;
            let high = c.read_u32::<LittleEndian>()?;
            raw_last_execution_times.push(((high as u64) << 32) | low as u64);
            match decode_filetime(low, high) {
                Ok(ts) => last_execution_times.push(Some(ts)),
                Err(e) => {
                    warn!("Unconvertible last-execution time: {}", e);
                    last_execution_times.push(None);
                }
            }
        }

        c.seek(SeekFrom::Current(16))?;
        let execution_count = c.read_u32::<LittleEndian>()?;
        let trailing = match version {
            PrefetchVersion::Xp => 4,
            PrefetchVersion::Seven => 84,
            PrefetchVersion::Eight | PrefetchVersion::Ten => 96,
        };
        c.seek(SeekFrom::Current(trailing))?;

        Ok(FileInformation {
            section_a_offset,
            section_a_entries_count,
            section_b_offset,
            section_b_entries_count,
            section_c_offset,
            section_c_length,
            section_d_offset,
            section_d_entries_count,
            section_d_length,
            raw_last_execution_times,
            last_execution_times,
            execution_count,
        })
    }
}

/// One Section-A record. XP's shape has neither an average duration nor an
/// MFT reference; all later generations share the extended shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum FileMetricsEntry {
    Basic {
        start_time: u32,
        duration: u32,
        filename_offset: u32,
        filename_length: u32,
    },
    Referenced {
        start_time: u32,
        duration: u32,
        average_duration: u32,
        filename_offset: u32,
        filename_length: u32,
        mft_reference: MftFileReference,
    },
}

impl FileMetricsEntry {
    pub fn record_size(version: PrefetchVersion) -> usize {
        match version {
            PrefetchVersion::Xp => 20,
            _ => 32,
        }
    }

    pub fn from_reader(c: &mut Cursor<&[u8]>, version: PrefetchVersion) -> io::Result<Self> {
        if version == PrefetchVersion::Xp {
            let start_time = c.read_u32::<LittleEndian>()?;
            let duration = c.read_u32::<LittleEndian>()?;
            let filename_offset = c.read_u32::<LittleEndian>()?;
            let filename_length = c.read_u32::<LittleEndian>()?;
            c.seek(SeekFrom::Current(4))?;
            Ok(FileMetricsEntry::Basic {
                start_time,
                duration,
                filename_offset,
                filename_length,
            })
        } else {
            let start_time = c.read_u32::<LittleEndian>()?;
            let duration = c.read_u32::<LittleEndian>()?;
            let average_duration = c.read_u32::<LittleEndian>()?;
            let filename_offset = c.read_u32::<LittleEndian>()?;
            let filename_length = c.read_u32::<LittleEndian>()?;
            c.seek(SeekFrom::Current(4))?;
            let mft_reference = MftFileReference::from_reader(c)?;
            Ok(FileMetricsEntry::Referenced {
                start_time,
                duration,
                average_duration,
                filename_offset,
                filename_length,
                mft_reference,
            })
        }
    }

    /// Offset of the associated filename string, relative to Section C.
    pub fn filename_offset(&self) -> u32 {
        match self {
            FileMetricsEntry::Basic {
                filename_offset, ..
            }
            | FileMetricsEntry::Referenced {
                filename_offset, ..
            } => *filename_offset,
        }
    }

    pub fn filename_length(&self) -> u32 {
        match self {
            FileMetricsEntry::Basic {
                filename_length, ..
            }
            | FileMetricsEntry::Referenced {
                filename_length, ..
            } => *filename_length,
        }
    }

    pub fn mft_reference(&self) -> Option<&MftFileReference> {
        match self {
            FileMetricsEntry::Basic { .. } => None,
            FileMetricsEntry::Referenced { mft_reference, .. } => Some(mft_reference),
        }
    }
}

/// One Section-B record (12 bytes, shape shared by all generations).
///
/// `next_entry_index` is a linked-list pointer within the array (0 = start,
/// 0xFFFFFFFF = end); informational only, never dereferenced during decode.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TraceChainEntry {
    pub next_entry_index: u32,
    pub total_block_load_count: u32,
    pub sample_duration: u8,
}

impl TraceChainEntry {
    pub const SIZE: usize = 12;

    pub fn from_reader(c: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let next_entry_index = c.read_u32::<LittleEndian>()?;
        let total_block_load_count = c.read_u32::<LittleEndian>()?;
        c.seek(SeekFrom::Current(1))?;
        let sample_duration = c.read_u8()?;
        c.seek(SeekFrom::Current(2))?;
        Ok(TraceChainEntry {
            next_entry_index,
            total_block_load_count,
            sample_duration,
        })
    }
}

/// One Section-D entry. The device-path offset and the Section E/F offsets
/// are relative to the start of Section D, not to the file start.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VolumeInformation {
    pub device_path_offset: u32,
    pub device_path_length: u32,
    pub raw_create_time: u64,
    pub create_time: Option<DateTime<Utc>>,
    pub serial_number: u32,
    pub section_e_offset: u32,
    pub section_e_length: u32,
    pub section_f_offset: u32,
    pub section_f_strings_count: u32,
    /// Read out-of-line by the section decoder after the fixed record.
    pub device_path: String,
}

impl VolumeInformation {
    pub fn record_size(version: PrefetchVersion) -> usize {
        match version {
            PrefetchVersion::Xp => 40,
            PrefetchVersion::Seven | PrefetchVersion::Eight => 104,
            PrefetchVersion::Ten => 96,
        }
    }

    pub fn from_reader(c: &mut Cursor<&[u8]>, version: PrefetchVersion) -> io::Result<Self> {
        let device_path_offset = c.read_u32::<LittleEndian>()?;
        let device_path_length = c.read_u32::<LittleEndian>()?;
        let low = c.read_u32::<LittleEndian>()?;
        let high = c.read_u32::<LittleEndian>()?;
        let raw_create_time = ((high as u64) << 32) | low as u64;
        let create_time = match decode_filetime(low, high) {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("Unconvertible volume create time: {}", e);
                None
            }
        };
        let serial_number = c.read_u32::<LittleEndian>()?;
        let section_e_offset = c.read_u32::<LittleEndian>()?;
        let section_e_length = c.read_u32::<LittleEndian>()?;
        let section_f_offset = c.read_u32::<LittleEndian>()?;
        let section_f_strings_count = c.read_u32::<LittleEndian>()?;
        let trailing = match version {
            PrefetchVersion::Xp => 4,
            PrefetchVersion::Seven | PrefetchVersion::Eight => 68,
            PrefetchVersion::Ten => 60,
        };
        c.seek(SeekFrom::Current(trailing))?;

        Ok(VolumeInformation {
            device_path_offset,
            device_path_length,
            raw_create_time,
            create_time,
            serial_number,
            section_e_offset,
            section_e_length,
            section_f_offset,
            section_f_strings_count,
            device_path: String::new(),
        })
    }
}

/// Section E: count-prefixed array of MFT file references for one volume.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileReferences {
    pub reference_count: u32,
    pub references: Vec<MftFileReference>,
}

/// Section F: one length-prefixed UTF-16 directory path for one volume.
/// Length-0 entries are valid and carry no string.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryString {
    pub length: u16,
    pub value: Option<String>,
}
