// Offset-driven extraction of the six body sections. Every function takes the
// read-only raw buffer plus the already-decoded sections it depends on and
// works on its own local cursor, so sections can be decoded in any order once
// their dependencies exist and a failure in one leaves the others untouched.

use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{DecodeError, Section};
use crate::header::{PrefetchHeader, PrefetchVersion};
use crate::records::{
    DirectoryString, FileInformation, FileMetricsEntry, FileReferences, MftFileReference,
    TraceChainEntry, VolumeInformation,
};
use crate::utf16_trimmed;

/// Offsets come from untrusted input; every section validates its range
/// against the buffer before reading.
fn ensure_range(buf: &[u8], offset: u64, len: u64, section: Section) -> Result<(), DecodeError> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| DecodeError::section(section, "section range overflows"))?;
    if end > buf.len() as u64 {
        return Err(DecodeError::section(
            section,
            format!(
                "section range {}..{} exceeds buffer of {} bytes",
                offset,
                end,
                buf.len()
            ),
        ));
    }
    Ok(())
}

/// Read UTF-16LE code units until a null terminator or the end of the buffer.
fn read_utf16_cstring(c: &mut Cursor<&[u8]>) -> String {
    let mut units = Vec::new();
    loop {
        match c.read_u16::<LittleEndian>() {
            Ok(0) | Err(_) => break,
            Ok(u) => units.push(u),
        }
    }
    String::from_utf16_lossy(&units)
}

/// Decode the file-information record directly after the header.
pub fn decode_file_information(
    buf: &[u8],
    version: PrefetchVersion,
) -> Result<FileInformation, DecodeError> {
    let offset = PrefetchHeader::SIZE as u64;
    let size = FileInformation::record_size(version) as u64;
    ensure_range(buf, offset, size, Section::FileInformation)?;
    let mut c = Cursor::new(buf);
    c.set_position(offset);
    FileInformation::from_reader(&mut c, version)
        .map_err(|e| DecodeError::section(Section::FileInformation, e))
}

/// Decode the Section-A file-metrics array. The declared count is trusted
/// only against the remaining buffer length; a short buffer mid-array fails
/// the whole section.
pub fn decode_file_metrics(
    buf: &[u8],
    version: PrefetchVersion,
    info: &FileInformation,
) -> Result<Vec<FileMetricsEntry>, DecodeError> {
    let count = info.section_a_entries_count as u64;
    let size = FileMetricsEntry::record_size(version) as u64;
    let need = count
        .checked_mul(size)
        .ok_or_else(|| DecodeError::section(Section::FileMetrics, "entry count overflows"))?;
    ensure_range(buf, info.section_a_offset as u64, need, Section::FileMetrics)?;

    let mut c = Cursor::new(buf);
    c.set_position(info.section_a_offset as u64);
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(
            FileMetricsEntry::from_reader(&mut c, version)
                .map_err(|e| DecodeError::section(Section::FileMetrics, e))?,
        );
    }
    Ok(entries)
}

/// Decode the Section-B trace-chains array. Same all-or-nothing policy as
/// the file metrics.
pub fn decode_trace_chains(
    buf: &[u8],
    info: &FileInformation,
) -> Result<Vec<TraceChainEntry>, DecodeError> {
    let count = info.section_b_entries_count as u64;
    let need = count
        .checked_mul(TraceChainEntry::SIZE as u64)
        .ok_or_else(|| DecodeError::section(Section::TraceChains, "entry count overflows"))?;
    ensure_range(buf, info.section_b_offset as u64, need, Section::TraceChains)?;

    let mut c = Cursor::new(buf);
    c.set_position(info.section_b_offset as u64);
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(
            TraceChainEntry::from_reader(&mut c)
                .map_err(|e| DecodeError::section(Section::TraceChains, e))?,
        );
    }
    Ok(entries)
}

/// Decode one null-terminated UTF-16 string per file-metrics entry from
/// Section C. The array stays positionally aligned with the metrics: once
/// the read position leaves `[SectionCOffset, SectionCOffset+SectionCLength]`
/// the remaining entries are `None` instead of a failure.
///
/// The bound is checked before each read, so the last in-bounds string may
/// legally run past the section end; downstream tooling depends on the exact
/// number of decoded strings this timing produces.
pub fn decode_filename_strings(
    buf: &[u8],
    info: &FileInformation,
    metrics_count: usize,
) -> Vec<Option<String>> {
    let c_off = info.section_c_offset as u64;
    let c_len = info.section_c_length as u64;
    let mut c = Cursor::new(buf);
    c.set_position(c_off);

    let mut strings = Vec::with_capacity(metrics_count);
    for _ in 0..metrics_count {
        let pos = c.position();
        if pos.saturating_sub(c_off) > c_len || pos >= buf.len() as u64 {
            strings.push(None);
            continue;
        }
        strings.push(Some(read_utf16_cstring(&mut c)));
    }
    strings
}

/// Decode the Section-D volume-information array, including each volume's
/// out-of-line device path. The device-path read happens between the fixed
/// records, so the post-record position is captured and restored around it.
pub fn decode_volumes_info(
    buf: &[u8],
    version: PrefetchVersion,
    info: &FileInformation,
) -> Result<Vec<VolumeInformation>, DecodeError> {
    let d_off = info.section_d_offset as u64;
    let count = info.section_d_entries_count as u64;
    let size = VolumeInformation::record_size(version) as u64;
    let need = count
        .checked_mul(size)
        .ok_or_else(|| DecodeError::section(Section::VolumesInfo, "entry count overflows"))?;
    ensure_range(buf, d_off, need, Section::VolumesInfo)?;

    let mut c = Cursor::new(buf);
    c.set_position(d_off);
    let mut volumes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut volume = VolumeInformation::from_reader(&mut c, version)
            .map_err(|e| DecodeError::section(Section::VolumesInfo, e))?;
        let after_record = c.position();

        // The device-path offset is relative to the start of Section D.
        let path_off = d_off + volume.device_path_offset as u64;
        let path_len = (volume.device_path_length as u64) * 2;
        ensure_range(buf, path_off, path_len, Section::VolumesInfo)?;
        volume.device_path =
            utf16_trimmed(&buf[path_off as usize..(path_off + path_len) as usize]);

        c.set_position(after_record);
        volumes.push(volume);
    }
    Ok(volumes)
}

/// Decode one volume's Section-E file-references array. The offset is
/// relative to Section D's start. Failures are reported as subsection errors
/// so the caller can record the section as absent and keep going.
pub fn decode_file_references(
    buf: &[u8],
    section_d_offset: u64,
    volume_index: usize,
    volume: &VolumeInformation,
) -> Result<FileReferences, DecodeError> {
    let offset = section_d_offset + volume.section_e_offset as u64;
    if offset + 8 > buf.len() as u64 {
        return Err(DecodeError::subsection(
            volume_index,
            Section::FileReferences,
            "section offset out of range",
        ));
    }

    let mut c = Cursor::new(buf);
    c.set_position(offset + 4);
    let reference_count = c
        .read_u32::<LittleEndian>()
        .map_err(|e| DecodeError::subsection(volume_index, Section::FileReferences, e))?;

    let need = reference_count as u64 * MftFileReference::SIZE as u64;
    if c.position() + need > buf.len() as u64 {
        return Err(DecodeError::subsection(
            volume_index,
            Section::FileReferences,
            format!("reference count {} exceeds buffer", reference_count),
        ));
    }

    let mut references = Vec::with_capacity(reference_count as usize);
    for _ in 0..reference_count {
        references.push(
            MftFileReference::from_reader(&mut c)
                .map_err(|e| DecodeError::subsection(volume_index, Section::FileReferences, e))?,
        );
    }
    Ok(FileReferences {
        reference_count,
        references,
    })
}

/// Decode one volume's Section-F directory strings. Offset relative to
/// Section D's start; same per-volume failure tolerance as Section E.
pub fn decode_directory_strings(
    buf: &[u8],
    section_d_offset: u64,
    volume_index: usize,
    volume: &VolumeInformation,
) -> Result<Vec<DirectoryString>, DecodeError> {
    let offset = section_d_offset + volume.section_f_offset as u64;
    let count = volume.section_f_strings_count as u64;
    // every entry is at least a length word and a terminator
    if offset + count * 4 > buf.len() as u64 {
        return Err(DecodeError::subsection(
            volume_index,
            Section::DirectoryStrings,
            "section range out of bounds",
        ));
    }

    let mut c = Cursor::new(buf);
    c.set_position(offset);
    let mut strings = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let length = c
            .read_u16::<LittleEndian>()
            .map_err(|e| DecodeError::subsection(volume_index, Section::DirectoryStrings, e))?;
        let value = if length > 0 {
            let mut raw = vec![0u8; length as usize * 2];
            c.read_exact(&mut raw).map_err(|e| {
                DecodeError::subsection(volume_index, Section::DirectoryStrings, e)
            })?;
            Some(utf16_trimmed(&raw))
        } else {
            None
        };
        c.seek(SeekFrom::Current(2))
            .map_err(|e| DecodeError::subsection(volume_index, Section::DirectoryStrings, e))?;
        strings.push(DirectoryString { length, value });
    }
    Ok(strings)
}
