// Sources:
// - https://github.com/libyal/libscca/blob/main/documentation/Windows%20Prefetch%20File%20(PF)%20format.asciidoc
// - https://forensics.wiki/prefetch/
//
// Decoding a prefetch file is a linear pipeline with no backtracking:
// header -> file information -> {file metrics, trace chains} -> filename
// strings -> volumes information -> {file references, directory strings}
// per volume. One file in, one owned `PrefetchFile` or a typed error out;
// no shared state, so independent files decode safely in parallel.

use std::io;
use std::path::Path;

use log::error;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub mod error;
pub mod filetime;
pub mod header;
pub mod mam;
pub mod metadata;
pub mod records;
pub mod sections;

pub use error::{DecodeError, Section};
pub use header::{PrefetchHeader, PrefetchVersion};
pub use metadata::FileMetadata;
pub use records::{
    DirectoryString, FileInformation, FileMetricsEntry, FileReferences, MftFileReference,
    TraceChainEntry, VolumeInformation,
};

use filetime::{format_timestamp, is_epoch_sentinel};

/// Decode UTF-16LE bytes, truncating at the first null code unit.
pub(crate) fn utf16_trimmed(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Field order of the CSV exporter.
pub const CSV_FIELDS: [&str; 19] = [
    "nodeidx",
    "Version",
    "Signature",
    "ExecutableName",
    "PrefetchHash",
    "SectionAEntriesCount",
    "SectionBEntriesCount",
    "SectionCLength",
    "SectionDEntriesCount",
    "LastExecutionTime",
    "ExecutionCount",
    "FileNameStrings",
    "VolumeDevicePath",
    "VolumeCreateTime",
    "VolumeSerialNumber",
    "FileMetricsCount",
    "TraceChainsCount",
    "FileReferenceCount",
    "DirectoryStringCount",
];

/// A fully decoded prefetch file. Populated once, in dependency order,
/// during a single decode pass; output formatters only read it.
///
/// `file_references` and `directory_strings` run parallel to `volumes`;
/// a `None` entry means that volume's sub-section was corrupt and was
/// skipped without failing the rest of the file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrefetchFile {
    pub header: PrefetchHeader,
    pub file_info: FileInformation,
    pub file_metrics: Vec<FileMetricsEntry>,
    pub trace_chains: Vec<TraceChainEntry>,
    pub filename_strings: Vec<Option<String>>,
    pub volumes: Vec<VolumeInformation>,
    pub file_references: Vec<Option<FileReferences>>,
    pub directory_strings: Vec<Option<Vec<DirectoryString>>>,
}

impl PrefetchFile {
    /// Read a `.pf` file from disk, inflating a MAM container if needed,
    /// and decode it.
    pub fn from_path(path: &Path) -> Result<Self, DecodeError> {
        let raw = mam::load_raw(path)?;
        Self::from_bytes(&raw)
    }

    /// Decode raw (already decompressed) prefetch bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        let header = PrefetchHeader::from_bytes(buf)?;
        let file_info = sections::decode_file_information(buf, header.version)?;
        let file_metrics = sections::decode_file_metrics(buf, header.version, &file_info)?;
        let trace_chains = sections::decode_trace_chains(buf, &file_info)?;
        let filename_strings =
            sections::decode_filename_strings(buf, &file_info, file_metrics.len());
        let volumes = sections::decode_volumes_info(buf, header.version, &file_info)?;

        // Each volume's sub-sections are independently fallible: multi-volume
        // files in the wild routinely carry one corrupt volume, and losing
        // that volume must not lose the file.
        let d_off = file_info.section_d_offset as u64;
        let mut file_references = Vec::with_capacity(volumes.len());
        let mut directory_strings = Vec::with_capacity(volumes.len());
        for (idx, volume) in volumes.iter().enumerate() {
            match sections::decode_file_references(buf, d_off, idx, volume) {
                Ok(refs) => file_references.push(Some(refs)),
                Err(e) => {
                    error!("{}", e);
                    file_references.push(None);
                }
            }
            match sections::decode_directory_strings(buf, d_off, idx, volume) {
                Ok(strings) => directory_strings.push(Some(strings)),
                Err(e) => {
                    error!("{}", e);
                    directory_strings.push(None);
                }
            }
        }

        Ok(PrefetchFile {
            header,
            file_info,
            file_metrics,
            trace_chains,
            filename_strings,
            volumes,
            file_references,
            directory_strings,
        })
    }

    /// Filesystem metadata (size, hashes, stat times) of the `.pf` file
    /// itself. Plain file I/O, independent of the decoded contents.
    pub fn metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        FileMetadata::from_path(path)
    }

    /// First last-execution time, with the 1601-epoch sentinel filtered.
    pub fn last_execution_time(&self) -> Option<&chrono::DateTime<chrono::Utc>> {
        self.file_info
            .last_execution_times
            .first()
            .and_then(|slot| slot.as_ref())
            .filter(|ts| !is_epoch_sentinel(ts))
    }

    /// All non-sentinel last-execution times, in on-disk order.
    pub fn execution_events(&self) -> Vec<&chrono::DateTime<chrono::Utc>> {
        self.file_info
            .last_execution_times
            .iter()
            .flatten()
            .filter(|ts| !is_epoch_sentinel(ts))
            .collect()
    }

    /// One row in the CSV layout of [`CSV_FIELDS`]. Multi-valued fields are
    /// `|`-joined; absent values render as empty strings.
    pub fn csv_record(&self, nodeidx: u64) -> Vec<String> {
        let join = |parts: Vec<String>| parts.join("|");
        vec![
            nodeidx.to_string(),
            self.header.version.to_string(),
            String::from_utf8_lossy(&self.header.signature).into_owned(),
            self.header.executable_name.clone(),
            self.header.hash_string(),
            self.file_info.section_a_entries_count.to_string(),
            self.file_info.section_b_entries_count.to_string(),
            self.file_info.section_c_length.to_string(),
            self.file_info.section_d_entries_count.to_string(),
            self.last_execution_time()
                .map(format_timestamp)
                .unwrap_or_default(),
            self.file_info.execution_count.to_string(),
            join(
                self.filename_strings
                    .iter()
                    .map(|s| s.clone().unwrap_or_default())
                    .collect(),
            ),
            join(self.volumes.iter().map(|v| v.device_path.clone()).collect()),
            join(
                self.volumes
                    .iter()
                    .map(|v| {
                        v.create_time
                            .as_ref()
                            .map(format_timestamp)
                            .unwrap_or_default()
                    })
                    .collect(),
            ),
            join(
                self.volumes
                    .iter()
                    .map(|v| v.serial_number.to_string())
                    .collect(),
            ),
            self.file_metrics.len().to_string(),
            self.trace_chains.len().to_string(),
            join(
                self.file_references
                    .iter()
                    .map(|r| {
                        r.as_ref()
                            .map(|r| r.references.len().to_string())
                            .unwrap_or_default()
                    })
                    .collect(),
            ),
            join(
                self.directory_strings
                    .iter()
                    .map(|d| d.as_ref().map(|d| d.len().to_string()).unwrap_or_default())
                    .collect(),
            ),
        ]
    }

    /// Timeline ("body") rows: one per non-sentinel last-execution time, with
    /// the literal `LET` in the mode column and the execution instant in
    /// every time column.
    pub fn body_records(&self, nodeidx: u64, meta: Option<&FileMetadata>) -> Vec<String> {
        let md5 = meta.map(|m| m.md5.as_str()).unwrap_or("0");
        let size = meta
            .map(|m| m.file_size)
            .unwrap_or(self.header.file_size as u64);
        self.execution_events()
            .iter()
            .map(|ts| {
                let epoch = ts.timestamp();
                format!(
                    "{}|{}|{}|0|LET|0|0|{}|{}|{}|{}|{}",
                    nodeidx, md5, self.header.executable_name, size, epoch, epoch, epoch, epoch
                )
            })
            .collect()
    }

    /// Serialization view for text transports: a deep copy of the record in
    /// which every calendar-time field is a formatted string. Sentinel and
    /// unconvertible slots become null.
    pub fn to_json(&self) -> Value {
        let fmt_slot = |slot: &Option<chrono::DateTime<chrono::Utc>>| -> Value {
            match slot {
                Some(ts) if !is_epoch_sentinel(ts) => Value::String(format_timestamp(ts)),
                _ => Value::Null,
            }
        };
        json!({
            "header": {
                "version": self.header.version.to_string(),
                "signature": String::from_utf8_lossy(&self.header.signature),
                "file_size": self.header.file_size,
                "executable_name": self.header.executable_name,
                "prefetch_hash": self.header.hash_string(),
            },
            "file_information": {
                "section_a_entries_count": self.file_info.section_a_entries_count,
                "section_b_entries_count": self.file_info.section_b_entries_count,
                "section_c_length": self.file_info.section_c_length,
                "section_d_entries_count": self.file_info.section_d_entries_count,
                "last_execution_times": self.file_info.last_execution_times
                    .iter().map(fmt_slot).collect::<Vec<_>>(),
                "execution_count": self.file_info.execution_count,
            },
            "file_metrics": &self.file_metrics,
            "trace_chains": &self.trace_chains,
            "filename_strings": &self.filename_strings,
            "volumes": self.volumes.iter().map(|v| json!({
                "device_path": v.device_path,
                "create_time": fmt_slot(&v.create_time),
                "serial_number": v.serial_number,
            })).collect::<Vec<_>>(),
            "file_references": &self.file_references,
            "directory_strings": &self.directory_strings,
        })
    }

    /// Human-readable multi-table rendering for interactive use.
    pub fn to_string(&self) -> String {
        let mut out = String::new();

        let mut hdr = Table::new();
        hdr.add_row(row!["Prefetch Header"]);
        hdr.add_row(row![b -> "Executable", self.header.executable_name]);
        hdr.add_row(row![b -> "Version", self.header.version]);
        hdr.add_row(row![b -> "Prefetch Hash", self.header.hash_string()]);
        hdr.add_row(row![b -> "File Size", self.header.file_size]);
        out.push_str(&hdr.to_string());

        let mut exec = Table::new();
        exec.add_row(row!["Execution"]);
        exec.add_row(row![b -> "Run Count", self.file_info.execution_count]);
        for (i, ts) in self.execution_events().into_iter().enumerate() {
            exec.add_row(row![format!("Last Run [{}]", i), format_timestamp(ts)]);
        }
        exec.add_row(row![b -> "Loaded Files", self.file_metrics.len()]);
        exec.add_row(row![b -> "Trace Chains", self.trace_chains.len()]);
        out.push('\n');
        out.push_str(&exec.to_string());

        for (i, volume) in self.volumes.iter().enumerate() {
            let mut vol = Table::new();
            vol.add_row(row![format!("Volume {}", i)]);
            vol.add_row(row![b -> "Device Path", volume.device_path]);
            vol.add_row(row![b -> "Create Time",
                volume.create_time.as_ref().map(format_timestamp).unwrap_or_else(|| "-".into())]);
            vol.add_row(row![b -> "Serial Number", format!("{:X}", volume.serial_number)]);
            if let Some(Some(refs)) = self.file_references.get(i) {
                vol.add_row(row![b -> "File References", refs.references.len()]);
            }
            if let Some(Some(dirs)) = self.directory_strings.get(i) {
                vol.add_row(row![b -> "Directories", dirs.len()]);
            }
            out.push('\n');
            out.push_str(&vol.to_string());
        }

        out
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use chrono::DateTime;

    #[test]
    fn end_to_end_csv_row_layout() {
        let buf = build_prefetch(PrefetchVersion::Ten);
        let pf = PrefetchFile::from_bytes(&buf).unwrap();

        assert_eq!(pf.file_metrics.len(), 2);
        assert_eq!(pf.volumes.len(), 1);
        assert_eq!(pf.filename_strings.len(), 2);

        let row = pf.csv_record(42);
        assert_eq!(row.len(), CSV_FIELDS.len());
        assert_eq!(row[0], "42");
        assert_eq!(row[1], "TEN");
        assert_eq!(row[2], "SCCA");
        assert_eq!(row[3], EXEC_NAME);
        assert_eq!(row[4], "7A3C95E2");
        assert_eq!(row[5], "2");
        assert_eq!(row[6], "2");
        assert_eq!(row[8], "1");
        assert_eq!(row[9], "2017-02-08 17:30:00.000000+0000");
        assert_eq!(row[10], "5");
        assert_eq!(row[11], FILENAMES.join("|"));
        assert_eq!(row[12], DEVICE_PATH);
        assert_eq!(row[13], "2016-05-01 09:00:00.000000+0000");
        assert_eq!(row[14], 0xA1B2C3D4u32.to_string());
        assert_eq!(row[15], "2");
        assert_eq!(row[16], "2");
        assert_eq!(row[17], "2");
        assert_eq!(row[18], "2");
    }

    #[test]
    fn sentinel_slots_are_never_execution_events() {
        // TEN carries eight last-execution slots; the fixture fills one.
        let buf = build_prefetch(PrefetchVersion::Ten);
        let pf = PrefetchFile::from_bytes(&buf).unwrap();
        assert_eq!(pf.file_info.last_execution_times.len(), 8);
        assert_eq!(pf.execution_events().len(), 1);
        assert_eq!(pf.last_execution_time(), Some(&last_execution_instant()));
    }

    #[test]
    fn body_rows_mark_last_execution_times() {
        let buf = build_prefetch(PrefetchVersion::Ten);
        let pf = PrefetchFile::from_bytes(&buf).unwrap();
        let rows = pf.body_records(7, None);
        assert_eq!(rows.len(), 1);

        let fields: Vec<&str> = rows[0].split('|').collect();
        assert_eq!(fields.len(), 12);
        assert_eq!(fields[0], "7");
        assert_eq!(fields[2], EXEC_NAME);
        assert_eq!(fields[4], "LET");
        let epoch = last_execution_instant().timestamp().to_string();
        assert_eq!(fields[8], epoch);
        assert_eq!(fields[11], epoch);
    }

    #[test]
    fn json_view_carries_no_raw_calendar_values() {
        let buf = build_prefetch(PrefetchVersion::Ten);
        let pf = PrefetchFile::from_bytes(&buf).unwrap();
        let view = pf.to_json();

        let times = view["file_information"]["last_execution_times"]
            .as_array()
            .unwrap();
        assert_eq!(times.len(), 8);
        let first = times[0].as_str().unwrap();
        assert!(
            DateTime::parse_from_str(first, filetime::TIMESTAMP_FORMAT).is_ok(),
            "unexpected timestamp rendering: {}",
            first
        );
        // sentinel slots serialize as null, not as 1601 strings
        assert!(times[1].is_null());
        assert!(
            DateTime::parse_from_str(
                view["volumes"][0]["create_time"].as_str().unwrap(),
                filetime::TIMESTAMP_FORMAT
            )
            .is_ok()
        );
    }

    #[test]
    fn xp_metrics_expose_no_mft_reference() {
        let buf = build_prefetch(PrefetchVersion::Xp);
        let pf = PrefetchFile::from_bytes(&buf).unwrap();
        assert!(pf.file_metrics[0].mft_reference().is_none());

        let buf = build_prefetch(PrefetchVersion::Seven);
        let pf = PrefetchFile::from_bytes(&buf).unwrap();
        let mft = pf.file_metrics[1].mft_reference().unwrap();
        assert_eq!(mft.segment_number, 1001);
        assert_eq!(mft.sequence_number, 2);
    }

    #[test]
    fn table_rendering_mentions_the_essentials() {
        let buf = build_prefetch(PrefetchVersion::Seven);
        let pf = PrefetchFile::from_bytes(&buf).unwrap();
        let text = pf.to_string();
        assert!(text.contains(EXEC_NAME));
        assert!(text.contains("7A3C95E2"));
        assert!(text.contains(DEVICE_PATH));
    }
}
