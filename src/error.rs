use std::fmt;

use thiserror::Error;

/// The offset-addressed regions of a prefetch file body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    FileInformation,
    FileMetrics,
    TraceChains,
    FilenameStrings,
    VolumesInfo,
    FileReferences,
    DirectoryStrings,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Header => "header",
            Section::FileInformation => "file information",
            Section::FileMetrics => "file metrics",
            Section::TraceChains => "trace chains",
            Section::FilenameStrings => "filename strings",
            Section::VolumesInfo => "volumes information",
            Section::FileReferences => "file references",
            Section::DirectoryStrings => "directory strings",
        };
        f.write_str(name)
    }
}

/// Everything that can go wrong while turning a `.pf` file into a
/// [`crate::PrefetchFile`]. Corruption is deterministic, so none of these are
/// retried; callers decide per kind whether to skip, log or abort a batch.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot read prefetch file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is neither raw prefetch data nor a recognizable MAM container.
    #[error("compressed container error: {0}")]
    Decompression(String),

    #[error("unknown prefetch version tag 0x{0:02x}")]
    UnknownVersion(u32),

    #[error("header signature is not 'SCCA' (found {found:02x?})")]
    InvalidSignature { found: [u8; 4] },

    /// An all-or-nothing section could not be decoded; the whole file fails.
    #[error("failed to decode {section} section: {cause}")]
    Section { section: Section, cause: String },

    /// A per-volume sub-section could not be decoded. Recorded as absent by
    /// the caller; the rest of the file still decodes.
    #[error("failed to decode {section} for volume {volume_index}: {cause}")]
    Subsection {
        volume_index: usize,
        section: Section,
        cause: String,
    },
}

impl DecodeError {
    pub(crate) fn section(section: Section, cause: impl fmt::Display) -> Self {
        DecodeError::Section {
            section,
            cause: cause.to_string(),
        }
    }

    pub(crate) fn subsection(
        volume_index: usize,
        section: Section,
        cause: impl fmt::Display,
    ) -> Self {
        DecodeError::Subsection {
            volume_index,
            section,
            cause: cause.to_string(),
        }
    }
}

/// A FILETIME tick count that does not map into the representable
/// calendar-time range.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("FILETIME value 0x{0:016x} is outside the representable calendar range")]
pub struct TimeError(pub u64);
