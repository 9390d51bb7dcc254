// Sources:
// - https://github.com/libyal/libscca/blob/main/documentation/Windows%20Prefetch%20File%20(PF)%20format.asciidoc

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use log::error;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Section};
use crate::utf16_trimmed;

/// On-disk signature found at offset 4 of every raw prefetch file.
pub const SIGNATURE: [u8; 4] = *b"SCCA";

/// The four file-format generations, keyed on the 32-bit tag at offset 0.
/// Picked once at header decode and threaded through every later section to
/// select record shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum PrefetchVersion {
    Xp,
    Seven,
    Eight,
    Ten,
}

impl PrefetchVersion {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x11 => Some(PrefetchVersion::Xp),
            0x17 => Some(PrefetchVersion::Seven),
            0x1a => Some(PrefetchVersion::Eight),
            0x1e => Some(PrefetchVersion::Ten),
            _ => None,
        }
    }

    /// On-disk record-shape generation ("17", "23", "26", "30").
    pub fn generation(&self) -> u8 {
        match self {
            PrefetchVersion::Xp => 17,
            PrefetchVersion::Seven => 23,
            PrefetchVersion::Eight => 26,
            PrefetchVersion::Ten => 30,
        }
    }
}

impl fmt::Display for PrefetchVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrefetchVersion::Xp => "XP",
            PrefetchVersion::Seven => "SEVEN",
            PrefetchVersion::Eight => "EIGHT",
            PrefetchVersion::Ten => "TEN",
        };
        f.write_str(name)
    }
}

/// 84-byte header at the very start of the file body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrefetchHeader {
    pub version: PrefetchVersion,
    pub signature: [u8; 4],
    pub file_size: u32,
    /// Executable name, UTF-16 decoded from the fixed 60-byte field and
    /// truncated at the first null.
    pub executable_name: String,
    pub prefetch_hash: u32,
}

impl PrefetchHeader {
    pub const SIZE: usize = 84;

    /// Decode the header at offset 0 of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut c = Cursor::new(buf);

        let tag = c
            .read_u32::<LittleEndian>()
            .map_err(|e| DecodeError::section(Section::Header, e))?;
        let version = PrefetchVersion::from_tag(tag).ok_or_else(|| {
            error!("Version tag 0x{:02x} is not a known prefetch version.", tag);
            DecodeError::UnknownVersion(tag)
        })?;

        let mut signature = [0u8; 4];
        c.read_exact(&mut signature)
            .map_err(|e| DecodeError::section(Section::Header, e))?;
        if signature != SIGNATURE {
            error!(
                "Header signature is not 'SCCA', found: {}",
                String::from_utf8_lossy(&signature)
            );
            return Err(DecodeError::InvalidSignature { found: signature });
        }

        c.set_position(c.position() + 4);
        let file_size = c
            .read_u32::<LittleEndian>()
            .map_err(|e| DecodeError::section(Section::Header, e))?;

        let mut raw_name = [0u8; 60];
        c.read_exact(&mut raw_name)
            .map_err(|e| DecodeError::section(Section::Header, e))?;
        let executable_name = utf16_trimmed(&raw_name);

        let prefetch_hash = c
            .read_u32::<LittleEndian>()
            .map_err(|e| DecodeError::section(Section::Header, e))?;

        Ok(PrefetchHeader {
            version,
            signature,
            file_size,
            executable_name,
            prefetch_hash,
        })
    }

    /// Prefetch hash as uppercase hex, no `0x` prefix.
    pub fn hash_string(&self) -> String {
        format!("{:X}", self.prefetch_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn minimal_header(tag: u32, signature: [u8; 4]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PrefetchHeader::SIZE);
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&signature);
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&4096u32.to_le_bytes());
        let mut name = [0u8; 60];
        for (i, b) in "NOTEPAD.EXE".encode_utf16().enumerate() {
            name[i * 2..i * 2 + 2].copy_from_slice(&b.to_le_bytes());
        }
        buf.extend_from_slice(&name);
        buf.extend_from_slice(&0xD53FF04Au32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf
    }

    #[test]
    fn decodes_all_four_version_tags() {
        for (tag, version) in [
            (0x11, PrefetchVersion::Xp),
            (0x17, PrefetchVersion::Seven),
            (0x1a, PrefetchVersion::Eight),
            (0x1e, PrefetchVersion::Ten),
        ] {
            let header = PrefetchHeader::from_bytes(&minimal_header(tag, SIGNATURE)).unwrap();
            assert_eq!(header.version, version);
            assert_eq!(header.executable_name, "NOTEPAD.EXE");
            assert_eq!(header.hash_string(), "D53FF04A");
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = PrefetchHeader::from_bytes(&minimal_header(0x2a, SIGNATURE)).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownVersion(0x2a)));
    }

    #[test]
    fn hash_renders_without_leading_zero_padding() {
        let mut buf = minimal_header(0x1e, SIGNATURE);
        buf[76..80].copy_from_slice(&0x0000_00AFu32.to_le_bytes());
        let header = PrefetchHeader::from_bytes(&buf).unwrap();
        assert_eq!(header.hash_string(), "AF");
    }

    proptest! {
        // Any signature other than SCCA must fail typed, never panic.
        #[test]
        fn corrupt_signature_always_yields_invalid_signature(
            sig in prop::array::uniform4(any::<u8>()).prop_filter("not SCCA", |s| s != &SIGNATURE)
        ) {
            let err = PrefetchHeader::from_bytes(&minimal_header(0x1e, sig)).unwrap_err();
            let is_invalid_signature = matches!(err, DecodeError::InvalidSignature { found } if found == sig);
            prop_assert!(is_invalid_signature);
        }
    }
}
