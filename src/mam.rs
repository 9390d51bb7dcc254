// Sources:
// - https://learn.microsoft.com/openspecs/windows_protocols/ms-xca
//
// Windows-10 prefetch files are wrapped in a MAM container: a 4-byte
// signature, the uncompressed size, then LZXPRESS-Huffman compressed data.
// Older files are stored raw, so the loader first tries to decode the
// leading version tag before assuming a container.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::DecodeError;
use crate::header::PrefetchVersion;

/// Container signature of a compressed Windows-10 prefetch file.
pub const MAM_SIGNATURE: [u8; 4] = *b"MAM\x04";

/// Output of a 64 KiB LZXPRESS chunk.
const CHUNK_SIZE: usize = 65536;

/// Refuse containers claiming more than this; real prefetch files are tiny.
const MAX_UNCOMPRESSED: usize = 1 << 26;

/// Read `path` and return raw prefetch bytes, inflating a MAM container when
/// the file does not start with a plausible version tag.
pub fn load_raw(path: &Path) -> Result<Vec<u8>, DecodeError> {
    let bytes = fs::read(path)?;
    if looks_raw(&bytes) {
        debug!("'{}' starts with a version tag, treating as raw", path.display());
        return Ok(bytes);
    }
    debug!("'{}' has no version tag, treating as MAM container", path.display());
    decompress_mam(&bytes)
}

/// A file beginning with one of the four known version tags is already raw.
pub fn looks_raw(bytes: &[u8]) -> bool {
    bytes.len() >= 4
        && PrefetchVersion::from_tag(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))
        .is_some()
}

/// Inflate a `MAM\x04` container into the raw prefetch layout.
pub fn decompress_mam(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if bytes.len() < 8 {
        return Err(DecodeError::Decompression(
            "file too short for a MAM container".into(),
        ));
    }
    if bytes[0..4] != MAM_SIGNATURE {
        return Err(DecodeError::Decompression(format!(
            "unrecognized container signature {:02x?}",
            &bytes[0..4]
        )));
    }
    let expected = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    decompress_xpress_huffman(&bytes[8..], expected)
}

fn corrupt(msg: impl Into<String>) -> DecodeError {
    DecodeError::Decompression(msg.into())
}

/// 15-bit prefix lookup table built from the 256-byte canonical-length
/// header of each chunk (512 4-bit code lengths).
struct DecodingTable {
    entries: Vec<(u16, u8)>,
}

impl DecodingTable {
    fn build(raw: &[u8]) -> Result<Self, DecodeError> {
        let mut lengths = [0u8; 512];
        for (i, b) in raw.iter().enumerate() {
            lengths[2 * i] = b & 0x0F;
            lengths[2 * i + 1] = b >> 4;
        }

        let mut entries = vec![(0u16, 0u8); 1 << 15];
        let mut idx = 0usize;
        for bit_len in 1..=15u8 {
            for (sym, &len) in lengths.iter().enumerate() {
                if len != bit_len {
                    continue;
                }
                let span = 1usize << (15 - bit_len);
                if idx + span > entries.len() {
                    return Err(corrupt("malformed Huffman table"));
                }
                for e in &mut entries[idx..idx + span] {
                    *e = (sym as u16, bit_len);
                }
                idx += span;
            }
        }
        if idx == 0 {
            return Err(corrupt("empty Huffman table"));
        }
        Ok(DecodingTable { entries })
    }

    fn lookup(&self, prefix: usize) -> Result<(u16, u32), DecodeError> {
        let (sym, len) = self.entries[prefix];
        if len == 0 {
            return Err(corrupt("invalid Huffman code in compressed stream"));
        }
        Ok((sym, len as u32))
    }
}

/// MS-XCA bit reader: a 32-bit window refilled from little-endian 16-bit
/// words, interleaved with plain byte reads for match-length escapes.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bits: u32,
    avail: i32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        let mut r = BitReader {
            data,
            pos,
            bits: 0,
            avail: 16,
        };
        let w0 = r.next_word() as u32;
        let w1 = r.next_word() as u32;
        r.bits = (w0 << 16) | w1;
        r
    }

    // Exhausted refills read as zero; real encoders pad the tail, and any
    // resulting garbage is caught by the symbol/offset validation.
    fn next_word(&mut self) -> u16 {
        if self.pos + 2 > self.data.len() {
            self.pos = self.data.len();
            return 0;
        }
        let w = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        w
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| corrupt("unexpected end of compressed data"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_word(&mut self) -> Result<u16, DecodeError> {
        if self.pos + 2 > self.data.len() {
            return Err(corrupt("unexpected end of compressed data"));
        }
        let w = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(w)
    }

    fn peek15(&self) -> usize {
        (self.bits >> 17) as usize
    }

    fn peek(&self, n: u32) -> u32 {
        if n == 0 { 0 } else { self.bits >> (32 - n) }
    }

    fn consume(&mut self, n: u32) {
        self.bits <<= n;
        self.avail -= n as i32;
        if self.avail < 0 {
            let w = self.next_word() as u32;
            self.bits |= w << (-self.avail);
            self.avail += 16;
        }
    }
}

/// Inflate an LZXPRESS-Huffman stream of 64 KiB chunks, each prefixed by its
/// own 256-byte code-length table.
fn decompress_xpress_huffman(input: &[u8], expected: usize) -> Result<Vec<u8>, DecodeError> {
    if expected > MAX_UNCOMPRESSED {
        return Err(corrupt(format!(
            "implausible uncompressed size {}",
            expected
        )));
    }

    let mut out = Vec::with_capacity(expected);
    let mut pos = 0usize;
    while out.len() < expected {
        if pos + 256 > input.len() {
            return Err(corrupt("truncated Huffman table"));
        }
        let table = DecodingTable::build(&input[pos..pos + 256])?;
        pos += 256;

        let chunk_end = (out.len() + CHUNK_SIZE).min(expected);
        let mut reader = BitReader::new(input, pos);
        while out.len() < chunk_end {
            let (symbol, code_len) = table.lookup(reader.peek15())?;
            reader.consume(code_len);

            if symbol < 256 {
                out.push(symbol as u8);
                continue;
            }

            let s = (symbol - 256) as usize;
            let offset_bits = (s >> 4) as u32;
            let mut length = s & 0x0F;
            let offset = (1usize << offset_bits) + reader.peek(offset_bits) as usize;
            reader.consume(offset_bits);

            if length == 15 {
                let b = reader.read_byte()? as usize;
                if b == 255 {
                    let w = reader.read_word()? as usize;
                    if w < 15 {
                        return Err(corrupt("invalid escaped match length"));
                    }
                    length = w - 15;
                } else {
                    length = b;
                }
                length += 15;
            }
            length += 3;

            if offset == 0 || offset > out.len() {
                return Err(corrupt(format!("match offset {} out of range", offset)));
            }
            for _ in 0..length {
                let b = out[out.len() - offset];
                out.push(b);
            }
        }
        pos = reader.pos;
    }

    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Pack MSB-first codes into the little-endian 16-bit word stream the
    // decoder expects.
    fn pack_bits(codes: &[(u32, u32)]) -> Vec<u8> {
        let mut bits = Vec::new();
        for &(value, len) in codes {
            for i in (0..len).rev() {
                bits.push((value >> i) & 1 == 1);
            }
        }
        while bits.len() % 16 != 0 {
            bits.push(false);
        }
        let mut out = Vec::new();
        for word in bits.chunks(16) {
            let mut w = 0u16;
            for (i, &b) in word.iter().enumerate() {
                if b {
                    w |= 1 << (15 - i);
                }
            }
            out.extend_from_slice(&w.to_le_bytes());
        }
        // the reader primes itself with two words
        while out.len() < 4 {
            out.extend_from_slice(&[0, 0]);
        }
        out
    }

    fn set_length(table: &mut [u8; 256], symbol: usize, len: u8) {
        if symbol % 2 == 0 {
            table[symbol / 2] |= len;
        } else {
            table[symbol / 2] |= len << 4;
        }
    }

    #[test]
    fn literal_only_stream_inflates() {
        // All 256 literals at 8 bits form a complete canonical code in
        // which every byte encodes as itself.
        let mut table = [0u8; 256];
        for sym in 0..256 {
            set_length(&mut table, sym, 8);
        }
        let payload = b"test1234";
        let codes: Vec<(u32, u32)> = payload.iter().map(|&b| (b as u32, 8)).collect();

        let mut compressed = table.to_vec();
        compressed.extend(pack_bits(&codes));
        let out = decompress_xpress_huffman(&compressed, payload.len()).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn match_symbol_copies_back_references() {
        // Two one-bit codes: literal 'a' and a match symbol with a
        // zero-bit offset (1) and length nibble 3 (-> 6 bytes).
        let mut table = [0u8; 256];
        set_length(&mut table, 97, 1);
        set_length(&mut table, 259, 1);

        let mut compressed = table.to_vec();
        compressed.extend(pack_bits(&[(0, 1), (1, 1)]));
        let out = decompress_xpress_huffman(&compressed, 7).unwrap();
        assert_eq!(out, b"aaaaaaa");
    }

    #[test]
    fn mam_container_roundtrip() {
        let mut table = [0u8; 256];
        for sym in 0..256 {
            set_length(&mut table, sym, 8);
        }
        let payload = b"SCCAMAM!";
        let codes: Vec<(u32, u32)> = payload.iter().map(|&b| (b as u32, 8)).collect();

        let mut container = MAM_SIGNATURE.to_vec();
        container.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        container.extend_from_slice(&table);
        container.extend(pack_bits(&codes));

        assert_eq!(decompress_mam(&container).unwrap(), payload);
    }

    #[test]
    fn unrecognized_container_is_a_typed_failure() {
        let err = decompress_mam(b"garbage bytes here").unwrap_err();
        assert!(matches!(err, DecodeError::Decompression(_)));

        let err = decompress_mam(b"ZZ").unwrap_err();
        assert!(matches!(err, DecodeError::Decompression(_)));
    }

    #[test]
    fn truncated_container_is_a_typed_failure() {
        let mut container = MAM_SIGNATURE.to_vec();
        container.extend_from_slice(&4096u32.to_le_bytes());
        container.extend_from_slice(&[0u8; 32]); // far less than one table
        let err = decompress_mam(&container).unwrap_err();
        assert!(matches!(err, DecodeError::Decompression(_)));
    }

    #[test]
    fn raw_files_pass_through_unchanged() {
        let mut raw = 0x1eu32.to_le_bytes().to_vec();
        raw.extend_from_slice(b"SCCA");
        raw.extend_from_slice(&[0u8; 16]);
        assert!(looks_raw(&raw));

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&raw).unwrap();
        let loaded = load_raw(tmp.path()).unwrap();
        assert_eq!(loaded, raw);
    }
}
