//! Text decoding.

use crate::format::JetVersion;

/// Marker that opens a Jet 4 compressed string.
const COMPRESSED_MARKER: [u8; 2] = [0xFF, 0xFE];

pub(crate) fn decode_text(bytes: &[u8], version: JetVersion) -> String {
    match version {
        JetVersion::Jet3 => bytes.iter().map(|&b| char::from(b)).collect(),
        JetVersion::Jet4 => decode_ucs2(bytes),
    }
}

/// Decodes UCS-2LE text, expanding the compressed form.
///
/// In compressed form each byte is a code unit in 0x01..=0xFF; a zero byte
/// toggles between single-byte and two-byte units.
pub(crate) fn decode_ucs2(bytes: &[u8]) -> String {
    let Some(body) = bytes.strip_prefix(&COMPRESSED_MARKER) else {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    };

    let mut units = Vec::with_capacity(body.len());
    let mut compressed = true;
    let mut i = 0;
    while i < body.len() {
        if body[i] == 0 {
            compressed = !compressed;
            i += 1;
        } else if compressed {
            units.push(u16::from(body[i]));
            i += 1;
        } else if i + 1 < body.len() {
            units.push(u16::from_le_bytes([body[i], body[i + 1]]));
            i += 2;
        } else {
            break;
        }
    }
    String::from_utf16_lossy(&units)
}
