//! Bounds-checked little-endian reads.

use crate::error::{JetError, Result};

pub(crate) fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| {
            JetError::Corrupt(format!(
                "read of {len} bytes at offset {offset} exceeds buffer of {} bytes",
                buf.len()
            ))
        })
}

pub(crate) fn array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(slice(buf, offset, N)?);
    Ok(out)
}

pub(crate) fn u8_at(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(array::<1>(buf, offset)?[0])
}

pub(crate) fn u16_at(buf: &[u8], offset: usize) -> Result<u16> {
    Ok(u16::from_le_bytes(array(buf, offset)?))
}

pub(crate) fn u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(array(buf, offset)?))
}

/// `a - b`, or a corruption error naming `what` when it would underflow.
pub(crate) fn sub(a: usize, b: usize, what: &str) -> Result<usize> {
    a.checked_sub(b)
        .ok_or_else(|| JetError::Corrupt(format!("{what} out of bounds")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let buf = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(u16_at(&buf, 0).unwrap(), 0x1234);
        assert_eq!(u32_at(&buf, 2).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_out_of_bounds_is_corrupt() {
        assert!(matches!(u32_at(&[0u8; 3], 0), Err(JetError::Corrupt(_))));
        assert!(matches!(slice(&[0u8; 3], usize::MAX, 2), Err(JetError::Corrupt(_))));
    }
}
