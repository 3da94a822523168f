//! LEB128 varints used by state records, payload records and secondary keys.

/// Maximum encoded length of a u64.
pub const MAX_VARINT_BYTES: usize = 10;

/// Append `value` to `buf`.
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Decode a varint from the start of `bytes`, returning `(value, consumed)`.
///
/// Returns `None` on an empty buffer, a varint cut short by the end of the
/// buffer, or one longer than [`MAX_VARINT_BYTES`].
#[inline]
pub fn decode_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in bytes.iter().take(MAX_VARINT_BYTES).enumerate() {
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
        shift += 7;
    }
    None
}

/// Number of bytes [`encode_varint`] writes for `value`.
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}
