//! Legacy Unix `compress` (`.Z`) decoding
//!
//! The oldest quarters of the full-index tree are published as `.Z` files.
//! The format is adaptive LZW: codes start at 9 bits and widen up to the
//! limit stored in the header. Codes are written in groups of eight, so every
//! width change (and every CLEAR) skips the padding to the end of the current
//! group before reading on.

use crate::error::DecodeError;

/// `1f 9d` magic
pub const MAGIC: [u8; 2] = [0x1f, 0x9d];

const ENCODING: &str = "compress";
const CLEAR: u32 = 256;
const BLOCK_MODE: u8 = 0x80;
const MAX_BITS_MASK: u8 = 0x1f;

fn corrupt(reason: impl Into<String>) -> DecodeError {
    DecodeError::Corrupt {
        encoding: ENCODING,
        reason: reason.into(),
    }
}

/// Decode a complete `.Z` buffer
///
/// A stream cut inside a code is `TransportIncomplete`; codes that reference
/// table slots not yet defined are `Corrupt`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if data.len() < 3 || data[..2] != MAGIC {
        return Err(DecodeError::HeaderMismatch { expected: ENCODING });
    }

    let flags = data[2];
    let block_mode = flags & BLOCK_MODE != 0;
    let mut max_bits = u32::from(flags & MAX_BITS_MASK);
    if max_bits == 9 {
        // Some old writers declared 9 bits and still used 10
        max_bits = 10;
    }
    if !(10..=16).contains(&max_bits) {
        return Err(corrupt(format!("unsupported code width {}", max_bits)));
    }
    if flags & 0x60 != 0 {
        return Err(corrupt("reserved header flags set"));
    }

    let len = data.len();
    if len == 3 {
        return Ok(Vec::new());
    }
    if len == 4 {
        return Err(DecodeError::TransportIncomplete(
            "compress stream ends inside the first code".to_string(),
        ));
    }

    let table_size = 1usize << max_bits;
    let mut prefix = vec![0u16; table_size];
    let mut suffix = vec![0u8; table_size];
    let mut stack: Vec<u8> = Vec::with_capacity(table_size);
    let mut out = Vec::with_capacity(len * 3);

    let mut bits: u32 = 9;
    let mut mask: u32 = 0x1ff;
    let mut end: u32 = if block_mode { 256 } else { 255 };

    let mut buf: u32 = u32::from(data[3]) | (u32::from(data[4]) << 8);
    let mut prev = buf & mask;
    buf >>= bits;
    let mut left: u32 = 16 - bits;
    if prev > 255 {
        return Err(corrupt("first code is not a literal"));
    }
    let mut last = prev as u8;
    out.push(last);

    let mut mark = 3usize;
    let mut next = 5usize;

    while next < len {
        // Widen once the table has filled the current code space
        if end >= mask && bits < max_bits {
            if !skip_group_padding(&mut next, mark, bits, len) {
                break;
            }
            buf = 0;
            left = 0;
            mark = next;
            bits += 1;
            mask = (mask << 1) | 1;
        }

        buf |= u32::from(data[next]) << left;
        next += 1;
        left += 8;
        if left < bits {
            if next == len {
                return Err(DecodeError::TransportIncomplete(format!(
                    "compress stream ends inside a code at byte {}",
                    len
                )));
            }
            buf |= u32::from(data[next]) << left;
            next += 1;
            left += 8;
        }
        let mut code = buf & mask;
        buf >>= bits;
        left -= bits;

        if code == CLEAR && block_mode {
            if !skip_group_padding(&mut next, mark, bits, len) {
                break;
            }
            buf = 0;
            left = 0;
            mark = next;
            bits = 9;
            mask = 0x1ff;
            end = 255;
            continue;
        }

        let incoming = code;
        stack.clear();

        if code > end {
            // Only the KwKwK case may reference the slot being defined
            if code != end + 1 || prev > end {
                return Err(corrupt(format!("invalid code {} at byte {}", code, next)));
            }
            stack.push(last);
            code = prev;
        }

        while code >= 256 {
            let slot = code as usize;
            stack.push(suffix[slot]);
            code = u32::from(prefix[slot]);
        }
        stack.push(code as u8);
        last = code as u8;

        if end < mask {
            end += 1;
            prefix[end as usize] = prev as u16;
            suffix[end as usize] = last;
        }
        prev = incoming;

        out.extend(stack.iter().rev());
    }

    Ok(out)
}

/// Advance `next` to the end of the code group started at `mark`
///
/// Returns false when the padding runs past the end of the buffer, which is
/// how writers end a stream right after a width change.
fn skip_group_padding(next: &mut usize, mark: usize, bits: u32, len: usize) -> bool {
    let bits = bits as usize;
    let rem = (*next - mark) % bits;
    if rem == 0 {
        return true;
    }
    let pad = bits - rem;
    if pad >= len - *next {
        return false;
    }
    *next += pad;
    true
}
