use crate::error::*;

/// Decodes an unsigned LEB128 integer of at most `bits` significant bits,
/// advancing `pc` past it on success.
#[inline]
pub fn read_leb128(bytes: &[u8], pc: &mut usize, bits: u32) -> Result<u64, Error> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut end = *pc;
    let max_len = bits.div_ceil(7) as usize;
    loop {
        let byte = *bytes.get(end).ok_or(Error::compile(UNEXPECTED_END))?;
        end += 1;
        if end - *pc > max_len { return compile(INT_TOO_LONG); }
        let low = (byte & 0x7f) as u64;
        if end - *pc == max_len {
            // Final byte may only carry the remaining bits.
            let rem = bits - shift;
            if rem < 7 && low >> rem != 0 { return compile(INT_TOO_LARGE); }
        }
        result |= low << shift;
        if byte & 0x80 == 0 { break; }
        shift += 7;
    }
    *pc = end;
    Ok(result)
}

/// Decodes a signed LEB128 integer of at most `bits` significant bits.
#[inline]
pub fn read_sleb128(bytes: &[u8], pc: &mut usize, bits: u32) -> Result<i64, Error> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut end = *pc;
    let max_len = bits.div_ceil(7) as usize;
    let mut byte;
    loop {
        byte = *bytes.get(end).ok_or(Error::compile(UNEXPECTED_END))?;
        end += 1;
        if end - *pc > max_len { return compile(INT_TOO_LONG); }
        let low = (byte & 0x7f) as i64;
        if end - *pc == max_len {
            // Unused high bits of the final byte must replicate the sign bit.
            let rem = bits - shift;
            if rem < 7 {
                let sign_and_unused = low >> (rem - 1);
                let all_ones = (1i64 << (8 - rem)) - 1;
                if sign_and_unused != 0 && sign_and_unused != all_ones {
                    return compile(INT_TOO_LARGE);
                }
            }
        }
        if shift < 64 { result |= low << shift; }
        shift += 7;
        if byte & 0x80 == 0 { break; }
    }
    if shift < 64 && byte & 0x40 != 0 {
        result |= !0i64 << shift;
    }
    *pc = end;
    Ok(result)
}
