/// Decodes a `-?D(D)?(.D)?` value into tenths, reading fixed positions only.
///
/// Returns the value and the number of bytes it occupied. A missing
/// fractional part reads as `.0`.
#[inline(always)]
fn decode(bytes: &[u8]) -> Result<(i32, usize), &'static str> {
    let negative = bytes.first() == Some(&b'-');
    let mut i = negative as usize;

    let mut whole = digit(bytes, i).ok_or("expected a digit")?;
    i += 1;
    if let Some(d) = digit(bytes, i) {
        whole = whole * 10 + d;
        i += 1;
    }

    let mut tenths = whole * 10;
    if bytes.get(i) == Some(&b'.') {
        tenths += digit(bytes, i + 1).ok_or("expected a digit after '.'")?;
        i += 2;
    }

    Ok((if negative { -tenths } else { tenths }, i))
}

#[inline(always)]
fn digit(bytes: &[u8], i: usize) -> Option<i32> {
    let d = bytes.get(i)?.wrapping_sub(b'0');
    (d < 10).then_some(d as i32)
}

/// Parses the value at the start of `bytes`, which must be followed by `\n`.
/// Returns the value in tenths and the length consumed, newline included.
#[inline(always)]
pub fn parse_terminated(bytes: &[u8]) -> Result<(i32, usize), &'static str> {
    let (value, len) = decode(bytes)?;
    if bytes.get(len) != Some(&b'\n') {
        return Err("unexpected bytes after value");
    }
    Ok((value, len + 1))
}

/// Parses a complete value such as `-12.3` into tenths (`-123`).
pub fn parse_tenths(value: &[u8]) -> Result<i32, &'static str> {
    let (tenths, len) = decode(value)?;
    if len != value.len() {
        return Err("unexpected bytes after value");
    }
    Ok(tenths)
}
