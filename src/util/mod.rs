use std::fmt;

/// Write a hexdump of the provided byte slice, 16 bytes per row.
pub fn hexdump(
    f: &mut fmt::Formatter,
    prefix: &str,
    buffer: &[u8],
) -> std::result::Result<(), std::fmt::Error> {
    const COLUMNS: usize = 16;
    if buffer.is_empty() {
        // For a zero-length buffer, at least print an offset instead of
        // nothing.
        return write!(f, "{}{:04X}:", prefix, 0);
    }
    for (index, row) in buffer.chunks(COLUMNS).enumerate() {
        if index > 0 {
            writeln!(f)?;
        }
        write!(f, "{}{:04X}: ", prefix, index * COLUMNS)?;
        for b in row {
            write!(f, "{:02X} ", b)?;
        }
        for _ in row.len()..COLUMNS {
            write!(f, "   ")?;
        }
        // FLEX text sets the top bit on some bytes.
        for b in row {
            let c = match *b & 0x7F {
                c @ 0x20..=0x7E => c as char,
                _ => '.',
            };
            write!(f, "{}", c)?;
        }
    }
    Ok(())
}

pub struct Hex<'a>(pub &'a [u8]);

impl<'a> fmt::Display for Hex<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        hexdump(f, "", self.0)
    }
}

pub fn hex(bytes: &[u8]) -> Hex {
    Hex(bytes)
}
