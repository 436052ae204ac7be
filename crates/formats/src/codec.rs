//! Byte-level reader/writer helpers shared by the three file codecs.

use crate::{FormatError, FORMAT_VERSION};

/// Sequential little-endian reader over a compiled asset's bytes.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn take(&mut self, count: usize, what: &'static str) -> Result<&'a [u8], FormatError> {
        if self.remaining() < count {
            return Err(FormatError::Truncated(what));
        }
        let slice = &self.bytes[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    pub fn u8(&mut self, what: &'static str) -> Result<u8, FormatError> {
        Ok(self.take(1, what)?[0])
    }

    pub fn u32(&mut self, what: &'static str) -> Result<u32, FormatError> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn u64(&mut self, what: &'static str) -> Result<u64, FormatError> {
        let bytes = self.take(8, what)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn f32(&mut self, what: &'static str) -> Result<f32, FormatError> {
        Ok(f32::from_bits(self.u32(what)?))
    }

    /// Read a NUL-terminated string and advance past the terminator.
    pub fn cstr(&mut self, what: &'static str) -> Result<String, FormatError> {
        let rest = &self.bytes[self.offset..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(FormatError::Truncated(what))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| FormatError::InvalidString(what))?
            .to_owned();
        self.offset += nul + 1;
        Ok(s)
    }

    /// Check the 4-byte magic and the format version byte.
    pub fn header(&mut self, magic: [u8; 4]) -> Result<(), FormatError> {
        let found = self.take(4, "magic")?;
        if found != magic {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(found);
            return Err(FormatError::BadMagic {
                expected: magic,
                found: buf,
            });
        }
        let version = self.u8("version")?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(())
    }
}

/// Append the magic + version header to an output buffer.
pub(crate) fn write_header(out: &mut Vec<u8>, magic: [u8; 4]) {
    out.extend_from_slice(&magic);
    out.push(FORMAT_VERSION);
}

/// Append a NUL-terminated string.
pub(crate) fn write_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cstr_round_trip_back_to_back() {
        let mut out = Vec::new();
        write_cstr(&mut out, "first");
        write_cstr(&mut out, "second");
        let mut reader = Reader::new(&out);
        assert_eq!(reader.cstr("a").unwrap(), "first");
        assert_eq!(reader.cstr("b").unwrap(), "second");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn missing_terminator_is_truncation() {
        let mut reader = Reader::new(b"no-nul");
        assert!(matches!(
            reader.cstr("path"),
            Err(FormatError::Truncated("path"))
        ));
    }
}
