//! Big-endian field reader shared by the binary layouts
//!
//! Every multi-byte field on the wire and on flash is big-endian.

use crate::error::CodecError;

/// Cursor over an input buffer that never panics on short input
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    remaining: &'a [u8],
}

impl<'a> ByteReader<'a> {
    /// Start reading at the beginning of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { remaining: bytes }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Read a fixed-size array
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let (head, tail) =
            self.remaining
                .split_first_chunk::<N>()
                .ok_or(CodecError::Truncated {
                    needed: N,
                    available: self.remaining.len(),
                })?;
        self.remaining = tail;
        Ok(*head)
    }

    /// Read a single byte
    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let [byte] = self.array::<1>()?;
        Ok(byte)
    }

    /// Read a big-endian u16
    pub fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array::<2>()?))
    }

    /// Read a big-endian u32
    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array::<4>()?))
    }

    /// Read exactly `len` bytes
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let (head, tail) =
            self.remaining
                .split_at_checked(len)
                .ok_or(CodecError::Truncated {
                    needed: len,
                    available: self.remaining.len(),
                })?;
        self.remaining = tail;
        Ok(head)
    }

    /// Consume everything that is left
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.remaining)
    }

    /// Fail if any input is left unread
    pub fn finish(self) -> Result<(), CodecError> {
        if self.remaining.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                extra: self.remaining.len(),
            })
        }
    }
}

/// Copy a string into a zero-padded fixed-size identifier, truncating if needed
pub fn pad_identifier<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [0u8; N];
    for (slot, byte) in out.iter_mut().zip(text.bytes()) {
        *slot = byte;
    }
    out
}

/// Render a zero-padded identifier, falling back to hex for non-printable content
pub fn display_identifier(bytes: &[u8]) -> String {
    let trimmed = match bytes.iter().rposition(|b| *b != 0) {
        Some(last) => bytes.get(..=last).unwrap_or(bytes),
        None => return String::new(),
    };

    if trimmed.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(trimmed).into_owned()
    } else {
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian_fields() -> Result<(), CodecError> {
        let mut reader = ByteReader::new(&[0x01, 0x02, 0x03, 0x00, 0x00, 0x01, 0x00, 0xff]);
        assert_eq!(reader.u8()?, 0x01);
        assert_eq!(reader.u16()?, 0x0203);
        assert_eq!(reader.u32()?, 0x0000_0100);
        assert_eq!(reader.rest(), &[0xff]);
        reader.finish()
    }

    #[test]
    fn test_short_input_is_an_error() {
        let mut reader = ByteReader::new(&[0x01]);
        assert_eq!(
            reader.u32(),
            Err(CodecError::Truncated {
                needed: 4,
                available: 1
            })
        );
    }

    #[test]
    fn test_finish_rejects_trailing_bytes() {
        let reader = ByteReader::new(&[0, 0]);
        assert_eq!(reader.finish(), Err(CodecError::TrailingBytes { extra: 2 }));
    }

    #[test]
    fn test_identifier_padding() {
        let id: [u8; 8] = pad_identifier("ACME");
        assert_eq!(&id, b"ACME\0\0\0\0");
        assert_eq!(display_identifier(&id), "ACME");

        let long: [u8; 2] = pad_identifier("ACME");
        assert_eq!(&long, b"AC");
    }

    #[test]
    fn test_binary_identifier_renders_as_hex() {
        assert_eq!(display_identifier(&[1, 0, 0, 0]), "01000000");
        assert_eq!(display_identifier(&[0, 0]), "");
    }
}
