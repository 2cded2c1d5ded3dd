use std::convert::TryInto;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("Not enough bytes left in the buffer")]
    NotEnoughBytes,
    #[error("Invalid size")]
    InvalidSize,
    #[error("Invalid value")]
    InvalidValue,
    #[error("Invalid hex string")]
    InvalidHex,
}

impl From<hex::FromHexError> for ReaderError {
    fn from(_: hex::FromHexError) -> Self {
        ReaderError::InvalidHex
    }
}

// Cursor over an immutable byte buffer.
pub struct Reader<'a> {
    bytes: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, total: 0 }
    }

    fn advance(&mut self, count: usize) -> Result<&'a [u8], ReaderError> {
        if self.bytes.len() < count {
            return Err(ReaderError::NotEnoughBytes);
        }
        let (taken, rest) = self.bytes.split_at(count);
        self.bytes = rest;
        self.total += count;
        Ok(taken)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.advance(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let bytes = self.advance(8)?;
        // advance() guarantees the slice is exactly 8 bytes
        let array: [u8; 8] = bytes.try_into().map_err(|_| ReaderError::InvalidSize)?;
        Ok(u64::from_be_bytes(array))
    }

    pub fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], ReaderError> {
        let bytes = self.advance(N)?;
        bytes.try_into().map_err(|_| ReaderError::InvalidSize)
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    pub fn total_read(&self) -> usize {
        self.total
    }
}

// Append-only byte buffer used to build the canonical encoding.
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer { bytes: Vec::new() }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.bytes.push(value as u8);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for Writer {
    fn default() -> Self {
        Writer::new()
    }
}

/// Canonical binary encoding used for everything that must hash or travel
/// as hex on the wire. Decoding is strict: trailing bytes are an error.
pub trait Serializer: Sized {
    fn write(&self, writer: &mut Writer);

    fn read(reader: &mut Reader) -> Result<Self, ReaderError>;

    fn size(&self) -> usize;

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.write(&mut writer);
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError> {
        let mut reader = Reader::new(bytes);
        let value = Self::read(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(ReaderError::InvalidSize);
        }
        Ok(value)
    }

    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    fn from_hex(hex: &str) -> Result<Self, ReaderError> {
        let bytes = hex::decode(hex)?;
        Self::from_bytes(&bytes)
    }
}

impl Serializer for u64 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u64()
    }

    fn size(&self) -> usize {
        8
    }
}

impl<T: Serializer> Serializer for Option<T> {
    fn write(&self, writer: &mut Writer) {
        match self {
            Some(value) => {
                writer.write_bool(true);
                value.write(writer);
            }
            None => writer.write_bool(false),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        if reader.read_bool()? {
            Ok(Some(T::read(reader)?))
        } else {
            Ok(None)
        }
    }

    fn size(&self) -> usize {
        1 + self.as_ref().map(Serializer::size).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_roundtrip() {
        let value = 123_456_789_u64;
        let bytes = value.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(u64::from_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = 42u64.to_bytes();
        bytes.push(0);
        assert_eq!(u64::from_bytes(&bytes), Err(ReaderError::InvalidSize));
    }

    #[test]
    fn test_option_roundtrip() {
        let value: Option<u64> = Some(7);
        assert_eq!(Option::<u64>::from_bytes(&value.to_bytes()).unwrap(), value);
        let none: Option<u64> = None;
        assert_eq!(Option::<u64>::from_bytes(&none.to_bytes()).unwrap(), none);
    }

    #[test]
    fn test_reader_not_enough_bytes() {
        let mut reader = Reader::new(&[1, 2]);
        assert_eq!(reader.read_u64(), Err(ReaderError::NotEnoughBytes));
    }

    #[test]
    fn test_invalid_bool() {
        let mut reader = Reader::new(&[2]);
        assert_eq!(reader.read_bool(), Err(ReaderError::InvalidValue));
    }
}
