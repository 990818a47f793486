//! Binary reading utilities for decoding DataFlash records.

use crate::DfError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// A cursor wrapper for reading little-endian binary data from a byte slice.
pub struct BinaryReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn remaining(&self) -> usize {
        let pos = self.cursor.position() as usize;
        let len = self.cursor.get_ref().len();
        len.saturating_sub(pos)
    }

    pub fn read_i8(&mut self) -> Result<i8, DfError> {
        self.cursor.read_i8().map_err(DfError::Io)
    }

    pub fn read_u8(&mut self) -> Result<u8, DfError> {
        self.cursor.read_u8().map_err(DfError::Io)
    }

    pub fn read_i16(&mut self) -> Result<i16, DfError> {
        self.cursor.read_i16::<LittleEndian>().map_err(DfError::Io)
    }

    pub fn read_u16(&mut self) -> Result<u16, DfError> {
        self.cursor.read_u16::<LittleEndian>().map_err(DfError::Io)
    }

    pub fn read_i32(&mut self) -> Result<i32, DfError> {
        self.cursor.read_i32::<LittleEndian>().map_err(DfError::Io)
    }

    pub fn read_u32(&mut self) -> Result<u32, DfError> {
        self.cursor.read_u32::<LittleEndian>().map_err(DfError::Io)
    }

    pub fn read_i64(&mut self) -> Result<i64, DfError> {
        self.cursor.read_i64::<LittleEndian>().map_err(DfError::Io)
    }

    pub fn read_u64(&mut self) -> Result<u64, DfError> {
        self.cursor.read_u64::<LittleEndian>().map_err(DfError::Io)
    }

    pub fn read_f32(&mut self) -> Result<f32, DfError> {
        self.cursor.read_f32::<LittleEndian>().map_err(DfError::Io)
    }

    pub fn read_f64(&mut self) -> Result<f64, DfError> {
        self.cursor.read_f64::<LittleEndian>().map_err(DfError::Io)
    }

    /// Read N bytes into a new Vec.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, DfError> {
        let pos = self.cursor.position() as usize;
        let data = self.cursor.get_ref();
        if pos + n > data.len() {
            return Err(DfError::ShortRead {
                offset: pos,
                expected: n,
                actual: data.len().saturating_sub(pos),
            });
        }
        let result = data[pos..pos + n].to_vec();
        self.cursor.set_position((pos + n) as u64);
        Ok(result)
    }

    /// Read a fixed-length `int16` array, reinterpreting raw bytes little-endian
    /// (format char `a`: 64 raw bytes -> 32 `i16`s).
    pub fn read_i16_array(&mut self, byte_len: usize) -> Result<Vec<i16>, DfError> {
        let bytes = self.read_bytes(byte_len)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect())
    }
}

/// Write a fixed-width little-endian scalar or byte string, used by `Record::to_bytes`.
pub fn write_fixed_bytes(out: &mut Vec<u8>, bytes: &[u8], width: usize) {
    out.extend_from_slice(bytes);
    if bytes.len() < width {
        out.resize(out.len() + (width - bytes.len()), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data: Vec<u8> = vec![
            0x01, 0xA1, // u16: 0xA101
            0x39, 0x00, 0x00, 0x00, // u32: 57
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x59, 0x40, // f64: 100.0
        ];
        let mut reader = BinaryReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0xA101);
        assert_eq!(reader.read_u32().unwrap(), 57);
        assert_eq!(reader.read_f64().unwrap(), 100.0);
    }

    #[test]
    fn test_read_i16_array() {
        // two little-endian i16s: -1, 300
        let data: Vec<u8> = vec![0xFF, 0xFF, 0x2C, 0x01];
        let mut reader = BinaryReader::new(&data);
        let arr = reader.read_i16_array(4).unwrap();
        assert_eq!(arr, vec![-1, 300]);
    }

    #[test]
    fn test_read_bytes_short() {
        let data: Vec<u8> = vec![1, 2, 3];
        let mut reader = BinaryReader::new(&data);
        assert!(reader.read_bytes(10).is_err());
    }

    #[test]
    fn test_remaining() {
        let data: Vec<u8> = vec![0; 16];
        let mut reader = BinaryReader::new(&data);
        assert_eq!(reader.remaining(), 16);
        reader.read_u64().unwrap();
        assert_eq!(reader.remaining(), 8);
    }
}
