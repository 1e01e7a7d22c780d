// Serialization utilities for ledger data structures
//
// All integers are little-endian on the wire except the proof-of-work
// header fields, which are big-endian (see Block::header_bytes).

use crate::core::Hash256;
use crate::error::CodecError;
use std::io::{self, Cursor, Read};

/// Types with a canonical, lossless byte encoding
pub trait Serializable: Sized {
    fn serialize(&self) -> Vec<u8>;

    fn from_reader<R: Read>(reader: &mut R) -> Result<Self, CodecError>;

    /// Decode a complete buffer, rejecting trailing bytes
    fn deserialize(data: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(data);
        let value = Self::from_reader(&mut cursor)?;
        let consumed = cursor.position() as usize;
        if consumed != data.len() {
            return Err(CodecError::TrailingBytes(
                data.len() - consumed,
                std::any::type_name::<Self>(),
            ));
        }
        Ok(value)
    }
}

/// Write a variable-length integer (VarInt)
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => buf.push(value as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x10000..=0xffffffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Read a variable-length integer (VarInt)
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte)?;

    match first_byte[0] {
        0..=0xfc => Ok(first_byte[0] as u64),
        0xfd => {
            let mut bytes = [0u8; 2];
            reader.read_exact(&mut bytes)?;
            Ok(u16::from_le_bytes(bytes) as u64)
        }
        0xfe => {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes)?;
            Ok(u32::from_le_bytes(bytes) as u64)
        }
        0xff => {
            let mut bytes = [0u8; 8];
            reader.read_exact(&mut bytes)?;
            Ok(u64::from_le_bytes(bytes))
        }
    }
}

/// Write bytes with length prefix (VarInt length + data)
pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Read bytes with length prefix
pub fn read_var_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, CodecError> {
    let len = read_varint(reader)?;
    let mut data = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut data)?;
    if data.len() as u64 != len {
        return Err(CodecError::LengthOverflow(len));
    }
    Ok(data)
}

pub fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

pub fn read_i64_le<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(i64::from_le_bytes(bytes))
}

pub fn read_hash<R: Read>(reader: &mut R) -> io::Result<Hash256> {
    let mut bytes = [0u8; 32];
    reader.read_exact(&mut bytes)?;
    Ok(Hash256::new(bytes))
}
