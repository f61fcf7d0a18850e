//! Primitives shared by the EBML writer and reader: variable size integers and leaf value
//! codings.
//!
//! A variable size integer (vint) is 1 to 8 bytes long. The number of leading zero bits of
//! the first byte gives the length minus one, the first set bit is a marker which is not part
//! of the value. A value with all of its bits set is the "unknown size" sentinel.
use byteorder::{BigEndian, ByteOrder};

use super::error::{EbmlReaderError, EbmlWriterError};

pub const MAX_VINT_LENGTH: usize = 8;

/// Largest value which can be coded as a vint (the 8-byte sentinel excluded)
pub const MAX_VINT_VALUE: u64 = (1 << 56) - 2;

/// A decoded variable size integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vint {
    pub value: u64,
    pub length: usize,
    pub is_unknown: bool,
}

/// All-ones value of a vint of the given length
fn sentinel(length: usize) -> u64 {
    (1u64 << (7 * length)) - 1
}

/// Number of bytes needed to code value as a vint
pub fn coded_length(value: u64) -> usize {
    let mut length = 1;
    while length < MAX_VINT_LENGTH && value >= sentinel(length) {
        length += 1;
    }
    length
}

/// Append the vint coding of value to out
pub fn write_vint(value: u64, out: &mut Vec<u8>) -> Result<(), EbmlWriterError> {
    if value > MAX_VINT_VALUE {
        return Err(EbmlWriterError::VintOverflow(value));
    }
    let length = coded_length(value);
    let marked = value | (1u64 << (7 * length));
    let bytes = marked.to_be_bytes();
    out.extend_from_slice(&bytes[MAX_VINT_LENGTH - length..]);
    Ok(())
}

/// Length of the vint announced by its first byte
pub fn vint_length(first: u8) -> Result<usize, EbmlReaderError> {
    if first == 0 {
        Err(EbmlReaderError::InvalidVint)
    } else {
        Ok(first.leading_zeros() as usize + 1)
    }
}

/// Try to decode a vint at the start of bytes.
///
/// Returns `Ok(None)` if bytes does not hold the complete vint yet.
pub fn read_vint(bytes: &[u8]) -> Result<Option<Vint>, EbmlReaderError> {
    let first = match bytes.first() {
        Some(b) => *b,
        None => return Ok(None),
    };
    let length = vint_length(first)?;
    if bytes.len() < length {
        return Ok(None);
    }
    let raw = bytes[..length]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | (*b as u64));
    let value = raw & sentinel(length);
    Ok(Some(Vint {
        value,
        length,
        is_unknown: value == sentinel(length),
    }))
}

/// Minimal big-endian coding of an unsigned integer (at least one byte)
pub fn encode_uint(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() as usize / 8).min(7);
    bytes[skip..].to_vec()
}

pub fn encode_double(value: f64) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    BigEndian::write_f64(&mut bytes, value);
    bytes
}

pub fn decode_uint(data: &[u8]) -> Result<u64, EbmlReaderError> {
    if data.len() > 8 {
        return Err(EbmlReaderError::UIntTooLong(data.len()));
    }
    Ok(data.iter().fold(0u64, |acc, b| (acc << 8) | (*b as u64)))
}

pub fn decode_double(data: &[u8]) -> Result<f64, EbmlReaderError> {
    match data.len() {
        0 => Ok(0.0),
        4 => Ok(BigEndian::read_f32(data) as f64),
        8 => Ok(BigEndian::read_f64(data)),
        n => Err(EbmlReaderError::BadDoubleSize(n)),
    }
}

pub fn decode_str(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vint_lengths() {
        assert_eq!(coded_length(0), 1);
        assert_eq!(coded_length(126), 1);
        // 127 is the 1-byte sentinel
        assert_eq!(coded_length(127), 2);
        assert_eq!(coded_length(0x0101), 2);
        assert_eq!(coded_length(1 << 14), 3);
        assert_eq!(coded_length(MAX_VINT_VALUE), 8);
    }

    #[test]
    fn test_vint_bytes() {
        let mut out = Vec::new();
        write_vint(5, &mut out).unwrap();
        write_vint(0x0101, &mut out).unwrap();
        assert_eq!(out, vec![0x85, 0x41, 0x01]);

        let first = read_vint(&out).unwrap().unwrap();
        assert_eq!(first.value, 5);
        assert_eq!(first.length, 1);
        let second = read_vint(&out[1..]).unwrap().unwrap();
        assert_eq!(second.value, 0x0101);
        assert_eq!(second.length, 2);
    }

    #[test]
    fn test_vint_partial_and_invalid() {
        assert_eq!(read_vint(&[0x41]).unwrap(), None);
        assert_eq!(read_vint(&[]).unwrap(), None);
        assert_eq!(read_vint(&[0x00, 0x81]), Err(EbmlReaderError::InvalidVint));
        assert!(read_vint(&[0xFF]).unwrap().unwrap().is_unknown);
        assert!(write_vint(MAX_VINT_VALUE + 1, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_uint_coding() {
        assert_eq!(encode_uint(0), vec![0]);
        assert_eq!(encode_uint(0x1234), vec![0x12, 0x34]);
        assert_eq!(decode_uint(&[0x12, 0x34]).unwrap(), 0x1234);
        assert_eq!(decode_uint(&[]).unwrap(), 0);
        assert!(decode_uint(&[0; 9]).is_err());
    }

    #[test]
    fn test_double_coding() {
        assert_eq!(decode_double(&encode_double(-2.5)).unwrap(), -2.5);
        assert_eq!(decode_double(&1.5f32.to_be_bytes()).unwrap(), 1.5);
        assert!(decode_double(&[0; 3]).is_err());
    }
}
