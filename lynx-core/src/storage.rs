//! Little-endian binary encoding helpers shared by the persistence formats.
//!
//! Every on-disk structure in Lynx (the database envelope and the
//! per-index blobs) is written through these primitives. Truncated input
//! is reported as corruption rather than a plain IO error.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// File format version shared by the envelope and all index blobs.
pub(crate) const FORMAT_VERSION: u32 = 1;

pub(crate) fn write_u8<W: Write>(w: &mut W, value: u8) -> Result<()> {
    w.write_all(&[value])?;
    Ok(())
}

pub(crate) fn write_u32<W: Write>(w: &mut W, value: u32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u64<W: Write>(w: &mut W, value: u64) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_f32<W: Write>(w: &mut W, value: f32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Writes `[u32 dim][dim x f32]`.
pub(crate) fn write_vector<W: Write>(w: &mut W, vector: &[f32]) -> Result<()> {
    write_u32(w, vector.len() as u32)?;
    for &value in vector {
        write_f32(w, value)?;
    }
    Ok(())
}

/// Writes `[u32 len][len bytes]`.
pub(crate) fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<()> {
    write_u32(w, bytes.len() as u32)?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_exact_buf<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::IndexCorrupted("unexpected end of stream".into())
        } else {
            Error::from(e)
        }
    })
}

pub(crate) fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact_buf(r, &mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact_buf(r, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact_buf(r, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_f32<R: Read>(r: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    read_exact_buf(r, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Reads a `[u32 dim][dim x f32]` vector, validating the dimension
/// against `expected` when provided.
pub(crate) fn read_vector<R: Read>(r: &mut R, expected: Option<usize>) -> Result<Vec<f32>> {
    let dim = read_u32(r)? as usize;
    if let Some(expected) = expected {
        if dim != expected {
            return Err(Error::IndexCorrupted(format!(
                "stored vector has dimension {}, expected {}",
                dim, expected
            )));
        }
    }

    let mut vector = Vec::with_capacity(dim);
    for _ in 0..dim {
        vector.push(read_f32(r)?);
    }
    Ok(vector)
}

/// Reads a `[u32 len][len bytes]` byte string.
pub(crate) fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_u32(r)? as usize;
    let mut bytes = vec![0u8; len];
    read_exact_buf(r, &mut bytes)?;
    Ok(bytes)
}

/// Validates a blob header, reporting a name for the structure on failure.
pub(crate) fn check_header<R: Read>(r: &mut R, magic: u32, what: &str) -> Result<()> {
    let got_magic = read_u32(r)?;
    if got_magic != magic {
        return Err(Error::IndexCorrupted(format!(
            "{}: bad magic {:#010x}, expected {:#010x}",
            what, got_magic, magic
        )));
    }

    let version = read_u32(r)?;
    if version != FORMAT_VERSION {
        return Err(Error::IndexCorrupted(format!(
            "{}: unsupported version {}",
            what, version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 3).unwrap();
        write_u32(&mut buf, 0xDEADBEEF).unwrap();
        write_u64(&mut buf, u64::MAX - 1).unwrap();
        write_f32(&mut buf, -1.5).unwrap();

        let mut r = &buf[..];
        assert_eq!(read_u8(&mut r).unwrap(), 3);
        assert_eq!(read_u32(&mut r).unwrap(), 0xDEADBEEF);
        assert_eq!(read_u64(&mut r).unwrap(), u64::MAX - 1);
        assert_eq!(read_f32(&mut r).unwrap(), -1.5);
    }

    #[test]
    fn test_vector_round_trip() {
        let mut buf = Vec::new();
        write_vector(&mut buf, &[1.0, 2.0, 3.0]).unwrap();

        let mut r = &buf[..];
        let v = read_vector(&mut r, Some(3)).unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_vector_dimension_mismatch_is_corruption() {
        let mut buf = Vec::new();
        write_vector(&mut buf, &[1.0, 2.0]).unwrap();

        let mut r = &buf[..];
        let result = read_vector(&mut r, Some(3));
        assert!(matches!(result, Err(Error::IndexCorrupted(_))));
    }

    #[test]
    fn test_truncated_input_is_corruption() {
        let buf = [1u8, 2u8];
        let mut r = &buf[..];
        assert!(matches!(
            read_u32(&mut r),
            Err(Error::IndexCorrupted(_))
        ));
    }

    #[test]
    fn test_check_header() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0x4C594E58).unwrap();
        write_u32(&mut buf, FORMAT_VERSION).unwrap();

        let mut r = &buf[..];
        check_header(&mut r, 0x4C594E58, "test").unwrap();

        let mut r = &buf[..];
        assert!(check_header(&mut r, 0x464C4154, "test").is_err());
    }
}
