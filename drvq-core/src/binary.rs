//! Length-prefixed array encoding shared by codebook and label files
//!
//! Every array is a `u64` element count followed by its elements; an array
//! of arrays is the outer count followed by each inner array. All values
//! are little-endian.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Refuse counts that cannot come from a sane file
const MAX_ELEMENTS: u64 = 1 << 36;

/// Elements allocated ahead of the bytes that back them
const CHUNK: usize = 1 << 16;

pub(crate) fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<()> {
    writer.write_u64::<LittleEndian>(len as u64)?;
    Ok(())
}

pub(crate) fn read_len<R: Read>(reader: &mut R) -> Result<usize> {
    let len = reader.read_u64::<LittleEndian>()?;
    if len > MAX_ELEMENTS {
        return Err(Error::Corruption(format!("array length {} out of range", len)));
    }
    Ok(len as usize)
}

/// Read a length-prefixed array, growing the buffer only as data arrives
fn read_array<R: Read, T: Copy + Default>(
    reader: &mut R,
    fill: impl Fn(&mut R, &mut [T]) -> std::io::Result<()>,
) -> Result<Vec<T>> {
    let len = read_len(reader)?;
    let mut values = Vec::with_capacity(len.min(CHUNK));
    while values.len() < len {
        let start = values.len();
        values.resize(start + (len - start).min(CHUNK), T::default());
        fill(reader, &mut values[start..])?;
    }
    Ok(values)
}

pub(crate) fn write_u32s<W: Write>(writer: &mut W, values: &[u32]) -> Result<()> {
    write_len(writer, values.len())?;
    for &v in values {
        writer.write_u32::<LittleEndian>(v)?;
    }
    Ok(())
}

pub(crate) fn read_u32s<R: Read>(reader: &mut R) -> Result<Vec<u32>> {
    read_array(reader, |r, buf| r.read_u32_into::<LittleEndian>(buf))
}

pub(crate) fn write_u64s<W: Write>(writer: &mut W, values: &[u64]) -> Result<()> {
    write_len(writer, values.len())?;
    for &v in values {
        writer.write_u64::<LittleEndian>(v)?;
    }
    Ok(())
}

pub(crate) fn read_u64s<R: Read>(reader: &mut R) -> Result<Vec<u64>> {
    read_array(reader, |r, buf| r.read_u64_into::<LittleEndian>(buf))
}

pub(crate) fn write_f32s<W: Write>(writer: &mut W, values: &[f32]) -> Result<()> {
    write_len(writer, values.len())?;
    for &v in values {
        writer.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

pub(crate) fn read_f32s<R: Read>(reader: &mut R) -> Result<Vec<f32>> {
    read_array(reader, |r, buf| r.read_f32_into::<LittleEndian>(buf))
}

pub(crate) fn write_f64s<W: Write>(writer: &mut W, values: &[f64]) -> Result<()> {
    write_len(writer, values.len())?;
    for &v in values {
        writer.write_f64::<LittleEndian>(v)?;
    }
    Ok(())
}

pub(crate) fn read_f64s<R: Read>(reader: &mut R) -> Result<Vec<f64>> {
    read_array(reader, |r, buf| r.read_f64_into::<LittleEndian>(buf))
}

/// Write an array of arrays with a per-element writer
pub(crate) fn write_nested<W: Write, T>(
    writer: &mut W,
    arrays: &[Vec<T>],
    write_inner: impl Fn(&mut W, &[T]) -> Result<()>,
) -> Result<()> {
    write_len(writer, arrays.len())?;
    for inner in arrays {
        write_inner(writer, inner)?;
    }
    Ok(())
}

/// Read an array of arrays with a per-element reader
pub(crate) fn read_nested<R: Read, T>(
    reader: &mut R,
    read_inner: impl Fn(&mut R) -> Result<Vec<T>>,
) -> Result<Vec<Vec<T>>> {
    let len = read_len(reader)?;
    let mut arrays = Vec::with_capacity(len.min(1 << 20));
    for _ in 0..len {
        arrays.push(read_inner(reader)?);
    }
    Ok(arrays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_layout() {
        let mut buf = Vec::new();
        write_u32s(&mut buf, &[7, 9]).unwrap();
        assert_eq!(buf.len(), 8 + 2 * 4);
        assert_eq!(&buf[..8], &2u64.to_le_bytes());
        assert_eq!(&buf[8..12], &7u32.to_le_bytes());
    }

    #[test]
    fn test_nested_ragged() {
        let arrays = vec![vec![1.0, 2.0], vec![], vec![3.5]];
        let mut buf = Vec::new();
        write_nested(&mut buf, &arrays, write_f64s).unwrap();
        // outer count + three inner counts + three values
        assert_eq!(buf.len(), 8 + 3 * 8 + 3 * 8);
        let back = read_nested(&mut Cursor::new(buf), read_f64s).unwrap();
        assert_eq!(back, arrays);
    }

    #[test]
    fn test_truncated_and_oversized() {
        let mut buf = Vec::new();
        write_u64s(&mut buf, &[1, 2, 3]).unwrap();
        buf.truncate(buf.len() - 4);
        assert!(matches!(read_u64s(&mut Cursor::new(buf)), Err(Error::Io(_))));

        let huge = u64::MAX.to_le_bytes().to_vec();
        assert!(matches!(
            read_u32s(&mut Cursor::new(huge)),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_large_length_without_payload() {
        let len = MAX_ELEMENTS.to_le_bytes().to_vec();
        assert!(matches!(read_u64s(&mut Cursor::new(len.clone())), Err(Error::Io(_))));
        assert!(matches!(read_f32s(&mut Cursor::new(len)), Err(Error::Io(_))));

        // A length spanning several chunks still reads in full
        let values: Vec<u32> = (0..3 * CHUNK as u32 + 5).collect();
        let mut buf = Vec::new();
        write_u32s(&mut buf, &values).unwrap();
        assert_eq!(read_u32s(&mut Cursor::new(buf)).unwrap(), values);
    }
}
