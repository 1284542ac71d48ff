use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::decimal::Decimal;
use crate::errors::DecimalError;

// This module contains miscellaneous shitty functions for reading various
// MySQL data types out of a packet (or, well, a Read).
//
// It's all garbage all the way down.

pub(crate) fn read_variable_length_integer<R: Read>(r: &mut R) -> io::Result<i64> {
    let first = r.read_u8()?;
    if first < 0xfb {
        Ok(i64::from(first as i8))
    } else if first == 0xfc {
        Ok(i64::from(r.read_i16::<LittleEndian>()?))
    } else if first == 0xfd {
        // why are there three byte integers fucking mysql
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf[0..3])?;
        Ok(i64::from(LittleEndian::read_i32(&buf)))
    } else if first == 0xfe {
        r.read_i64::<LittleEndian>()
    } else {
        unreachable!();
    }
}

pub(crate) fn read_uint24<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf[0..3])?;
    Ok(LittleEndian::read_u32(&buf))
}

pub(crate) fn read_int24<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf[0..3])?;
    Ok(LittleEndian::read_i32(&buf))
}

pub(crate) fn read_one_byte_length_prefixed_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let length = r.read_u8()?;
    read_nbytes(r, length)
}

pub(crate) fn read_two_byte_length_prefixed_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let length = r.read_u16::<LittleEndian>()? as usize;
    read_nbytes(r, length)
}

pub(crate) fn read_var_byte_length_prefixed_bytes<R: Read>(
    r: &mut R,
    pl: u8,
) -> io::Result<Vec<u8>> {
    let len = match pl {
        1 => r.read_u8()? as usize,
        2 => r.read_u16::<LittleEndian>()? as usize,
        3 => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf[0..3])?;
            LittleEndian::read_u32(&buf) as usize
        }
        4 => r.read_u32::<LittleEndian>()? as usize,
        8 => r.read_u64::<LittleEndian>()? as usize,
        l => unreachable!("got unexpected length {0:?}", l),
    };
    read_nbytes(r, len)
}

pub(crate) fn read_one_byte_length_prefixed_string<R: Read>(r: &mut R) -> io::Result<String> {
    let buf = read_one_byte_length_prefixed_bytes(r)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub(crate) fn read_two_byte_length_prefixed_string<R: Read>(r: &mut R) -> io::Result<String> {
    let buf = read_two_byte_length_prefixed_bytes(r)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub(crate) fn read_nbytes<R: Read, S: Into<usize>>(
    r: &mut R,
    desired_bytes: S,
) -> io::Result<Vec<u8>> {
    let mut into = vec![0u8; desired_bytes.into()];
    r.read_exact(&mut into)?;
    Ok(into)
}

const DECIMAL_DIGITS_PER_INTEGER: u8 = 9;
const COMPRESSED_BYTE_MAP: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];

fn new_decimal_byte_length(precision: u8, decimal: u8) -> usize {
    let integral = precision - decimal;
    let uncompressed_integers = (integral / DECIMAL_DIGITS_PER_INTEGER) as usize;
    let uncompressed_decimals = (decimal / DECIMAL_DIGITS_PER_INTEGER) as usize;
    let compressed_integers =
        integral as usize - uncompressed_integers * DECIMAL_DIGITS_PER_INTEGER as usize;
    let compressed_decimals =
        decimal as usize - uncompressed_decimals * DECIMAL_DIGITS_PER_INTEGER as usize;
    uncompressed_integers * 4
        + COMPRESSED_BYTE_MAP[compressed_integers]
        + uncompressed_decimals * 4
        + COMPRESSED_BYTE_MAP[compressed_decimals]
}

/// Read a `NEWDECIMAL` value off the wire into the bit-exact [`Decimal`].
pub(crate) fn read_new_decimal<R: Read>(
    r: &mut R,
    precision: u8,
    decimal: u8,
) -> Result<Decimal, DecimalError> {
    let bytes_to_read = new_decimal_byte_length(precision, decimal);
    let buf = read_nbytes(r, bytes_to_read).map_err(|_| DecimalError::BadNum)?;
    let (value, _consumed) = Decimal::from_binary(&buf, precision, decimal)?;
    Ok(value)
}

pub(crate) fn read_datetime_subsecond_part<R: Read>(r: &mut R, pack_length: u8) -> io::Result<u32> {
    Ok(match pack_length {
        0 => 0u32,
        1 | 2 => read_be_uint(r, 1)?,
        3 | 4 => read_be_uint(r, 2)?,
        5 | 6 => read_be_uint(r, 3)?,
        _ => 0u32,
    })
}

fn read_be_uint<R: Read>(r: &mut R, nbytes: usize) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf[4 - nbytes..])?;
    Ok(byteorder::BigEndian::read_u32(&buf))
}
