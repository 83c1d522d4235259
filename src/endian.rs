//! Byte-order-aware primitives for reading integers out of DOF buffers.
// Copyright 2021 Oxide Computer Company

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::types::Encoding;

pub(crate) fn read_u16(encoding: Encoding, buf: &[u8], offset: usize) -> u16 {
    match encoding {
        Encoding::Lsb => LittleEndian::read_u16(&buf[offset..]),
        Encoding::Msb => BigEndian::read_u16(&buf[offset..]),
    }
}

pub(crate) fn read_i16(encoding: Encoding, buf: &[u8], offset: usize) -> i16 {
    read_u16(encoding, buf, offset) as i16
}

pub(crate) fn read_u32(encoding: Encoding, buf: &[u8], offset: usize) -> u32 {
    match encoding {
        Encoding::Lsb => LittleEndian::read_u32(&buf[offset..]),
        Encoding::Msb => BigEndian::read_u32(&buf[offset..]),
    }
}

pub(crate) fn read_i32(encoding: Encoding, buf: &[u8], offset: usize) -> i32 {
    read_u32(encoding, buf, offset) as i32
}

// 64-bit fields are laid out as two 32-bit halves; compose them in a u64 so
// the full range round-trips exactly.
pub(crate) fn read_u64(encoding: Encoding, buf: &[u8], offset: usize) -> u64 {
    let a = u64::from(read_u32(encoding, buf, offset));
    let b = u64::from(read_u32(encoding, buf, offset + 4));
    match encoding {
        Encoding::Lsb => (b << 32) | a,
        Encoding::Msb => (a << 32) | b,
    }
}

/// Map a bitmask onto the named flags in `table`, one name per single-bit
/// value. Bits without a name are dropped. The walk covers bits 0 through 31
/// only; every flag field in the format is at most 32 bits wide.
pub(crate) fn map_flags<F: Copy>(value: i64, table: &[(i32, F)]) -> Vec<F> {
    let mut flags = Vec::new();
    let mut bit: i32 = 1;
    while (value < 0 || i64::from(bit) <= value) && bit != 0 {
        if (value as i32) & bit != 0 {
            if let Some((_, flag)) = table.iter().find(|(b, _)| *b == bit) {
                flags.push(*flag);
            }
        }
        bit = bit.wrapping_shl(1);
    }
    flags
}
