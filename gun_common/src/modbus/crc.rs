//! CRC-16/MODBUS.
//!
//! Reflected polynomial 0xA001, seed 0xFFFF, no final XOR. The CRC goes on
//! the wire low byte first.

use super::consts::{CRC_INIT, CRC_POLY};

/// Table-driven lookup, built at compile time.
const CRC_TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC over `data`.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC_INIT, |crc, &byte| {
        (crc >> 8) ^ CRC_TABLE[usize::from((crc ^ u16::from(byte)) as u8)]
    })
}

/// Bytes to append, low byte first.
#[inline]
pub fn crc16_bytes(data: &[u8]) -> [u8; 2] {
    crc16(data).to_le_bytes()
}

/// True if the last two bytes of `frame` are the CRC of the rest.
pub fn check_crc(frame: &[u8]) -> bool {
    let Some(split) = frame.len().checked_sub(2) else {
        return false;
    };
    let (body, tail) = frame.split_at(split);
    crc16_bytes(body) == [tail[0], tail[1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitwise(data: &[u8]) -> u16 {
        let mut crc = CRC_INIT;
        for &byte in data {
            crc ^= u16::from(byte);
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ CRC_POLY } else { crc >> 1 };
            }
        }
        crc
    }

    #[test]
    fn check_value() {
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn read_holding_request() {
        assert_eq!(crc16_bytes(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), [0xC5, 0xCD]);
        assert_eq!(crc16_bytes(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]), [0x76, 0x87]);
    }

    #[test]
    fn table_matches_bitwise() {
        let data: Vec<u8> = (0..=255u8).collect();
        assert_eq!(crc16(&data), bitwise(&data));
        assert_eq!(crc16(&[]), CRC_INIT);
    }

    #[test]
    fn check_crc_accepts_and_rejects() {
        let good = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD];
        assert!(check_crc(&good));
        let mut bad = good;
        bad[3] ^= 0x01;
        assert!(!check_crc(&bad));
        assert!(!check_crc(&[0x01]));
    }
}
