//! # CRC-8 for the modem host link
//!
//! Checksum appended to every frame exchanged with the serial LoRa modem.
//!
//! **Polynomial**: 0xD5 (CRC-8/DVB-S2)
//! **Initial Value**: 0x00

const POLY: u8 = 0xD5;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;

        while bit < 8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
            bit += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Checksum over `data` (length byte + radio frame)
///
/// # Examples
///
/// ```
/// use irradiance_node::radio::crc::crc8;
///
/// assert_eq!(crc8(&[]), 0x00);
/// assert_ne!(crc8(b"ok"), crc8(b"oj"));
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| TABLE[(crc ^ byte) as usize])
}
