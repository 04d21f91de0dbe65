//! CRC-32 used by the GPT header and entry array integrity fields.

use crc::{CRC_32_ISO_HDLC, Crc};

const HASHER_ISO_HDLC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the CRC-32/ISO-HDLC checksum of `data`.
///
/// This is the reflected 0xEDB88320 polynomial with initial value 0xFFFFFFFF
/// and final XOR 0xFFFFFFFF, identical to the zlib CRC-32 mandated by the
/// UEFI specification for GPT structures. Independent firmware readers verify
/// these fields, so the output must match bit for bit.
pub fn crc32(data: &[u8]) -> u32 {
    HASHER_ISO_HDLC.checksum(data)
}
