//! GUID partition table on-disk records.

use bitflags::bitflags;

use crate::crc::crc32;
use crate::endian::{U32Le, U64Le};
use crate::guid::Guid;
use crate::name::FixedUtf16Name;

/// LBA of the primary GPT header.
pub const GPT_HEADER_SECTOR: u64 = 1;
/// Default LBA of the primary partition entry array.
pub const GPT_FIRST_ENTRY_SECTOR: u64 = 2;
/// Size of the GPT header in bytes; the rest of its sector is zero.
pub const GPT_HEADER_SIZE: usize = 92;
/// Number of entries in the array. Fixed, and part of the header CRC.
pub const GPT_ENTRY_MAX: usize = 128;
/// Size of one partition entry in bytes.
pub const GPT_ENTRY_SIZE: usize = 128;
/// UTF-16 code units in the entry name field.
pub const GPT_ENTRY_NAME_UNITS: usize = 36;
/// Sectors occupied by the full entry array.
pub const GPT_TABLE_SECTORS: u64 = (GPT_ENTRY_MAX * GPT_ENTRY_SIZE) as u64 / crate::SECTOR_SIZE;

const GPT_SIGNATURE: [u8; 8] = *b"EFI PART";
const GPT_REVISION: u32 = 0x0001_0000;

bitflags! {
    /// GPT partition attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GptAttributes: u64 {
        /// The platform requires the partition to function.
        const PLATFORM_REQUIRED = 1 << 0;
        /// EFI firmware should ignore the partition content.
        const EFI_IGNORE = 1 << 1;
        /// Legacy BIOS bootable.
        const LEGACY_BOOT = 1 << 2;
        /// ChromeOS kernel priority = 1.
        const CROS_PRIORITY_1 = 1 << 48;
        /// ChromeOS kernel successful-boot flag.
        const CROS_SUCCESS = 1 << 56;
    }
}

/// The 92-byte GPT header.
///
/// Checksums are the last fields set: the entry-array CRC goes in before the
/// header CRC, and the header CRC is computed with its own field zeroed.
/// Mutating any other field afterwards invalidates both.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GptHeader {
    pub signature: [u8; 8],
    pub revision: U32Le,
    pub header_size: U32Le,
    pub crc32: U32Le,
    pub reserved: U32Le,
    pub self_lba: U64Le,
    pub alternate_lba: U64Le,
    pub first_usable: U64Le,
    pub last_usable: U64Le,
    pub disk_guid: Guid,
    pub first_entry: U64Le,
    pub entry_count: U32Le,
    pub entry_size: U32Le,
    pub entry_crc32: U32Le,
}

impl Default for GptHeader {
    fn default() -> Self {
        Self {
            signature: GPT_SIGNATURE,
            revision: U32Le::new(GPT_REVISION),
            header_size: U32Le::new(GPT_HEADER_SIZE as u32),
            crc32: U32Le::new(0),
            reserved: U32Le::new(0),
            self_lba: U64Le::new(0),
            alternate_lba: U64Le::new(0),
            first_usable: U64Le::new(0),
            last_usable: U64Le::new(0),
            disk_guid: Guid::default(),
            first_entry: U64Le::new(0),
            entry_count: U32Le::new(GPT_ENTRY_MAX as u32),
            entry_size: U32Le::new(GPT_ENTRY_SIZE as u32),
            entry_crc32: U32Le::new(0),
        }
    }
}

impl GptHeader {
    /// Recomputes the header CRC over the full header with the CRC field
    /// treated as zero. Call after every other field, including
    /// `entry_crc32`, is final.
    pub fn update_crc(&mut self) {
        self.crc32.set(0);
        let sum = crc32(bytemuck::bytes_of(self));
        self.crc32.set(sum);
    }

    /// Derives the alternate (backup) header: self and alternate LBAs
    /// swapped, the entry pointer repointed at the alternate entry array
    /// sitting directly below the alternate header, CRC recomputed.
    pub fn to_alternate(&self) -> Self {
        let mut alt = *self;
        alt.self_lba = self.alternate_lba;
        alt.alternate_lba = self.self_lba;
        alt.first_entry
            .set(self.alternate_lba.get() - GPT_TABLE_SECTORS);
        alt.update_crc();
        alt
    }

    /// Verifies signature and header CRC; used by tests re-reading output.
    pub fn verify(&self) -> bool {
        if self.signature != GPT_SIGNATURE {
            return false;
        }
        let mut copy = *self;
        copy.crc32.set(0);
        crc32(bytemuck::bytes_of(&copy)) == self.crc32.get()
    }
}

/// A 128-byte GPT partition entry. `end_lba` is inclusive.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GptEntry {
    pub type_guid: Guid,
    pub unique_guid: Guid,
    pub start_lba: U64Le,
    pub end_lba: U64Le,
    pub attributes: U64Le,
    pub name: FixedUtf16Name<GPT_ENTRY_NAME_UNITS>,
}

impl Default for GptEntry {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl GptEntry {
    pub fn is_empty(&self) -> bool {
        self.type_guid.is_zero()
    }
}
