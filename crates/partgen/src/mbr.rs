//! Legacy MBR partition table records.

use crate::chs::Chs;
use crate::endian::U32Le;

/// Byte offset of the 4-byte disk signature in the boot sector.
pub const MBR_DISK_SIGNATURE_OFFSET: u64 = 440;
/// Byte offset of the partition entry array in the boot sector.
pub const MBR_PARTITION_ENTRY_OFFSET: u64 = 446;
/// Byte offset of the `55 AA` boot signature.
pub const MBR_BOOT_SIGNATURE_OFFSET: u64 = 510;
/// Number of primary partition entries.
pub const MBR_ENTRY_MAX: usize = 4;

/// The type byte of the protective entry covering a GPT disk.
pub const MBR_TYPE_PROTECTIVE: u8 = 0xEE;
/// Boot indicator of the active partition.
pub const MBR_ACTIVE: u8 = 0x80;

/// A single 16-byte MBR partition entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MbrPartitionEntry {
    pub boot_indicator: u8,
    pub chs_start: Chs,
    pub part_type: u8,
    pub chs_end: Chs,
    pub start_lba: U32Le,
    pub sector_count: U32Le,
}

impl Default for MbrPartitionEntry {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl MbrPartitionEntry {
    pub fn is_empty(&self) -> bool {
        self.part_type == 0x00
    }
}

/// The four-slot partition entry array written at offset 446.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MbrPartitionTable {
    pub entries: [MbrPartitionEntry; MBR_ENTRY_MAX],
}
