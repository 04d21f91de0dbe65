//! Builds the binary MBR/GPT images from a computed [`DiskLayout`].

use bytemuck::Zeroable;

use crate::chs::Chs;
use crate::gpt::{GPT_ENTRY_MAX, GPT_HEADER_SECTOR, GptAttributes, GptEntry, GptHeader};
use crate::guid::Guid;
use crate::layout::{DiskLayout, DiskParameters, GptWindow, PartitionPlan, TableMode};
use crate::mbr::{MBR_ACTIVE, MBR_ENTRY_MAX, MBR_TYPE_PROTECTIVE, MbrPartitionEntry, MbrPartitionTable};
use crate::name::FixedUtf16Name;

/// The encoded partition table structures, ready for the image writer.
/// Checksums are final; nothing here is mutated after encoding.
#[derive(Debug, Clone)]
pub struct TableImages {
    pub mbr: MbrPartitionTable,
    pub gpt: Option<GptImages>,
}

/// Primary GPT header and entry array. The alternate copies are derived at
/// write time via [`GptHeader::to_alternate`]; the entry array is shared.
#[derive(Clone)]
pub struct GptImages {
    pub header: GptHeader,
    pub entries: [GptEntry; GPT_ENTRY_MAX],
}

impl core::fmt::Debug for GptImages {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let used = self.entries.iter().filter(|e| !e.is_empty()).count();
        f.debug_struct("GptImages")
            .field("header", &self.header)
            .field("used_entries", &used)
            .finish()
    }
}

fn mbr_entry(params: &DiskParameters, plan: &PartitionPlan) -> MbrPartitionEntry {
    let mut entry = MbrPartitionEntry::default();
    entry.boot_indicator = if params.active == Some(plan.slot) {
        MBR_ACTIVE
    } else {
        0x00
    };
    entry.part_type = plan.request.legacy_type;
    entry.start_lba.set(plan.start as u32);
    entry.sector_count.set(plan.size() as u32);
    entry.chs_start = Chs::from_lba(plan.start, params.geometry);
    entry.chs_end = Chs::from_lba(plan.end - 1, params.geometry);
    entry
}

fn protective_entry(params: &DiskParameters, window: &GptWindow) -> MbrPartitionEntry {
    let (start, end) = window.protective_extent();
    let mut entry = MbrPartitionEntry::default();
    entry.part_type = MBR_TYPE_PROTECTIVE;
    entry.start_lba.set(start as u32);
    entry.sector_count.set((end + 1 - GPT_HEADER_SECTOR) as u32);
    entry.chs_start = Chs::from_lba(start, params.geometry);
    entry.chs_end = Chs::from_lba(end, params.geometry);
    entry
}

fn gpt_entry(params: &DiskParameters, plan: &PartitionPlan) -> GptEntry {
    let request = &plan.request;
    let mut attributes = request.attributes;
    if params.active == Some(plan.slot) {
        attributes |= GptAttributes::LEGACY_BOOT;
    }
    if request.required {
        attributes |= GptAttributes::PLATFORM_REQUIRED;
    }

    let mut entry = GptEntry::default();
    entry.type_guid = request.gpt_type();
    entry.unique_guid = params.disk_guid.for_slot(plan.slot);
    entry.start_lba.set(plan.start);
    entry.end_lba.set(plan.end - 1);
    entry.attributes.set(attributes.bits());
    if let Some(name) = request.gpt_name() {
        entry.name = FixedUtf16Name::encode(name);
    }
    entry
}

/// Encodes a layout into its on-disk structures.
///
/// In GPT mode the entry-array CRC is computed before the header CRC, and
/// the header CRC last, with its own field zeroed during the pass.
///
/// A legacy layout must fit the four-entry table; slots past it are a
/// caller error (debug-asserted) and do not appear in the output.
pub fn encode(params: &DiskParameters, layout: &DiskLayout) -> TableImages {
    let mut mbr = MbrPartitionTable::default();

    let Some(window) = &layout.gpt else {
        debug_assert_eq!(params.mode, TableMode::Legacy);
        for plan in &layout.plans {
            debug_assert!(
                plan.slot < MBR_ENTRY_MAX,
                "legacy table holds at most {MBR_ENTRY_MAX} partitions"
            );
            if plan.slot < MBR_ENTRY_MAX {
                mbr.entries[plan.slot] = mbr_entry(params, plan);
            }
        }
        return TableImages { mbr, gpt: None };
    };

    // Slot 0 of the legacy table is the protective record; hybrid mirrors
    // fill the remaining three in placement order.
    mbr.entries[0] = protective_entry(params, window);
    for (mirror, &slot) in layout.hybrid_slots.iter().enumerate() {
        let plan = layout
            .plans
            .iter()
            .find(|p| p.slot == slot)
            .expect("hybrid slot refers to a placed partition");
        mbr.entries[mirror + 1] = mbr_entry(params, plan);
    }

    let mut entries = [GptEntry::zeroed(); GPT_ENTRY_MAX];
    for plan in &layout.plans {
        entries[plan.slot] = gpt_entry(params, plan);
    }

    if let Some((gap_start, gap_end)) = window.boot_gap {
        let filler = &mut entries[GPT_ENTRY_MAX - 1];
        filler.type_guid = Guid::BIOS_BOOT;
        filler.unique_guid = params.disk_guid.for_slot(GPT_ENTRY_MAX - 1);
        filler.start_lba.set(gap_start);
        filler.end_lba.set(gap_end);
    }

    let mut header = GptHeader::default();
    header.self_lba.set(GPT_HEADER_SECTOR);
    header.alternate_lba.set(window.alternate_lba);
    header.first_usable.set(window.first_usable);
    header.last_usable.set(window.last_usable);
    header.disk_guid = params.disk_guid;
    header.first_entry.set(params.first_entry_sector);
    header
        .entry_crc32
        .set(crate::crc::crc32(bytemuck::cast_slice(&entries)));
    header.update_crc();

    TableImages {
        mbr,
        gpt: Some(GptImages { header, entries }),
    }
}
