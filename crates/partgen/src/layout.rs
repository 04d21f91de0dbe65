//! Layout planning: turning ordered partition requests into concrete sector
//! ranges and whole-disk quantities.

use crate::chs::Geometry;
use crate::gpt::{GPT_FIRST_ENTRY_SECTOR, GPT_TABLE_SECTORS, GptAttributes};
use crate::guid::{Guid, legacy_type_to_gpt};
use crate::mbr::MBR_ENTRY_MAX;
use crate::{Error, SECTOR_SIZE};

/// Which partition table format the run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMode {
    /// Legacy MBR only.
    Legacy,
    /// GUID partition table with a protective (optionally hybrid) MBR.
    Gpt,
}

/// User intent for one partition slot. The slot index (position in the
/// request sequence) is part of the partition's identity and fixes its
/// output order.
#[derive(Debug, Clone, Default)]
pub struct PartitionRequest {
    /// Requested size in sectors. Zero is only valid under the
    /// ignore-null-sized policy, which skips the slot entirely.
    pub size: u64,
    /// Explicit start sector; 0 places the partition at the cursor.
    pub start: u64,
    /// Legacy MBR type byte; also selects the GPT type GUID when no
    /// explicit override is given.
    pub legacy_type: u8,
    /// Explicit GPT type GUID, overriding the legacy type mapping.
    pub type_guid: Option<Guid>,
    /// Display name for the GPT entry.
    pub name: Option<String>,
    /// Sets the platform-required attribute bit.
    pub required: bool,
    /// Mirror this partition into the hybrid MBR.
    pub hybrid: bool,
    /// Caller-supplied GPT attribute bits.
    pub attributes: GptAttributes,
}

impl PartitionRequest {
    /// The effective GPT type GUID: the explicit override if present,
    /// otherwise the mapping of the legacy type byte.
    pub fn gpt_type(&self) -> Guid {
        self.type_guid
            .unwrap_or_else(|| legacy_type_to_gpt(self.legacy_type).0)
    }

    /// The effective display name. The legacy type mapping only supplies a
    /// default (for the EFI system partition) when no explicit type GUID
    /// was given.
    pub fn gpt_name(&self) -> Option<&str> {
        if let Some(name) = self.name.as_deref() {
            return Some(name);
        }
        if self.type_guid.is_none() {
            return legacy_type_to_gpt(self.legacy_type).1;
        }
        None
    }
}

/// Process-wide generation parameters, populated once and read-only during
/// the run.
#[derive(Debug, Clone)]
pub struct DiskParameters {
    pub mode: TableMode,
    /// Geometry for CHS encoding and, in legacy mode, cylinder rounding.
    pub geometry: Geometry,
    /// Kilobyte alignment expressed in sectors. When set it takes
    /// precedence over cylinder rounding in every cursor step, in both
    /// table modes.
    pub align: Option<u64>,
    /// Slot index (0-based) of the active/bootable partition.
    pub active: Option<usize>,
    /// 4-byte disk signature written at offset 440.
    pub signature: u32,
    pub disk_guid: Guid,
    /// LBA of the primary GPT entry array.
    pub first_entry_sector: u64,
    /// Hard cap on the last usable sector; unset derives it from the
    /// partition list.
    pub last_usable: Option<u64>,
    /// Write the three GPT regions to separate files.
    pub split_image: bool,
    /// Replicate the entry array and header at the end of the disk.
    pub alternate: bool,
    /// Skip zero-sized requests instead of failing.
    pub ignore_null: bool,
}

impl DiskParameters {
    pub fn new(mode: TableMode) -> Self {
        Self {
            mode,
            geometry: Geometry::GPT_PROTECTIVE,
            align: None,
            active: Some(0),
            signature: 0,
            disk_guid: Guid::default(),
            first_entry_sector: GPT_FIRST_ENTRY_SECTOR,
            last_usable: None,
            split_image: false,
            alternate: false,
            ignore_null: false,
        }
    }

    /// First sector available for partition data: one track in legacy mode
    /// (the boot sector's track stays reserved), the end of the GPT metadata
    /// region in GPT mode.
    pub fn first_usable(&self) -> u64 {
        match self.mode {
            TableMode::Legacy => self.geometry.sectors as u64,
            TableMode::Gpt => self.first_entry_sector + GPT_TABLE_SECTORS,
        }
    }
}

/// The computed placement of one partition. Produced once by the planner
/// and never revisited.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    /// The request's slot index; skipped slots leave holes in the numbering.
    pub slot: usize,
    pub request: PartitionRequest,
    /// Actual start sector.
    pub start: u64,
    /// Exclusive end sector (`start + size`).
    pub end: u64,
}

impl PartitionPlan {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn byte_offset(&self) -> u64 {
        self.start * SECTOR_SIZE
    }

    pub fn byte_size(&self) -> u64 {
        self.size() * SECTOR_SIZE
    }
}

/// Whole-disk quantities specific to GPT output.
#[derive(Debug, Clone)]
pub struct GptWindow {
    /// First sector available for partitions.
    pub first_usable: u64,
    /// Last usable sector, inclusive.
    pub last_usable: u64,
    /// LBA of the alternate header; the alternate entry array sits in the
    /// 32 sectors directly below it.
    pub alternate_lba: u64,
    /// Sector range (inclusive) between the GPT metadata and an explicitly
    /// placed first partition, filled by a synthetic BIOS-boot entry in the
    /// last GPT slot.
    pub boot_gap: Option<(u64, u64)>,
}

impl GptWindow {
    /// Extent of the protective MBR entry: from the GPT header sector
    /// through the alternate header location, inclusive.
    pub fn protective_extent(&self) -> (u64, u64) {
        (crate::gpt::GPT_HEADER_SECTOR, self.alternate_lba)
    }
}

/// The planner's output: ordered partition placements plus derived
/// whole-disk quantities.
#[derive(Debug, Clone)]
pub struct DiskLayout {
    pub plans: Vec<PartitionPlan>,
    /// Slot indices mirrored into the hybrid MBR, in placement order,
    /// capped at the three entries left beside the protective record.
    pub hybrid_slots: Vec<usize>,
    /// Present in GPT mode only.
    pub gpt: Option<GptWindow>,
}

fn align_up(value: u64, unit: u64) -> u64 {
    value.div_ceil(unit) * unit
}

/// Computes the disk layout for an ordered request sequence.
///
/// Placement is strictly by ascending slot: each partition starts at or
/// after the cumulative end of everything placed before it (the cursor),
/// never before. Rounding always rounds up and keeps values already on a
/// boundary in place; requests are never reordered to resolve conflicts.
pub fn plan(params: &DiskParameters, requests: &[PartitionRequest]) -> Result<DiskLayout, Error> {
    let cylinder = params.geometry.cylinder_size();
    let first_usable = params.first_usable();
    let mut cursor = first_usable;

    let mut plans = Vec::with_capacity(requests.len());
    let mut hybrid_slots = Vec::new();

    for (slot, request) in requests.iter().enumerate() {
        if request.size == 0 {
            if params.ignore_null {
                continue;
            }
            return Err(Error::InvalidPartitionSize { slot });
        }

        let start = if request.start != 0 {
            if request.start < cursor {
                return Err(Error::StartOverlapsPrevious {
                    slot,
                    requested: request.start,
                    cursor,
                });
            }
            request.start
        } else if let Some(unit) = params.align {
            align_up(cursor, unit)
        } else if params.mode == TableMode::Legacy {
            align_up(cursor, cylinder)
        } else {
            cursor
        };

        let end = start + request.size;
        if params.mode == TableMode::Gpt {
            if let Some(last_usable) = params.last_usable {
                if end > last_usable + 1 {
                    return Err(Error::ExceedsUsableWindow {
                        slot,
                        end: end - 1,
                        last_usable,
                    });
                }
            }
        }

        cursor = end;
        if params.mode == TableMode::Legacy && params.align.is_none() {
            cursor = align_up(cursor, cylinder);
        }

        if request.hybrid && hybrid_slots.len() < MBR_ENTRY_MAX - 1 {
            hybrid_slots.push(slot);
        }

        tracing::debug!(
            "partition {}: start={} end={} size={}",
            slot,
            start * SECTOR_SIZE,
            end * SECTOR_SIZE,
            (end - start) * SECTOR_SIZE
        );

        plans.push(PartitionPlan {
            slot,
            request: request.clone(),
            start,
            end,
        });
    }

    let gpt = match params.mode {
        TableMode::Legacy => None,
        TableMode::Gpt => {
            let last_usable = params.last_usable.unwrap_or(cursor - 1);
            let alternate_lba = last_usable + GPT_TABLE_SECTORS + 1;

            // An explicitly placed first partition can leave boot code room
            // between the entry array and partition data; that gap gets a
            // synthetic BIOS-boot entry without consuming a numbered slot.
            let boot_gap = plans
                .first()
                .filter(|p| p.slot == 0 && p.request.start != 0 && p.start > first_usable)
                .map(|p| (first_usable, p.start - 1));

            tracing::debug!(
                "PartitionEntryLBA={} FirstUsableLBA={} LastUsableLBA={}",
                params.first_entry_sector,
                first_usable,
                last_usable
            );

            Some(GptWindow {
                first_usable,
                last_usable,
                alternate_lba,
                boot_gap,
            })
        }
    };

    Ok(DiskLayout {
        plans,
        hybrid_slots,
        gpt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(size: u64) -> PartitionRequest {
        PartitionRequest {
            size,
            legacy_type: 0x83,
            ..Default::default()
        }
    }

    fn gpt_params() -> DiskParameters {
        DiskParameters::new(TableMode::Gpt)
    }

    fn legacy_params() -> DiskParameters {
        let mut params = DiskParameters::new(TableMode::Legacy);
        params.geometry = Geometry {
            heads: 255,
            sectors: 63,
        };
        params
    }

    #[test]
    fn test_gpt_kb_alignment_scenario() {
        // 1 MiB alignment; 1024 KiB and 2048 KiB partitions.
        let mut params = gpt_params();
        params.align = Some(2048);
        let layout = plan(&params, &[request(2048), request(4096)]).unwrap();

        assert_eq!(layout.plans[0].start, 2048);
        assert_eq!(layout.plans[0].end, 4096);
        assert_eq!(layout.plans[1].start, 4096);
        assert_eq!(layout.plans[1].end, 8192);

        let gpt = layout.gpt.unwrap();
        assert_eq!(gpt.first_usable, 34);
        assert_eq!(gpt.last_usable, 8191);
        assert_eq!(gpt.alternate_lba, 8192 + 32);
    }

    #[test]
    fn test_legacy_cylinder_scenario() {
        // 255 heads x 63 sectors, one 10 MiB partition.
        let layout = plan(&legacy_params(), &[request(20480)]).unwrap();
        assert_eq!(layout.plans[0].start, 16065);
        assert_eq!(layout.plans[0].size(), 20480);
        assert!(layout.gpt.is_none());
    }

    #[test]
    fn test_legacy_starts_cylinder_aligned() {
        let layout = plan(&legacy_params(), &[request(100), request(100), request(100)]).unwrap();
        for plan in &layout.plans {
            assert_eq!(plan.start % 16065, 0, "slot {}", plan.slot);
        }
        // Pairwise non-overlapping and strictly increasing.
        for pair in layout.plans.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_kb_alignment_overrides_cylinder() {
        let mut params = legacy_params();
        params.align = Some(2048);
        let layout = plan(&params, &[request(100), request(100)]).unwrap();
        // The boot track rounds up to the first aligned boundary, not to a
        // full cylinder first.
        assert_eq!(layout.plans[0].start, 2048);
        assert_eq!(layout.plans[1].start, 4096);
    }

    #[test]
    fn test_legacy_explicit_start_within_first_cylinder() {
        // Anything past the boot track is a valid explicit start, even
        // inside the first cylinder.
        let mut early = request(100);
        early.start = 1000;
        let layout = plan(&legacy_params(), &[early]).unwrap();
        assert_eq!(layout.plans[0].start, 1000);

        let mut on_track = request(100);
        on_track.start = 63;
        let layout = plan(&legacy_params(), &[on_track]).unwrap();
        assert_eq!(layout.plans[0].start, 63);

        let mut in_track = request(100);
        in_track.start = 62;
        assert!(plan(&legacy_params(), &[in_track]).is_err());
    }

    #[test]
    fn test_explicit_start_before_cursor_fails() {
        let mut early = request(100);
        early.start = 10;
        let err = plan(&gpt_params(), &[request(2048), early]).unwrap_err();
        assert!(matches!(
            err,
            Error::StartOverlapsPrevious {
                slot: 1,
                requested: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_explicit_start_at_cursor_ok() {
        let mut exact = request(100);
        exact.start = 34 + 2048;
        let layout = plan(&gpt_params(), &[request(2048), exact]).unwrap();
        assert_eq!(layout.plans[1].start, 2082);
    }

    #[test]
    fn test_zero_size_policy() {
        let err = plan(&gpt_params(), &[request(0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidPartitionSize { slot: 0 }));

        let mut params = gpt_params();
        params.ignore_null = true;
        let layout = plan(&params, &[request(0), request(100)]).unwrap();
        // The zero-sized request is skipped but still consumes its slot.
        assert_eq!(layout.plans.len(), 1);
        assert_eq!(layout.plans[0].slot, 1);
    }

    #[test]
    fn test_usable_window_cap() {
        let mut params = gpt_params();
        params.last_usable = Some(1000);
        let err = plan(&params, &[request(2048)]).unwrap_err();
        assert!(matches!(
            err,
            Error::ExceedsUsableWindow {
                slot: 0,
                last_usable: 1000,
                ..
            }
        ));

        // Exactly filling the window is fine.
        let layout = plan(&params, &[request(1000 + 1 - 34)]).unwrap();
        assert_eq!(layout.plans[0].end, 1001);
        assert_eq!(layout.gpt.unwrap().last_usable, 1000);
    }

    #[test]
    fn test_boot_gap_for_explicit_first_start() {
        let mut first = request(2048);
        first.start = 2048;
        let layout = plan(&gpt_params(), &[first]).unwrap();
        let gpt = layout.gpt.unwrap();
        assert_eq!(gpt.boot_gap, Some((34, 2047)));
        assert_eq!(gpt.protective_extent(), (1, gpt.alternate_lba));
    }

    #[test]
    fn test_no_boot_gap_for_auto_start() {
        let layout = plan(&gpt_params(), &[request(2048)]).unwrap();
        assert_eq!(layout.gpt.unwrap().boot_gap, None);
    }

    #[test]
    fn test_hybrid_cap() {
        let mut requests: Vec<PartitionRequest> = (0..5).map(|_| request(64)).collect();
        for r in requests.iter_mut() {
            r.hybrid = true;
        }
        let layout = plan(&gpt_params(), &requests).unwrap();
        assert_eq!(layout.hybrid_slots, vec![0, 1, 2]);
    }
}
