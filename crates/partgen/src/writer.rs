//! Writes the encoded partition structures into output image files at their
//! exact byte offsets.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::encode::{GptImages, TableImages};
use crate::gpt::{GPT_HEADER_SECTOR, GPT_TABLE_SECTORS, GptHeader};
use crate::layout::DiskParameters;
use crate::mbr::{
    MBR_BOOT_SIGNATURE_OFFSET, MBR_DISK_SIGNATURE_OFFSET, MBR_PARTITION_ENTRY_OFFSET,
    MbrPartitionTable,
};
use crate::{Error, SECTOR_SIZE};

/// Which output file a GPT region lands in. Single-file mode maps every
/// region to the primary image; split mode gives each region its own file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionFile {
    /// `<output>` or, in split mode, `<output>.start`.
    Primary,
    /// `<output>.entry`.
    Entry,
    /// `<output>.end`.
    End,
}

/// Byte placement of the GPT regions beyond the boot sector, tabulated per
/// {single-file, split-file} x {no-alternate, alternate} state instead of
/// derived inline at each write.
#[derive(Debug)]
struct GptRegions {
    entry_array: (RegionFile, u64),
    alternate: Option<AlternateRegions>,
}

#[derive(Debug)]
struct AlternateRegions {
    entry_array: (RegionFile, u64),
    header: (RegionFile, u64),
}

fn gpt_regions(params: &DiskParameters, alternate_lba: u64) -> GptRegions {
    let table_bytes_start = (alternate_lba - GPT_TABLE_SECTORS) * SECTOR_SIZE;
    match (params.split_image, params.alternate) {
        (false, false) => GptRegions {
            entry_array: (RegionFile::Primary, params.first_entry_sector * SECTOR_SIZE),
            alternate: None,
        },
        (false, true) => GptRegions {
            entry_array: (RegionFile::Primary, params.first_entry_sector * SECTOR_SIZE),
            alternate: Some(AlternateRegions {
                entry_array: (RegionFile::Primary, table_bytes_start),
                header: (RegionFile::Primary, alternate_lba * SECTOR_SIZE),
            }),
        },
        (true, false) => GptRegions {
            entry_array: (RegionFile::Entry, 0),
            alternate: None,
        },
        (true, true) => GptRegions {
            entry_array: (RegionFile::Entry, 0),
            alternate: Some(AlternateRegions {
                entry_array: (RegionFile::End, 0),
                header: (RegionFile::End, GPT_TABLE_SECTORS * SECTOR_SIZE),
            }),
        },
    }
}

/// Lazily opened output files. Each file is created immediately before its
/// first write and closed when the writer is dropped, on every exit path.
struct OutputSet<'p> {
    base: &'p Path,
    split: bool,
    primary: Option<File>,
    entry: Option<File>,
    end: Option<File>,
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl<'p> OutputSet<'p> {
    fn new(base: &'p Path, split: bool) -> Self {
        Self {
            base,
            split,
            primary: None,
            entry: None,
            end: None,
        }
    }

    fn file(&mut self, region: RegionFile) -> Result<&mut File, Error> {
        let (slot, path) = match region {
            RegionFile::Primary if self.split => {
                (&mut self.primary, with_suffix(self.base, ".start"))
            }
            RegionFile::Primary => (&mut self.primary, self.base.to_path_buf()),
            RegionFile::Entry => (&mut self.entry, with_suffix(self.base, ".entry")),
            RegionFile::End => (&mut self.end, with_suffix(self.base, ".end")),
        };
        if slot.is_none() {
            *slot = Some(File::create(path)?);
        }
        Ok(slot.as_mut().expect("just created"))
    }
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> Result<(), Error> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}

/// The GPT header padded to a full sector; the bytes past the 92-byte
/// header are zero on disk.
fn header_sector(header: &GptHeader) -> [u8; SECTOR_SIZE as usize] {
    let mut sector = [0u8; SECTOR_SIZE as usize];
    let bytes = bytemuck::bytes_of(header);
    sector[..bytes.len()].copy_from_slice(bytes);
    sector
}

fn write_boot_region(
    file: &mut File,
    signature: u32,
    mbr: &MbrPartitionTable,
) -> Result<(), Error> {
    write_at(file, MBR_DISK_SIGNATURE_OFFSET, &signature.to_le_bytes())?;
    write_at(file, MBR_PARTITION_ENTRY_OFFSET, bytemuck::bytes_of(mbr))?;
    write_at(file, MBR_BOOT_SIGNATURE_OFFSET, &[0x55, 0xAA])?;
    Ok(())
}

fn write_gpt_regions(
    outputs: &mut OutputSet,
    params: &DiskParameters,
    gpt: &GptImages,
) -> Result<(), Error> {
    let regions = gpt_regions(params, gpt.header.alternate_lba.get());
    let entry_bytes: &[u8] = bytemuck::cast_slice(&gpt.entries);

    write_at(
        outputs.file(RegionFile::Primary)?,
        GPT_HEADER_SECTOR * SECTOR_SIZE,
        &header_sector(&gpt.header),
    )?;

    let (file, offset) = regions.entry_array;
    write_at(outputs.file(file)?, offset, entry_bytes)?;

    if let Some(alternate) = regions.alternate {
        let alt_header = gpt.header.to_alternate();
        let (file, offset) = alternate.entry_array;
        write_at(outputs.file(file)?, offset, entry_bytes)?;
        let (file, offset) = alternate.header;
        write_at(outputs.file(file)?, offset, &header_sector(&alt_header))?;
    }

    Ok(())
}

/// Writes the encoded tables to `path` (plus `.start`/`.entry`/`.end`
/// companions in split mode).
///
/// Every write either completes in full or the whole operation fails; a
/// partially written primary output is left in place for inspection. No
/// fsync is issued.
pub fn write_images(path: &Path, params: &DiskParameters, images: &TableImages) -> Result<(), Error> {
    let mut outputs = OutputSet::new(path, params.split_image);

    write_boot_region(
        outputs.file(RegionFile::Primary)?,
        params.signature,
        &images.mbr,
    )?;

    if let Some(gpt) = &images.gpt {
        write_gpt_regions(&mut outputs, params, gpt)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;
    use crate::layout::{PartitionRequest, TableMode, plan};

    fn params_with_one_partition() -> (DiskParameters, TableImages) {
        let params = DiskParameters::new(TableMode::Gpt);
        let request = PartitionRequest {
            size: 2048,
            legacy_type: 0x83,
            ..Default::default()
        };
        let layout = plan(&params, &[request]).unwrap();
        let images = encode(&params, &layout);
        (params, images)
    }

    #[test]
    fn test_single_file_offsets() {
        let (params, images) = params_with_one_partition();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        write_images(&path, &params, &images).unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[510..512], &[0x55, 0xAA]);
        assert_eq!(&data[512..520], b"EFI PART");
        // Entry array at the default sector 2, first entry non-empty.
        assert_ne!(&data[1024..1040], &[0u8; 16]);
        // No alternate: the file ends after the entry array.
        assert_eq!(data.len() as u64, 2 * SECTOR_SIZE + 128 * 128);
    }

    #[test]
    fn test_single_file_with_alternate() {
        let (mut params, _) = params_with_one_partition();
        params.alternate = true;
        let request = PartitionRequest {
            size: 2048,
            legacy_type: 0x83,
            ..Default::default()
        };
        let layout = plan(&params, &[request]).unwrap();
        let images = encode(&params, &layout);
        let gpt = images.gpt.as_ref().unwrap();
        let alt_lba = gpt.header.alternate_lba.get();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        write_images(&path, &params, &images).unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len() as u64, (alt_lba + 1) * SECTOR_SIZE);

        // Alternate header sector sits at the very end, entries just below.
        let header_off = (alt_lba * SECTOR_SIZE) as usize;
        assert_eq!(&data[header_off..header_off + 8], b"EFI PART");
        let table_off = ((alt_lba - GPT_TABLE_SECTORS) * SECTOR_SIZE) as usize;
        assert_eq!(
            &data[table_off..table_off + 128 * 128],
            &data[1024..1024 + 128 * 128]
        );
    }

    #[test]
    fn test_split_files() {
        let (mut params, _) = params_with_one_partition();
        params.split_image = true;
        params.alternate = true;
        let request = PartitionRequest {
            size: 2048,
            legacy_type: 0x83,
            ..Default::default()
        };
        let layout = plan(&params, &[request]).unwrap();
        let images = encode(&params, &layout);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        write_images(&path, &params, &images).unwrap();

        let start = std::fs::read(with_suffix(&path, ".start")).unwrap();
        assert_eq!(&start[510..512], &[0x55, 0xAA]);
        assert_eq!(&start[512..520], b"EFI PART");
        assert_eq!(start.len() as u64, 2 * SECTOR_SIZE);

        let entry = std::fs::read(with_suffix(&path, ".entry")).unwrap();
        assert_eq!(entry.len(), 128 * 128);
        assert_ne!(&entry[..16], &[0u8; 16]);

        let end = std::fs::read(with_suffix(&path, ".end")).unwrap();
        assert_eq!(end.len() as u64, (GPT_TABLE_SECTORS + 1) * SECTOR_SIZE);
        assert_eq!(&end[..128 * 128], &entry[..]);
        let header_off = (GPT_TABLE_SECTORS * SECTOR_SIZE) as usize;
        assert_eq!(&end[header_off..header_off + 8], b"EFI PART");

        assert!(!path.exists());
    }

    #[test]
    fn test_legacy_single_file() {
        let mut params = DiskParameters::new(TableMode::Legacy);
        params.geometry = crate::chs::Geometry {
            heads: 16,
            sectors: 63,
        };
        params.signature = 0x5452574F;
        let request = PartitionRequest {
            size: 1000,
            legacy_type: 0x83,
            ..Default::default()
        };
        let layout = plan(&params, &[request]).unwrap();
        let images = encode(&params, &layout);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        write_images(&path, &params, &images).unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 512);
        assert_eq!(&data[440..444], &0x5452574Fu32.to_le_bytes());
        assert_eq!(data[446 + 4], 0x83);
        assert_eq!(&data[510..512], &[0x55, 0xAA]);
    }
}
