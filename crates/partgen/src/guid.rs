//! GUIDs in their mixed-endian on-disk form, plus the partition type
//! registry mapping legacy MBR type bytes and symbolic names to GPT type
//! GUIDs.

use core::fmt;
use core::str::FromStr;

use crate::Error;
use crate::gpt::GptAttributes;

/// A GUID in on-disk byte order: the first three fields little-endian, the
/// remaining eight bytes verbatim.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Guid([u8; 16]);

impl Default for Guid {
    fn default() -> Self {
        Self([0; 16])
    }
}

impl Guid {
    pub const EFI_SYSTEM: Self = Self::from_fields(
        0xC12A7328,
        0xF81F,
        0x11D2,
        [0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
    );
    pub const BASIC_DATA: Self = Self::from_fields(
        0xEBD0A0A2,
        0xB9E5,
        0x4433,
        [0x87, 0xC0, 0x68, 0xB6, 0xB7, 0x26, 0x99, 0xC7],
    );
    pub const BIOS_BOOT: Self = Self::from_fields(
        0x21686148,
        0x6449,
        0x6E6F,
        [0x74, 0x4E, 0x65, 0x65, 0x64, 0x45, 0x46, 0x49],
    );
    pub const CHROME_OS_KERNEL: Self = Self::from_fields(
        0xFE3A2A5D,
        0x4F32,
        0x41A7,
        [0xB7, 0x25, 0xAC, 0xCC, 0x32, 0x85, 0xA3, 0x09],
    );
    pub const LINUX_FS: Self = Self::from_fields(
        0x0FC63DAF,
        0x8483,
        0x4772,
        [0x8E, 0x79, 0x3D, 0x69, 0xD8, 0x47, 0x7D, 0xE4],
    );
    pub const LINUX_FIT: Self = Self::from_fields(
        0xCAE9BE83,
        0xB15F,
        0x49CC,
        [0x86, 0x3F, 0x08, 0x1B, 0x74, 0x4A, 0x2D, 0x93],
    );
    pub const SIFIVE_SPL: Self = Self::from_fields(
        0x5B193300,
        0xFC78,
        0x40CD,
        [0x80, 0x02, 0xE8, 0x6C, 0x45, 0x58, 0x0B, 0x47],
    );
    pub const SIFIVE_UBOOT: Self = Self::from_fields(
        0x2E54B353,
        0x1271,
        0x4842,
        [0x80, 0x6F, 0xE4, 0x36, 0xD6, 0xAF, 0x69, 0x85],
    );

    /// Builds a GUID from its canonical fields, converting the first three
    /// to little-endian byte order.
    pub const fn from_fields(a: u32, b: u16, c: u16, d: [u8; 8]) -> Self {
        let a = a.to_le_bytes();
        let b = b.to_le_bytes();
        let c = c.to_le_bytes();
        Self([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], d[0], d[1], d[2], d[3], d[4], d[5],
            d[6], d[7],
        ])
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 16]
    }

    /// Parses the canonical 36-character hyphenated representation into the
    /// on-disk byte order.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let malformed = || Error::MalformedGuid(text.to_string());
        let bytes = text.as_bytes();
        if bytes.len() != 36 {
            return Err(malformed());
        }

        let mut raw = [0u8; 16];
        let mut pos = 0;
        for out in raw.iter_mut() {
            if bytes[pos] == b'-' {
                pos += 1;
            }
            if pos + 2 > bytes.len() {
                return Err(malformed());
            }
            let hi = (bytes[pos] as char).to_digit(16).ok_or_else(malformed)?;
            let lo = (bytes[pos + 1] as char).to_digit(16).ok_or_else(malformed)?;
            *out = ((hi << 4) | lo) as u8;
            pos += 2;
        }

        // The string is big-endian throughout; the first three fields are
        // stored little-endian on disk.
        raw.swap(0, 3);
        raw.swap(1, 2);
        raw.swap(4, 5);
        raw.swap(6, 7);
        Ok(Self(raw))
    }

    /// The unique partition GUID for a partition slot: the disk GUID with
    /// the low byte incremented by `slot + 1`, wrapping. Guarantees
    /// per-partition uniqueness without a caller-supplied GUID per slot.
    pub fn for_slot(&self, slot: usize) -> Self {
        let mut bytes = self.0;
        bytes[15] = bytes[15].wrapping_add((slot + 1) as u8);
        Self(bytes)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9], b[10], b[11], b[12], b[13],
            b[14], b[15]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

/// Maps a legacy MBR type byte to the GPT type GUID and, for the EFI system
/// partition, a default display name. Types without a GPT equivalent fall
/// back to the generic basic-data GUID.
pub fn legacy_type_to_gpt(type_byte: u8) -> (Guid, Option<&'static str>) {
    match type_byte {
        0xEF => (Guid::EFI_SYSTEM, Some("EFI System Partition")),
        0x83 => (Guid::LINUX_FS, None),
        0x2E => (Guid::LINUX_FIT, None),
        _ => (Guid::BASIC_DATA, None),
    }
}

/// Symbolic GPT partition types for targets whose type has no legacy MBR
/// equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptPartType {
    ChromeOsKernel,
    SifiveSpl,
    SifiveUboot,
}

impl GptPartType {
    pub fn guid(&self) -> Guid {
        match self {
            Self::ChromeOsKernel => Guid::CHROME_OS_KERNEL,
            Self::SifiveSpl => Guid::SIFIVE_SPL,
            Self::SifiveUboot => Guid::SIFIVE_UBOOT,
        }
    }

    /// Attribute bits mandated by the type. A ChromeOS kernel partition is
    /// only bootable with priority and success set.
    pub fn default_attributes(&self) -> GptAttributes {
        match self {
            Self::ChromeOsKernel => GptAttributes::CROS_PRIORITY_1 | GptAttributes::CROS_SUCCESS,
            Self::SifiveSpl | Self::SifiveUboot => GptAttributes::empty(),
        }
    }
}

impl FromStr for GptPartType {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "cros_kernel" => Ok(Self::ChromeOsKernel),
            "sifiveu_spl" => Ok(Self::SifiveSpl),
            "sifiveu_uboot" => Ok(Self::SifiveUboot),
            _ => Err(Error::UnknownPartitionType(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        let guid = Guid::parse("c12a7328-f81f-11d2-ba4b-00a0c93ec93b").unwrap();
        assert_eq!(guid, Guid::EFI_SYSTEM);
        let guid = Guid::parse("0FC63DAF-8483-4772-8E79-3D69D8477DE4").unwrap();
        assert_eq!(guid, Guid::LINUX_FS);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            Guid::parse("c12a7328-f81f-11d2-ba4b"),
            Err(Error::MalformedGuid(_))
        ));
        assert!(matches!(
            Guid::parse("c12a7328-f81f-11d2-ba4b-00a0c93ec93z"),
            Err(Error::MalformedGuid(_))
        ));
    }

    #[test]
    fn test_display_roundtrip() {
        let text = "fe3a2a5d-4f32-41a7-b725-accc3285a309";
        let guid = Guid::parse(text).unwrap();
        assert_eq!(guid.to_string(), text);
        assert_eq!(guid, Guid::CHROME_OS_KERNEL);
    }

    #[test]
    fn test_for_slot() {
        let guid = Guid::from_fields(0, 0, 0, [0, 0, 0, 0, 0, 0, 0, 0xFE]);
        assert_eq!(guid.for_slot(0).as_bytes()[15], 0xFF);
        // Wraps rather than carrying into the neighboring byte.
        assert_eq!(guid.for_slot(1).as_bytes()[15], 0x00);
        assert_eq!(guid.for_slot(1).as_bytes()[14], 0x00);
    }

    #[test]
    fn test_legacy_type_mapping() {
        assert_eq!(
            legacy_type_to_gpt(0xEF),
            (Guid::EFI_SYSTEM, Some("EFI System Partition"))
        );
        assert_eq!(legacy_type_to_gpt(0x83), (Guid::LINUX_FS, None));
        assert_eq!(legacy_type_to_gpt(0x2E), (Guid::LINUX_FIT, None));
        assert_eq!(legacy_type_to_gpt(0x0C), (Guid::BASIC_DATA, None));
    }

    #[test]
    fn test_symbolic_types() {
        assert_eq!(
            "cros_kernel".parse::<GptPartType>().unwrap(),
            GptPartType::ChromeOsKernel
        );
        assert!(matches!(
            "vendor_blob".parse::<GptPartType>(),
            Err(Error::UnknownPartitionType(_))
        ));
    }
}
