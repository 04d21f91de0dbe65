//! Cylinder/head/sector addressing for legacy MBR partition entries.

/// Disk geometry used for CHS conversion.
///
/// Legacy mode takes the geometry from the caller; GPT mode fixes it at
/// 254 heads and 63 sectors per track for the protective and hybrid entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub heads: u32,
    pub sectors: u32,
}

impl Geometry {
    pub const GPT_PROTECTIVE: Self = Self {
        heads: 254,
        sectors: 63,
    };

    /// Sectors per cylinder.
    pub const fn cylinder_size(&self) -> u64 {
        (self.heads * self.sectors) as u64
    }
}

/// The packed 3-byte CHS field of an MBR partition entry.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Chs([u8; 3]);

impl Chs {
    /// Converts an LBA into the packed CHS form:
    /// `sector = lba % spt + 1`, `head = (lba / spt) % heads`,
    /// `cylinder = lba / (spt * heads)`, with the two high cylinder bits
    /// folded into bits 6-7 of the sector byte.
    pub fn from_lba(lba: u64, geometry: Geometry) -> Self {
        let spt = geometry.sectors as u64;
        let sector = (lba % spt) + 1;
        let rest = lba / spt;
        let head = rest % geometry.heads as u64;
        let cylinder = rest / geometry.heads as u64;

        Self([
            head as u8,
            (sector as u8) | (((cylinder >> 2) & 0xC0) as u8),
            (cylinder & 0xFF) as u8,
        ])
    }

    pub fn head(&self) -> u8 {
        self.0[0]
    }

    pub fn sector(&self) -> u8 {
        self.0[1] & 0x3F
    }

    pub fn cylinder(&self) -> u16 {
        ((self.0[1] as u16 & 0xC0) << 2) | self.0[2] as u16
    }

    /// The inverse of [`Chs::from_lba`], valid within the 10-bit cylinder
    /// range the packed form can address.
    pub fn to_lba(&self, geometry: Geometry) -> u64 {
        self.cylinder() as u64 * geometry.cylinder_size()
            + self.head() as u64 * geometry.sectors as u64
            + self.sector() as u64
            - 1
    }
}

impl core::fmt::Debug for Chs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Chs")
            .field("c", &self.cylinder())
            .field("h", &self.head())
            .field("s", &self.sector())
            .finish()
    }
}
