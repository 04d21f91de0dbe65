//! Fixed-width UTF-16LE partition name fields.

use crate::endian::U16Le;

/// A zero-padded UTF-16LE string field of `N` code units, as embedded in a
/// GPT partition entry.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct FixedUtf16Name<const N: usize> {
    units: [U16Le; N],
}

unsafe impl<const N: usize> bytemuck::Pod for FixedUtf16Name<N> {}
unsafe impl<const N: usize> bytemuck::Zeroable for FixedUtf16Name<N> {}

impl<const N: usize> Default for FixedUtf16Name<N> {
    fn default() -> Self {
        Self {
            units: [U16Le::new(0); N],
        }
    }
}

impl<const N: usize> FixedUtf16Name<N> {
    /// Encodes a UTF-8 label into the field, walking the input bytewise.
    ///
    /// One-, two-, and three-byte sequences (the Basic Multilingual Plane)
    /// each encode as one UTF-16 unit. Any other byte substitutes `'?'` and
    /// advances a single source byte, so a four-byte code point degrades to
    /// four `'?'` units (lossy, not fatal). Encoding stops at `N` units or at
    /// the end of the input, whichever comes first; overflowing text is
    /// silently truncated. The remainder of the field is zero-padded.
    pub fn encode(text: &str) -> Self {
        let mut field = Self::default();
        let bytes = text.as_bytes();
        let mut pos = 0;
        for unit in field.units.iter_mut() {
            if pos >= bytes.len() {
                break;
            }
            let lead = bytes[pos];
            let (value, width) = if lead < 0x80 {
                (lead as u16, 1)
            } else if lead & 0xE0 == 0xC0 && pos + 1 < bytes.len() {
                (
                    ((lead & 0x1F) as u16) << 6 | (bytes[pos + 1] & 0x3F) as u16,
                    2,
                )
            } else if lead & 0xF0 == 0xE0 && pos + 2 < bytes.len() {
                (
                    ((lead & 0x0F) as u16) << 12
                        | ((bytes[pos + 1] & 0x3F) as u16) << 6
                        | (bytes[pos + 2] & 0x3F) as u16,
                    3,
                )
            } else {
                (b'?' as u16, 1)
            };
            unit.set(value);
            pos += width;
        }
        field
    }

    /// Decodes the field back into a string, stopping at the first NUL unit.
    pub fn decode(&self) -> String {
        let units: Vec<u16> = self
            .units
            .iter()
            .map(U16Le::get)
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }
}

impl<const N: usize> core::fmt::Debug for FixedUtf16Name<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.decode())
    }
}
