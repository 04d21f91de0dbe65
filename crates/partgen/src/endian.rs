//! Byte-array backed little-endian integer fields.
//!
//! On-disk partition structures are little-endian regardless of the host, so
//! every multi-byte field in a serialized record is stored as raw bytes and
//! converted on access. The types have alignment 1, which keeps the `repr(C)`
//! records they appear in free of padding.

/// A 16-bit unsigned integer stored as little-endian bytes.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct U16Le([u8; 2]);

/// A 32-bit unsigned integer stored as little-endian bytes.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct U32Le([u8; 4]);

/// A 64-bit unsigned integer stored as little-endian bytes.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct U64Le([u8; 8]);

macro_rules! impl_le_int {
    ($name:ident, $prim:ty, $width:expr) => {
        impl $name {
            pub const fn new(value: $prim) -> Self {
                Self(value.to_le_bytes())
            }

            pub const fn get(&self) -> $prim {
                <$prim>::from_le_bytes(self.0)
            }

            pub fn set(&mut self, value: $prim) {
                self.0 = value.to_le_bytes();
            }
        }

        impl From<$prim> for $name {
            fn from(value: $prim) -> Self {
                Self::new(value)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.get()).finish()
            }
        }

        impl core::fmt::LowerHex for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{:#0width$x}", self.get(), width = $width * 2 + 2)
            }
        }
    };
}

impl_le_int!(U16Le, u16, 2);
impl_le_int!(U32Le, u32, 4);
impl_le_int!(U64Le, u64, 8);
