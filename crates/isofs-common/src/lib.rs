//! Endianness-aware primitive types shared across the disc-image codec layer.
pub mod endian;
pub mod number;

pub use endian::{BigEndian, Endian, Endianness, LittleEndian, NativeEndian};
pub use number::{U16, U32, U64};
