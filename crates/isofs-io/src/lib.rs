//! isofs IO
//!
//! This provides the std::io implementations for no-std environments.
//! For use with std, the standard library types are re-exported.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;
#[cfg(feature = "std")]
pub use std::io::{Cursor, Error, ErrorKind, Read, Result, Seek, SeekFrom, Write};

#[cfg(not(feature = "std"))]
mod error;
#[cfg(not(feature = "std"))]
pub use error::{Error, ErrorKind, Result};

#[cfg(not(feature = "std"))]
mod traits;
#[cfg(not(feature = "std"))]
pub use traits::{Cursor, Read, Seek, SeekFrom, Write};

#[cfg(feature = "std")]
mod bulk;
#[cfg(feature = "std")]
pub use bulk::copy_bulk;
