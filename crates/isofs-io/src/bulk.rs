use std::io::{self, Read, Write};

/// Copies `len` bytes from `src` at its current position into `dst` at its
/// current position.
///
/// When both endpoints are backed by the same kind of OS file handle,
/// `std::io::copy` is free to use a zero-copy path (e.g. `copy_file_range`
/// on Linux); otherwise this falls back to a buffered read/write loop.
/// Either way, exactly `len` bytes are transferred.
pub fn copy_bulk<R, W>(src: &mut R, dst: &mut W, len: u64) -> io::Result<()>
where
    R: Read,
    W: Write,
{
    let mut limited = src.take(len);
    let copied = io::copy(&mut limited, dst)?;
    if copied != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "short read while copying extent data",
        ));
    }
    Ok(())
}
