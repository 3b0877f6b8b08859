use std::io;

/// Reads a value back from the bytes of a single frame.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
