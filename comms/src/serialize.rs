/// Writes a value into a frame.
///
/// Implementors either append their encoding to `buf` and return `None`, or return a
/// borrowed slice that is written after `buf` without copying it.
pub trait Serialize<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
