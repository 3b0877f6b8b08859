use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{DEFAULT_MAX_FRAME_LEN, Deserialize, LEN_TYPE_SIZE, LenType};

/// The receiving end handle of the communication.
pub struct OnoReceiver<R: AsyncRead + Unpin> {
    rx: R,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> OnoReceiver<R> {
    /// Creates a new `OnoReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Limits the size of the frames this receiver accepts.
    ///
    /// # Arguments
    /// * `max_frame_len` - The largest frame, in bytes, that will be read.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Waits to receive a new message from the inner receiver.
    ///
    /// # Arguments
    /// * `buf` - The buffer to use for deserialization, the returned
    ///           `T`'s lifetimes will be tied to this buffer.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure. A frame
    /// announcing more than the configured maximum is rejected before reading its body.
    pub async fn recv_into<'buf, T>(&mut self, buf: &'buf mut Vec<u8>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
    {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        let len = LenType::from_be_bytes(size_buf);

        let len = match usize::try_from(len) {
            Ok(len) if len <= self.max_frame_len => len,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "frame of {len} bytes exceeds the limit of {} bytes",
                        self.max_frame_len
                    ),
                ));
            }
        };

        buf.clear();
        buf.resize(len, 0);
        self.rx.read_exact(buf).await?;

        T::deserialize(buf)
    }
}
