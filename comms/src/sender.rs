use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{DEFAULT_MAX_FRAME_LEN, LEN_TYPE_SIZE, LenType, Serialize};

/// The sending end handle of the communication.
///
/// Every message goes out as one frame: a big-endian length header followed by the
/// encoded envelope.
pub struct OnoSender<W: AsyncWrite + Unpin> {
    tx: W,
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    /// Creates a new `OnoSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(LEN_TYPE_SIZE),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Limits the size of the frames this sender writes, so a peer with the same limit
    /// never sees a frame it would reject.
    ///
    /// # Arguments
    /// * `max_frame_len` - The largest frame body, in bytes.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Sends `msg` as a single frame.
    ///
    /// # Arguments
    /// * `msg` - A serializable envelope.
    ///
    /// # Returns
    /// An `io::Error` with kind `InvalidInput` if the encoded envelope exceeds the frame
    /// limit, in which case nothing is written, or the writer's own error.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self {
            tx,
            buf,
            max_frame_len,
        } = self;

        buf.clear();
        buf.extend_from_slice(&[0; LEN_TYPE_SIZE]);

        let tail = msg.serialize(buf).unwrap_or_default();
        let body_len = buf.len() - LEN_TYPE_SIZE + tail.len();

        if body_len > *max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {body_len} bytes exceeds the limit of {max_frame_len} bytes"),
            ));
        }

        buf[..LEN_TYPE_SIZE].copy_from_slice(&(body_len as LenType).to_be_bytes());
        tx.write_all(buf).await?;
        tx.write_all(tail).await?;
        tx.flush().await
    }
}
