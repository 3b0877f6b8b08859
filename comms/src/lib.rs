//! Wire layer between a federated learning participant and its coordinating server:
//! the "get model" envelopes and the length prefixed channel that carries them.

mod deserialize;
pub mod msg;
mod receiver;
mod sender;
mod serialize;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use msg::{FeatureMap, Raw, RequestGetModel, ResponseCode, ResponseGetModel};
pub use receiver::OnoReceiver;
pub use sender::OnoSender;
pub use serialize::Serialize;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Upper bound for a single frame body unless overridden on either end.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Wraps a reader and a writer, typically the halves of one connection, into a framed
/// channel.
///
/// # Arguments
/// * `rx` - Where inbound frames are read from.
/// * `tx` - Where outbound frames are written to.
///
/// # Returns
/// The receiving and sending ends, both limited to `DEFAULT_MAX_FRAME_LEN`.
pub fn channel<R, W>(rx: R, tx: W) -> (OnoReceiver<R>, OnoSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (OnoReceiver::new(rx), OnoSender::new(tx))
}

/// Encodes `msg` into a standalone buffer, without any framing.
///
/// # Arguments
/// * `msg` - A serializable object.
///
/// # Returns
/// The bytes `msg` would occupy inside a frame.
pub fn to_vec<'a, T: Serialize<'a>>(msg: &'a T) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(data) = msg.serialize(&mut buf) {
        buf.extend_from_slice(data);
    }

    buf
}
