use std::io;

use comms::{OnoReceiver, OnoSender, Raw};
use tokio::io::{AsyncRead, AsyncWrite};

/// The "send bytes, receive bytes" boundary to the coordinating server.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Sends one request envelope and waits for the matching reply.
    ///
    /// # Arguments
    /// * `request` - An encoded request envelope.
    ///
    /// # Returns
    /// The encoded reply, or an `io::Error` if the exchange could not complete.
    async fn exchange(&mut self, request: &[u8]) -> io::Result<Vec<u8>>;
}

/// A `Transport` over a framed `comms` channel, one frame per envelope.
pub struct Framed<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
    rx_buf: Vec<u8>,
}

impl<R, W> Framed<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(rx: OnoReceiver<R>, tx: OnoSender<W>) -> Self {
        Self {
            rx,
            tx,
            rx_buf: Vec::new(),
        }
    }
}

impl<R, W> Transport for Framed<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn exchange(&mut self, request: &[u8]) -> io::Result<Vec<u8>> {
        self.tx.send(&Raw(request)).await?;
        let Raw(reply) = self.rx.recv_into(&mut self.rx_buf).await?;
        Ok(reply.to_vec())
    }
}
