//! Byte-stream links (serial ports, TCP sockets)

use async_trait::async_trait;
use obd_protocol::{Link, ObdError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

const READ_CHUNK: usize = 256;

/// [`Link`] over any async byte stream
pub struct StreamLink<S> {
    stream: S,
    buf: [u8; READ_CHUNK],
}

impl<S> StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: [0; READ_CHUNK],
        }
    }
}

#[async_trait]
impl<S> Link for StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        let n = self.stream.read(&mut self.buf).await?;
        if n == 0 {
            return Err(ObdError::TransportClosed);
        }
        trace!("read {} bytes", n);
        Ok(self.buf[..n].to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_over_duplex() {
        let (near, mut far) = tokio::io::duplex(64);
        let mut link = StreamLink::new(near);

        link.write(b"ATZ\r").await.unwrap();
        let mut got = [0u8; 4];
        far.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"ATZ\r");

        far.write_all(b"OK\r\r>").await.unwrap();
        assert_eq!(link.read().await.unwrap(), b"OK\r\r>");
    }

    #[tokio::test]
    async fn test_eof_is_transport_closed() {
        let (near, far) = tokio::io::duplex(64);
        let mut link = StreamLink::new(near);
        drop(far);
        assert_eq!(link.read().await, Err(ObdError::TransportClosed));
    }
}
