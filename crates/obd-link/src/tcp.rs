//! WiFi adapters over raw TCP

use crate::stream::StreamLink;
use async_trait::async_trait;
use obd_protocol::{Device, Link, LinkKind, ObdError, Radio, Result, Target};
use tokio::net::TcpStream;
use tracing::info;

/// WiFi adapters cannot be discovered; they are added by address.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpRadio;

#[async_trait]
impl Radio for TcpRadio {
    fn kind(&self) -> LinkKind {
        LinkKind::Wifi
    }

    async fn scan(&self) -> Result<Vec<Device>> {
        Ok(Vec::new())
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn Link>> {
        let Target::Wifi { ip, port } = target else {
            return Err(ObdError::InvalidAddress(format!(
                "{} is not a WiFi address",
                target
            )));
        };

        info!("Opening TCP connection to {}", target);
        let stream = TcpStream::connect((*ip, *port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(StreamLink::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::ObdClient;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_fragmented_response_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"010D\r");
            socket.write_all(b"41 0D").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(b" 3C\r\r>").await.unwrap();
        });

        let device = Device::wifi(LinkKind::Wifi, "127.0.0.1", port).unwrap();
        let link = TcpRadio.open(&device.target).await.unwrap();
        let client = ObdClient::from_link(link, &device, Duration::from_secs(5));

        assert_eq!(client.send_command("010D").await.unwrap(), "41 0D 3C");
        server.await.unwrap();
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = Target::wifi("127.0.0.1", port).unwrap();
        assert!(TcpRadio.open(&target).await.is_err());
    }
}
