use modelbrowser_proto::protocol::{split_frame, Event, Message, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct DaemonConnection {
    stream: TcpStream,
    read_buffer: Vec<u8>,
}

impl DaemonConnection {
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(4096),
        })
    }

    pub async fn send(&mut self, request: Request) -> anyhow::Result<()> {
        let encoded = Message::Request(request).encode()?;
        self.stream.write_all(&encoded).await?;
        Ok(())
    }

    /// Wait for the next event. `None` once the daemon hangs up.
    pub async fn next_event(&mut self) -> anyhow::Result<Option<Event>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some((payload, consumed)) = split_frame(&self.read_buffer)? {
                let decoded = Message::decode_payload(payload);
                self.read_buffer.drain(..consumed);
                match decoded? {
                    Message::Event(event) => return Ok(Some(event)),
                    Message::Request(request) => {
                        anyhow::bail!("daemon sent a request: {:?}", request)
                    }
                }
            }

            match self.stream.read(&mut buf).await {
                Ok(0) => return Ok(None),
                Ok(n) => self.read_buffer.extend_from_slice(&buf[..n]),
                Err(e) => return Err(anyhow::anyhow!("Read error: {}", e)),
            }
        }
    }
}
