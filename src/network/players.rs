use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Result of a server-list query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerCount {
    pub online: u32,
    pub max: u32,
    pub version: String,
    pub motd: String,
}

/// Asks a running server how many players are connected.
#[async_trait]
pub trait PlayerCounter: Send + Sync {
    async fn query(&self, port: u16) -> Result<PlayerCount>;
}

/// Server-list ping in the pre-netty format every server still answers.
///
/// The client sends `0xFE 0x01`; the server replies with a kick packet
/// (`0xFF`, a big-endian character count, then UTF-16BE text). Since 1.4 the
/// text is `§1\0<protocol>\0<version>\0<motd>\0<online>\0<max>`; older servers
/// answer `<motd>§<online>§<max>`.
#[derive(Debug, Clone)]
pub struct LegacyPing {
    host: IpAddr,
}

impl LegacyPing {
    /// Queries servers on the loopback interface.
    pub fn new() -> Self {
        Self::with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    pub fn with_host(host: IpAddr) -> Self {
        Self { host }
    }
}

impl Default for LegacyPing {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlayerCounter for LegacyPing {
    async fn query(&self, port: u16) -> Result<PlayerCount> {
        let mut stream = TcpStream::connect(SocketAddr::new(self.host, port)).await?;
        stream.write_all(&[0xFE, 0x01]).await?;
        stream.flush().await?;

        let packet_id = stream.read_u8().await?;
        if packet_id != 0xFF {
            return Err(Error::Other(format!(
                "Unexpected ping reply packet 0x{:02X}",
                packet_id
            )));
        }
        let chars = stream.read_u16().await? as usize;
        let mut raw = vec![0u8; chars * 2];
        stream.read_exact(&mut raw).await?;

        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let text = String::from_utf16_lossy(&units);
        parse_reply(&text)
    }
}

/// Parses the text of a legacy ping reply.
pub fn parse_reply(text: &str) -> Result<PlayerCount> {
    let malformed = || Error::Other(format!("Malformed ping reply: {:?}", text));

    if let Some(rest) = text.strip_prefix("§1\0") {
        let fields: Vec<&str> = rest.split('\0').collect();
        if fields.len() < 5 {
            return Err(malformed());
        }
        return Ok(PlayerCount {
            version: fields[1].to_string(),
            motd: fields[2].to_string(),
            online: fields[3].trim().parse().map_err(|_| malformed())?,
            max: fields[4].trim().parse().map_err(|_| malformed())?,
        });
    }

    let mut fields = text.rsplitn(3, '§');
    let max = fields.next().ok_or_else(malformed)?;
    let online = fields.next().ok_or_else(malformed)?;
    let motd = fields.next().ok_or_else(malformed)?;
    Ok(PlayerCount {
        online: online.trim().parse().map_err(|_| malformed())?,
        max: max.trim().parse().map_err(|_| malformed())?,
        version: String::new(),
        motd: motd.to_string(),
    })
}
