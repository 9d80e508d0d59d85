use std::fmt;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use url::Url;

use super::ChannelError;

/// Default SOCKS5 port when the proxy url leaves it out
pub const DEFAULT_PROXY_PORT: u16 = 1080;

/// Any reliable byte stream a [`SecureChannel`](super::SecureChannel) can run over
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedTransport = Box<dyn Transport>;

/// A SOCKS5 proxy, parsed from `socks5://host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl FromStr for ProxyConfig {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s)
            .map_err(|e| ChannelError::Connection(format!("invalid proxy url {}: {}", s, e)))?;
        match url.scheme() {
            "socks5" | "socks5h" => {}
            other => {
                return Err(ChannelError::Connection(format!(
                    "unsupported proxy scheme {}",
                    other
                )))
            }
        }
        let host = url
            .host_str()
            .ok_or_else(|| ChannelError::Connection(format!("proxy url {} has no host", s)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PROXY_PORT),
        })
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socks5://{}:{}", self.host, self.port)
    }
}

fn split_host_port(address: &str) -> Result<(&str, u16), ChannelError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| ChannelError::Connection(format!("address {} has no port", address)))?;
    let port = port
        .parse()
        .map_err(|_| ChannelError::Connection(format!("address {} has an invalid port", address)))?;
    Ok((host.trim_start_matches('[').trim_end_matches(']'), port))
}

/// Open a TCP connection to `peer` (`host:port`), optionally through a proxy
///
/// Through a proxy the target host is handed to the proxy unresolved, so
/// hostnames are looked up on the far side.
pub async fn connect(
    peer: &str,
    proxy: Option<&ProxyConfig>,
) -> Result<BoxedTransport, ChannelError> {
    let (host, port) = split_host_port(peer)?;
    match proxy {
        None => {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| ChannelError::Connection(format!("{}: {}", peer, e)))?;
            stream.set_nodelay(true)?;
            tracing::debug!("connect: connected to {}", peer);
            Ok(Box::new(stream))
        }
        Some(proxy) => {
            let proxy_addr = tokio::net::lookup_host((proxy.host.as_str(), proxy.port))
                .await
                .map_err(|e| ChannelError::Connection(format!("proxy {}: {}", proxy, e)))?
                .next()
                .ok_or_else(|| {
                    ChannelError::Connection(format!("proxy {} did not resolve", proxy))
                })?;
            let stream = Socks5Stream::connect(proxy_addr, (host, port))
                .await
                .map_err(|e| {
                    ChannelError::Connection(format!("{} via {}: {}", peer, proxy, e))
                })?;
            tracing::debug!("connect: connected to {} via {}", peer, proxy);
            Ok(Box::new(stream))
        }
    }
}
