use std::net::SocketAddr;

use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    // Listen address
    pub listen_addr: SocketAddr,
    // Host name for generating stream URLs
    pub hostname: Url,
    // log level for http tracing
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, log_level: tracing::Level) -> Result<Self, ConfigError> {
        let hostname = Url::parse(&format!("http://localhost:{}", listen_addr.port()))?;
        tracing::info!("Creating HTTP server Config: listen_addr={}", listen_addr);
        Ok(Self {
            listen_addr,
            hostname,
            log_level,
        })
    }

    /// Absolute URL a player can stream `file_id` from
    pub fn stream_url(&self, file_id: &str) -> Result<Url, ConfigError> {
        Ok(self.hostname.join(&format!("stream/{}", file_id))?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        let config = Config::new("0.0.0.0:8080".parse().unwrap(), tracing::Level::INFO).unwrap();
        assert_eq!(
            config.stream_url("abcd").unwrap().as_str(),
            "http://localhost:8080/stream/abcd"
        );
    }
}
