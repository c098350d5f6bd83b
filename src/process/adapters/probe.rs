//! TCP and HTTP readiness probes.

use crate::process::{
    domain::HealthCheck,
    ports::{HealthProbe, ProbeError},
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_RESPONSE_BYTES: u64 = 16 * 1024;

/// Builds the probe matching a health check definition.
#[must_use]
pub fn probe_for(check: &HealthCheck) -> Arc<dyn HealthProbe> {
    match check {
        HealthCheck::Tcp { address } => Arc::new(TcpConnectProbe::new(address.clone())),
        HealthCheck::Http { address, path } => {
            Arc::new(HttpStatusProbe::new(address.clone(), path.clone()))
        }
    }
}

/// Ready once a TCP connection can be opened.
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    address: String,
}

impl TcpConnectProbe {
    /// Creates a probe for `address` (`host:port`).
    #[must_use]
    pub const fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl HealthProbe for TcpConnectProbe {
    async fn check(&self) -> Result<bool, ProbeError> {
        connect(&self.address).await.map(|_| true)
    }
}

/// Ready once `GET path` answers `200`.
///
/// A `503` whose body mentions a quorum is reported as a quorum wait.
#[derive(Debug, Clone)]
pub struct HttpStatusProbe {
    address: String,
    path: String,
}

impl HttpStatusProbe {
    /// Creates a probe for `path` on `address` (`host:port`).
    #[must_use]
    pub const fn new(address: String, path: String) -> Self {
        Self { address, path }
    }

    async fn fetch(&self) -> Result<String, ProbeError> {
        let mut stream = connect(&self.address).await?;
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.path, self.address
        );
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(classify_io)?;

        let mut body = Vec::new();
        let read = tokio::time::timeout(
            PROBE_TIMEOUT,
            (&mut stream).take(MAX_RESPONSE_BYTES).read_to_end(&mut body),
        )
        .await;
        match read {
            Ok(Ok(_)) => Ok(String::from_utf8_lossy(&body).into_owned()),
            Ok(Err(err)) => Err(classify_io(err)),
            Err(_) => Err(ProbeError::Connectivity(format!(
                "no response from {} within {PROBE_TIMEOUT:?}",
                self.address
            ))),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpStatusProbe {
    async fn check(&self) -> Result<bool, ProbeError> {
        let response = self.fetch().await?;
        interpret_response(&response)
    }
}

async fn connect(address: &str) -> Result<TcpStream, ProbeError> {
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(classify_io(err)),
        Err(_) => Err(ProbeError::Connectivity(format!(
            "connecting to {address} timed out"
        ))),
    }
}

fn classify_io(err: std::io::Error) -> ProbeError {
    match err.kind() {
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe
        | ErrorKind::TimedOut
        | ErrorKind::UnexpectedEof => ProbeError::Connectivity(err.to_string()),
        _ => ProbeError::unexpected(err),
    }
}

fn parse_status(response: &str) -> Option<u16> {
    let status_line = response.lines().next()?;
    let mut parts = status_line.split_whitespace();
    let protocol = parts.next()?;
    if !protocol.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

fn interpret_response(response: &str) -> Result<bool, ProbeError> {
    let Some(status) = parse_status(response) else {
        return Err(ProbeError::unexpected(std::io::Error::other(
            "malformed HTTP status line",
        )));
    };
    match status {
        200 => Ok(true),
        503 if response.to_ascii_lowercase().contains("quorum") => Err(
            ProbeError::AwaitingQuorum(format!("health endpoint answered {status}")),
        ),
        _ => Ok(false),
    }
}
