use crate::core::errors::{ExchangeError, Stage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_native_tls::TlsStream;
use tracing::{debug, instrument};

/// Resolve `host:port` to every candidate socket address
#[instrument(skip(deadline))]
pub async fn resolve(
    host: &str,
    port: u16,
    deadline: Duration,
) -> Result<Vec<SocketAddr>, ExchangeError> {
    let addrs = timeout(deadline, lookup_host((host, port)))
        .await
        .map_err(|_| ExchangeError::Timeout(Stage::Resolve))?
        .map_err(|e| ExchangeError::ResolveError {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect::<Vec<_>>();

    if addrs.is_empty() {
        return Err(ExchangeError::ResolveError {
            host: host.to_string(),
            reason: "no addresses returned".to_string(),
        });
    }
    debug!(count = addrs.len(), "Resolved host");
    Ok(addrs)
}

/// Connect to the first reachable address; the deadline covers all attempts
pub async fn connect(addrs: &[SocketAddr], deadline: Duration) -> Result<TcpStream, ExchangeError> {
    let attempt = async {
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "TCP connect attempt failed");
                    last_error = Some(format!("{}: {}", addr, e));
                }
            }
        }
        Err(ExchangeError::ConnectError(
            last_error.unwrap_or_else(|| "no addresses to connect to".to_string()),
        ))
    };

    timeout(deadline, attempt)
        .await
        .map_err(|_| ExchangeError::Timeout(Stage::Connect))?
}

/// Perform a client TLS handshake with SNI set to `host`
pub async fn tls_handshake(
    host: &str,
    stream: TcpStream,
    deadline: Duration,
) -> Result<TlsStream<TcpStream>, ExchangeError> {
    let connector = native_tls::TlsConnector::builder()
        .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
        .build()
        .map_err(|e| ExchangeError::TlsError(format!("Failed to build TLS connector: {}", e)))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    timeout(deadline, connector.connect(host, stream))
        .await
        .map_err(|_| ExchangeError::Timeout(Stage::TlsHandshake))?
        .map_err(|e| ExchangeError::TlsError(format!("{}: {}", host, e)))
}
