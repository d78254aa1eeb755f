//! Transport bootstrap: plain HTTP or TLS from a directory holding
//! `key.pem` and `cert.pem`.
//!
//! TLS material is read synchronously in [`prepare`], before anything binds,
//! so an unreadable file aborts startup without ever opening the port.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use ng_domain::config::ServerConfig;

pub const KEY_FILE: &str = "key.pem";
pub const CERT_FILE: &str = "cert.pem";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot read TLS file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TLS material: {0}")]
    InvalidTls(String),
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(String),
}

/// Transport chosen at startup.
pub enum Transport {
    Plain,
    Tls(RustlsConfig),
}

impl Transport {
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_tls() {
            "https"
        } else {
            "http"
        }
    }
}

/// Read TLS material when `tls_dir` is configured.
pub async fn prepare(server: &ServerConfig) -> Result<Transport, TransportError> {
    let Some(dir) = server.tls_dir.as_deref() else {
        return Ok(Transport::Plain);
    };
    let (key, cert) = read_tls_material(dir)?;

    // Several crypto backends may be linked in; pick ring explicitly.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = RustlsConfig::from_pem(cert, key)
        .await
        .map_err(|e| TransportError::InvalidTls(e.to_string()))?;
    Ok(Transport::Tls(config))
}

/// Read `key.pem` and `cert.pem` from `dir`, in that order.
pub fn read_tls_material(dir: &Path) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
    let read = |name: &str| {
        let path = dir.join(name);
        std::fs::read(&path).map_err(|source| TransportError::Unreadable { path, source })
    };
    let key = read(KEY_FILE)?;
    let cert = read(CERT_FILE)?;
    Ok((key, cert))
}

/// A listening socket ready to serve.
pub enum BoundServer {
    Plain(TcpListener),
    Tls {
        listener: std::net::TcpListener,
        config: RustlsConfig,
    },
}

/// Bind `addr` for the prepared transport.
pub async fn bind(transport: Transport, addr: &str) -> Result<BoundServer, TransportError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.to_owned(),
            source,
        })?;
    match transport {
        Transport::Plain => Ok(BoundServer::Plain(listener)),
        Transport::Tls(config) => {
            let listener = listener
                .into_std()
                .map_err(|source| TransportError::Bind {
                    addr: addr.to_owned(),
                    source,
                })?;
            Ok(BoundServer::Tls { listener, config })
        }
    }
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        let res = match self {
            BoundServer::Plain(l) => l.local_addr(),
            BoundServer::Tls { listener, .. } => listener.local_addr(),
        };
        res.map_err(|e| TransportError::Serve(e.to_string()))
    }

    /// Serve `app` until `shutdown` is cancelled, then drain in-flight
    /// requests.
    pub async fn serve(self, app: Router, shutdown: CancellationToken) -> Result<(), TransportError> {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        match self {
            BoundServer::Plain(listener) => axum::serve(listener, service)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(|e| TransportError::Serve(e.to_string())),
            BoundServer::Tls { listener, config } => {
                let handle = axum_server::Handle::new();
                let watcher = handle.clone();
                tokio::spawn(async move {
                    shutdown.cancelled().await;
                    watcher.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
                });
                axum_server::from_tcp_rustls(listener, config)
                    .handle(handle)
                    .serve(service)
                    .await
                    .map_err(|e| TransportError::Serve(e.to_string()))
            }
        }
    }
}
