//! HTTP/1 transport to the Docker daemon.
//!
//! Opens a fresh connection per request over a Unix socket or TCP and drives
//! it with hyper's low-level client handshake.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tracing::debug;

use panel_core::RuntimeEndpoint;

use crate::error::{RuntimeError, RuntimeResult};

/// Host header sent over Unix sockets, where there is no real authority.
const UNIX_HOST: &str = "docker";
const USER_AGENT: &str = concat!("controlpanel/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub(crate) struct Transport {
    endpoint: RuntimeEndpoint,
    timeout: Duration,
}

impl Transport {
    pub(crate) fn new(endpoint: RuntimeEndpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub(crate) fn endpoint(&self) -> &RuntimeEndpoint {
        &self.endpoint
    }

    /// Send a request and return once response headers arrive.
    ///
    /// The timeout covers connecting and waiting for headers, not reading
    /// the body, so long-running streams (image pulls) are not cut short.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> RuntimeResult<Response<Incoming>> {
        let request = self.build_request(method.clone(), path, body)?;

        let result = tokio::time::timeout(self.timeout, async {
            let mut sender = self.connect().await?;
            sender
                .send_request(request)
                .await
                .map_err(|e| RuntimeError::Other(format!("{method} {path}: {e}")))
        })
        .await;

        match result {
            Ok(response) => {
                let response = response?;
                debug!(%method, %path, status = %response.status(), "runtime request");
                Ok(response)
            }
            Err(_) => Err(RuntimeError::Other(format!(
                "{method} {path}: timed out after {:?}",
                self.timeout
            ))),
        }
    }

    /// Send a request and collect the whole response body.
    pub(crate) async fn send_collect(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> RuntimeResult<(StatusCode, Bytes)> {
        let response = self.send(method, path, body).await?;
        let status = response.status();
        let bytes = tokio::time::timeout(self.timeout, response.into_body().collect())
            .await
            .map_err(|_| RuntimeError::Other(format!("{path}: timed out reading response")))?
            .map_err(|e| RuntimeError::Other(format!("{path}: {e}")))?
            .to_bytes();
        Ok((status, bytes))
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> RuntimeResult<Request<Full<Bytes>>> {
        let host = match &self.endpoint {
            RuntimeEndpoint::Unix(_) => UNIX_HOST,
            RuntimeEndpoint::Tcp(authority) => authority.as_str(),
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, host)
            .header(header::USER_AGENT, USER_AGENT);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }

        builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| RuntimeError::Other(format!("invalid request {path}: {e}")))
    }

    async fn connect(&self) -> RuntimeResult<http1::SendRequest<Full<Bytes>>> {
        match &self.endpoint {
            RuntimeEndpoint::Tcp(authority) => {
                let stream = tokio::net::TcpStream::connect(authority.as_str())
                    .await
                    .map_err(|e| RuntimeError::Connection(format!("{}: {e}", self.endpoint)))?;
                handshake(TokioIo::new(stream)).await
            }
            #[cfg(unix)]
            RuntimeEndpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| RuntimeError::Connection(format!("{}: {e}", self.endpoint)))?;
                handshake(TokioIo::new(stream)).await
            }
            #[cfg(not(unix))]
            RuntimeEndpoint::Unix(_) => Err(RuntimeError::Connection(format!(
                "{}: unix sockets are not supported on this platform",
                self.endpoint
            ))),
        }
    }
}

async fn handshake<T>(io: T) -> RuntimeResult<http1::SendRequest<Full<Bytes>>>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(io)
        .await
        .map_err(|e| RuntimeError::Connection(format!("handshake failed: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "runtime connection closed with error");
        }
    });

    Ok(sender)
}
