//! Docker Engine client.
//!
//! Talks to the daemon's HTTP API directly. The API version is negotiated
//! once at connect time (the lower of the daemon's version and
//! [`DEFAULT_API_VERSION`]) unless pinned, and every later request is
//! prefixed with `/v<version>`.

mod transport;
mod wire;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use tracing::{debug, info, warn};

use panel_core::{PanelConfig, RuntimeEndpoint};

use crate::RuntimeClient;
use crate::error::{RuntimeError, RuntimeResult};
use crate::object::{ObjectFilter, ObjectRef, ObjectSnapshot, ObjectSpec};

use transport::Transport;
use wire::{
    ContainerSummary, CreateContainerRequest, CreateContainerResponse, ErrorResponse,
    PullProgress, VersionResponse,
};

/// Highest API version this client speaks.
pub const DEFAULT_API_VERSION: &str = "1.43";

/// `RuntimeClient` backed by a Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    transport: Transport,
    api_version: String,
}

impl DockerRuntime {
    /// Connect to the daemon and settle the API version.
    ///
    /// Fails with `RuntimeError::Connection` if the daemon cannot be reached
    /// or no common API version exists.
    pub async fn connect(
        endpoint: RuntimeEndpoint,
        pinned_version: Option<String>,
        timeout: Duration,
    ) -> RuntimeResult<Self> {
        let transport = Transport::new(endpoint, timeout);

        let (status, body) = transport
            .send_collect(Method::GET, "/version", None)
            .await
            .map_err(into_connection_error)?;
        if !status.is_success() {
            return Err(RuntimeError::Connection(format!(
                "{}: version probe returned {status}",
                transport.endpoint()
            )));
        }
        let version: VersionResponse = serde_json::from_slice(&body).map_err(|e| {
            RuntimeError::Connection(format!("unreadable version response: {e}"))
        })?;

        let api_version = match pinned_version {
            Some(pinned) => pinned_api_version(&pinned)?,
            None => negotiate(&version)?,
        };

        info!(
            endpoint = %transport.endpoint(),
            daemon = %version.version,
            api_version = %api_version,
            "connected to docker daemon"
        );

        Ok(Self {
            transport,
            api_version,
        })
    }

    /// Connect using the runtime section of a `PanelConfig`.
    pub async fn from_config(config: &PanelConfig) -> RuntimeResult<Self> {
        let endpoint = config
            .endpoint()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        let timeout = config
            .timeout()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        Self::connect(endpoint, config.runtime.api_version.clone(), timeout).await
    }

    /// The negotiated (or pinned) API version.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn path(&self, path: &str) -> String {
        format!("/v{}{path}", self.api_version)
    }

    async fn list(
        &self,
        filters: serde_json::Value,
        all: bool,
    ) -> RuntimeResult<Vec<ObjectSnapshot>> {
        let path = self.path(&format!(
            "/containers/json?all={all}&filters={}",
            urlencoding::encode(&filters.to_string())
        ));
        let (status, body) = self.transport.send_collect(Method::GET, &path, None).await?;
        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        let summaries: Vec<ContainerSummary> = serde_json::from_slice(&body)
            .map_err(|e| RuntimeError::Other(format!("unreadable container list: {e}")))?;
        Ok(summaries.into_iter().map(ObjectSnapshot::from).collect())
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn fetch_image(&self, reference: &str) -> RuntimeResult<()> {
        let (name, tag) = split_reference(reference);
        let path = self.path(&format!(
            "/images/create?fromImage={}&tag={}",
            urlencoding::encode(name),
            urlencoding::encode(tag)
        ));

        let response = self.transport.send(Method::POST, &path, None).await?;
        let status = response.status();
        let mut body = response.into_body();

        if !status.is_success() {
            let bytes = body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();
            return Err(error_from_response(status, &bytes));
        }

        // Drain the progress stream to the end; the pull is only complete
        // once the daemon closes it.
        let mut stream = ProgressStream::default();
        while let Some(frame) = body.frame().await {
            let frame =
                frame.map_err(|e| RuntimeError::Other(format!("pulling {reference}: {e}")))?;
            if let Ok(data) = frame.into_data() {
                stream.push(&data);
            }
        }

        match stream.finish() {
            Some(failure) => Err(RuntimeError::Other(format!(
                "pulling {reference}: {failure}"
            ))),
            None => {
                debug!(%reference, "image pulled");
                Ok(())
            }
        }
    }

    async fn create_object(&self, spec: &ObjectSpec) -> RuntimeResult<ObjectRef> {
        let body = serde_json::to_vec(&CreateContainerRequest::from_spec(spec))
            .map_err(|e| RuntimeError::Other(format!("encoding create request: {e}")))?;
        let path = self.path(&format!(
            "/containers/create?name={}",
            urlencoding::encode(&spec.name)
        ));

        let (status, bytes) = self
            .transport
            .send_collect(Method::POST, &path, Some(body))
            .await?;
        if !status.is_success() {
            return Err(error_from_response(status, &bytes));
        }

        let created: CreateContainerResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RuntimeError::Other(format!("unreadable create response: {e}")))?;
        let warnings = created.warnings.unwrap_or_default();
        for warning in &warnings {
            warn!(name = %spec.name, %warning, "docker create warning");
        }

        Ok(ObjectRef {
            id: created.id,
            warnings,
        })
    }

    async fn start_object(&self, name: &str) -> RuntimeResult<()> {
        let path = self.path(&format!("/containers/{}/start", urlencoding::encode(name)));
        let (status, bytes) = self.transport.send_collect(Method::POST, &path, None).await?;
        match status {
            // 304: already started.
            StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED => Ok(()),
            s if s.is_success() => Ok(()),
            s => Err(error_from_response(s, &bytes)),
        }
    }

    async fn remove_object(&self, name: &str, force: bool) -> RuntimeResult<()> {
        let path = self.path(&format!(
            "/containers/{}?force={force}",
            urlencoding::encode(name)
        ));
        let (status, bytes) = self
            .transport
            .send_collect(Method::DELETE, &path, None)
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(error_from_response(status, &bytes))
        }
    }

    async fn list_objects(
        &self,
        filter: &ObjectFilter,
        include_non_running: bool,
    ) -> RuntimeResult<Vec<ObjectSnapshot>> {
        self.list(filter_json(filter), include_non_running).await
    }
}

/// Build the `filters` query value for a container list.
fn filter_json(filter: &ObjectFilter) -> serde_json::Value {
    match filter {
        ObjectFilter::Label { key, value } => {
            serde_json::json!({ "label": [format!("{key}={value}")] })
        }
        // The daemon treats name filters as unanchored regexes and may or
        // may not include the leading slash when matching.
        ObjectFilter::Name(name) => {
            serde_json::json!({ "name": [format!("^/?{}$", regex::escape(name))] })
        }
    }
}

/// Split an image reference into the `fromImage` and `tag` pull parameters.
///
/// A reference with neither tag nor digest pulls `latest`.
fn split_reference(reference: &str) -> (&str, &str) {
    if let Some((name, digest)) = reference.split_once('@') {
        return (name, digest);
    }
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&reference[..split], &reference[split + 1..])
        }
        None => (reference, "latest"),
    }
}

fn negotiate(version: &VersionResponse) -> RuntimeResult<String> {
    let server = parse_api_version(&version.api_version).ok_or_else(|| {
        RuntimeError::Connection(format!(
            "daemon reported unparseable API version {:?}",
            version.api_version
        ))
    })?;
    let ours = parse_api_version(DEFAULT_API_VERSION).unwrap_or((1, 0));
    let chosen = server.min(ours);

    if let Some(min) = version
        .min_api_version
        .as_deref()
        .and_then(parse_api_version)
    {
        if chosen < min {
            return Err(RuntimeError::Connection(format!(
                "daemon requires API version >= {}.{}, client supports up to {DEFAULT_API_VERSION}",
                min.0, min.1
            )));
        }
    }

    Ok(format!("{}.{}", chosen.0, chosen.1))
}

/// Normalise a pinned version such as `1.41`, rejecting anything that
/// would not form a valid `/v<version>` path prefix.
fn pinned_api_version(pinned: &str) -> RuntimeResult<String> {
    let (major, minor) = parse_api_version(pinned).ok_or_else(|| {
        RuntimeError::Connection(format!("invalid pinned API version {pinned:?}"))
    })?;
    Ok(format!("{major}.{minor}"))
}

fn parse_api_version(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

fn into_connection_error(err: RuntimeError) -> RuntimeError {
    match err {
        RuntimeError::Connection(_) => err,
        other => RuntimeError::Connection(other.to_string()),
    }
}

/// Map a non-success daemon response onto the runtime error variants.
fn error_from_response(status: StatusCode, body: &Bytes) -> RuntimeError {
    let message = serde_json::from_slice::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

    match status {
        StatusCode::CONFLICT => RuntimeError::Conflict(message),
        StatusCode::NOT_FOUND => RuntimeError::NotFound(message),
        s => RuntimeError::Other(format!("{s}: {message}")),
    }
}

/// Accumulates pull progress, which arrives as newline-delimited JSON split
/// arbitrarily across body frames.
#[derive(Debug, Default)]
struct ProgressStream {
    pending: Vec<u8>,
    failure: Option<String>,
}

impl ProgressStream {
    fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.line(&line);
        }
    }

    fn line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }
        match serde_json::from_slice::<PullProgress>(line) {
            Ok(progress) => {
                if let Some(failure) = progress.failure() {
                    self.failure.get_or_insert(failure);
                } else if let Some(status) = progress.status {
                    debug!(%status, "pull progress");
                }
            }
            Err(e) => debug!(error = %e, "skipping unreadable pull progress line"),
        }
    }

    /// Flush any trailing line and return the first failure seen.
    fn finish(mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        self.line(&rest);
        self.failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(api: &str, min: Option<&str>) -> VersionResponse {
        VersionResponse {
            api_version: api.to_string(),
            min_api_version: min.map(str::to_string),
            version: "24.0.7".to_string(),
        }
    }

    #[test]
    fn split_reference_defaults_to_latest() {
        assert_eq!(split_reference("nginx"), ("nginx", "latest"));
        assert_eq!(split_reference("nginx:1.25"), ("nginx", "1.25"));
        assert_eq!(
            split_reference("localhost:5000/team/app"),
            ("localhost:5000/team/app", "latest")
        );
        assert_eq!(
            split_reference("localhost:5000/team/app:v2"),
            ("localhost:5000/team/app", "v2")
        );
        assert_eq!(
            split_reference("nginx@sha256:abcd"),
            ("nginx", "sha256:abcd")
        );
    }

    #[test]
    fn negotiate_picks_lower_version() {
        assert_eq!(negotiate(&version("1.45", None)).unwrap(), DEFAULT_API_VERSION);
        assert_eq!(negotiate(&version("1.41", Some("1.12"))).unwrap(), "1.41");
    }

    #[test]
    fn negotiate_rejects_too_new_minimum() {
        let result = negotiate(&version("1.50", Some("1.44")));
        assert!(matches!(result, Err(RuntimeError::Connection(_))));
    }

    #[test]
    fn pinned_version_is_validated() {
        assert_eq!(pinned_api_version(" 1.41 ").unwrap(), "1.41");
        assert!(matches!(
            pinned_api_version("garbage"),
            Err(RuntimeError::Connection(_))
        ));
        assert!(matches!(
            pinned_api_version("1.41/../x"),
            Err(RuntimeError::Connection(_))
        ));
    }

    #[test]
    fn negotiate_rejects_garbage() {
        assert!(matches!(
            negotiate(&version("latest", None)),
            Err(RuntimeError::Connection(_))
        ));
    }

    #[test]
    fn error_mapping_by_status() {
        let body =
            Bytes::from_static(br#"{"message":"Conflict. The container name is already in use"}"#);
        assert!(error_from_response(StatusCode::CONFLICT, &body).is_conflict());
        assert!(error_from_response(StatusCode::NOT_FOUND, &body).is_not_found());

        let other = error_from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &Bytes::from_static(b"boom\n"),
        );
        assert_eq!(other, RuntimeError::Other("500 Internal Server Error: boom".to_string()));
    }

    #[test]
    fn label_filter_query() {
        let json = filter_json(&ObjectFilter::label("manager", "testScheduler"));
        assert_eq!(json.to_string(), r#"{"label":["manager=testScheduler"]}"#);
    }

    #[test]
    fn name_filter_is_anchored_and_escaped() {
        let json = filter_json(&ObjectFilter::Name("web.v2".to_string()));
        assert_eq!(json["name"][0], r"^/?web\.v2$");
    }

    #[test]
    fn progress_stream_handles_split_frames() {
        let mut stream = ProgressStream::default();
        stream.push(br#"{"status":"Pulling from library/nginx"}"#);
        stream.push(b"\r\n{\"status\":\"Downlo");
        stream.push(b"ading\"}\r\n");
        assert!(stream.pending.is_empty());
        assert_eq!(stream.finish(), None);
    }

    #[test]
    fn progress_stream_reports_first_error() {
        let mut stream = ProgressStream::default();
        stream.push(b"{\"status\":\"Pulling\"}\n{\"error\":\"pull access denied\"}\n");
        stream.push(b"{\"error\":\"second\"}");
        assert_eq!(stream.finish().as_deref(), Some("pull access denied"));
    }

    #[tokio::test]
    async fn connect_fails_when_daemon_is_absent() {
        let result = DockerRuntime::connect(
            RuntimeEndpoint::Unix("/nonexistent/docker.sock".into()),
            None,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(RuntimeError::Connection(_))));
    }
}
