// proxy.rs — The CONNECT proxy and in-tunnel HTTP handler.
//
// Accept → parse CONNECT → host allowlist → TLS-terminate with a per-host
// leaf → HTTP/1.1 request loop inside the tunnel. Each request is checked
// (endpoint allowlist, encoding, fake key), optionally rewritten, then
// forwarded upstream with the real credential and relayed back with a
// recomputed Content-Length.
//
// The tunnel side is HTTP/1.1 with explicit Content-Length only; chunked
// transfer and compressed *request* bodies are rejected 415 because the
// rewriter could not see inside them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpListener, UnixListener};
use tokio_rustls::TlsAcceptor;

use crate::ca::CertificateAuthority;
use crate::endpoints::{FakeKeys, KeyInjection, ProviderEndpoints};
use crate::error::EgressError;

const MAX_HEADER_LINES: usize = 100;
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Egress proxy configuration: the provider registry plus both key sets.
pub struct EgressConfig {
    pub providers: Vec<ProviderEndpoints>,
    /// provider name → real credential.
    pub real_keys: HashMap<String, String>,
    /// provider name → sentinel the container holds.
    pub fake_keys: FakeKeys,
}

/// The TLS-terminating egress proxy.
pub struct EgressProxy {
    ca: Arc<CertificateAuthority>,
    config: Arc<EgressConfig>,
    client: reqwest::Client,
}

/// One parsed in-tunnel request.
struct TunnelRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TunnelRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One response to write back into the tunnel.
struct TunnelResponse {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TunnelResponse {
    fn refusal(status: u16, reason: &str, message: &str) -> Self {
        let body = serde_json::json!({"error": {"type": "egress_policy", "message": message}})
            .to_string()
            .into_bytes();
        Self {
            status,
            reason: reason.to_string(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
        }
    }
}

impl EgressProxy {
    pub fn new(ca: CertificateAuthority, config: EgressConfig) -> Result<Self, EgressError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| EgressError::BadRequest(e.to_string()))?;
        Ok(Self {
            ca: Arc::new(ca),
            config: Arc::new(config),
            client,
        })
    }

    pub fn ca(&self) -> &CertificateAuthority {
        &self.ca
    }

    /// Accept loop on loopback TCP.
    pub async fn run_tcp(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), EgressError> {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    tracing::debug!(%peer, "egress connection");
                    let proxy = self.clone();
                    tokio::spawn(async move {
                        if let Err(error) = proxy.handle_connection(stream).await {
                            tracing::debug!(error = %error, "egress connection ended");
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Accept loop on a Unix socket (the container bind mount).
    pub async fn run_unix(
        self: Arc<Self>,
        listener: UnixListener,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), EgressError> {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let proxy = self.clone();
                    tokio::spawn(async move {
                        if let Err(error) = proxy.handle_connection(stream).await {
                            tracing::debug!(error = %error, "egress connection ended");
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One client connection: CONNECT, TLS, then the request loop.
    async fn handle_connection<S>(&self, stream: S) -> Result<(), EgressError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut reader = BufReader::new(stream);

        // CONNECT line.
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let mut parts = line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let target = parts.next().unwrap_or_default().to_string();

        // Drain the CONNECT headers.
        for _ in 0..MAX_HEADER_LINES {
            let mut header = String::new();
            if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
                break;
            }
        }

        let mut stream = reader.into_inner();
        if method != "CONNECT" {
            stream
                .write_all(b"HTTP/1.1 405 Method Not Allowed\r\ncontent-length: 0\r\n\r\n")
                .await?;
            return Ok(());
        }

        let host = target.split(':').next().unwrap_or_default().to_string();
        let Some(provider) = self
            .config
            .providers
            .iter()
            .find(|p| p.host == host)
            .cloned()
        else {
            tracing::warn!(%host, "CONNECT refused: host not allowlisted");
            stream
                .write_all(b"HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\n\r\n")
                .await?;
            return Ok(());
        };

        stream
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await?;
        stream.flush().await?;

        // TLS-terminate with a leaf for this host.
        let leaf = self.ca.issue_leaf(&host)?;
        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(leaf.chain, leaf.key)?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let tls = acceptor.accept(stream).await?;
        let mut tls = BufReader::new(tls);

        // In-tunnel request loop.
        while let Some(request) = read_request(&mut tls).await? {
            let response = self.handle_request(&provider, request).await;
            write_response(tls.get_mut(), &response).await?;
        }
        Ok(())
    }

    /// Policy checks, credential swap, rewrite, forward.
    async fn handle_request(
        &self,
        provider: &ProviderEndpoints,
        mut request: TunnelRequest,
    ) -> TunnelResponse {
        // The rewriter must be able to read the body.
        if request.header("transfer-encoding").is_some() {
            return TunnelResponse::refusal(
                415,
                "Unsupported Media Type",
                "chunked request bodies are not supported",
            );
        }
        if let Some(encoding) = request.header("content-encoding") {
            if !encoding.eq_ignore_ascii_case("identity") {
                return TunnelResponse::refusal(
                    415,
                    "Unsupported Media Type",
                    &format!("unsupported content-encoding '{encoding}'"),
                );
            }
        }

        if !provider.endpoint_allowed(&request.method, &request.path) {
            tracing::warn!(
                provider = provider.name,
                method = %request.method,
                path = %request.path,
                "endpoint not allowlisted"
            );
            return TunnelResponse::refusal(
                403,
                "Forbidden",
                &format!("endpoint not allowed: {} {}", request.method, request.path),
            );
        }

        // Fake-key verification; the real key never enters the container.
        let presented = match &provider.key_injection {
            KeyInjection::Header(name) => request.header(name).map(str::to_string),
            KeyInjection::Bearer => request
                .header("authorization")
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string),
        };
        let expected = self.config.fake_keys.get(provider.name);
        if presented.is_none() || presented.as_deref() != expected {
            return TunnelResponse::refusal(401, "Unauthorized", "missing or unknown credential");
        }
        let Some(real_key) = self.config.real_keys.get(provider.name) else {
            return TunnelResponse::refusal(
                401,
                "Unauthorized",
                &format!("no credential configured for {}", provider.name),
            );
        };

        // Body rewrite for the configured endpoints.
        if provider.should_rewrite(&request.method, &request.path) && !request.body.is_empty() {
            let mut body: serde_json::Value = match serde_json::from_slice(&request.body) {
                Ok(body) => body,
                Err(error) => {
                    return TunnelResponse::refusal(
                        400,
                        "Bad Request",
                        &format!("request body is not valid JSON: {error}"),
                    )
                }
            };
            provider.rewriter.apply(&mut body);
            request.body = body.to_string().into_bytes();
        }

        self.forward(provider, real_key, request).await
    }

    /// Send the request upstream and relay the answer.
    async fn forward(
        &self,
        provider: &ProviderEndpoints,
        real_key: &str,
        request: TunnelRequest,
    ) -> TunnelResponse {
        let url = format!("https://{}{}", provider.host, request.path);
        let method = match reqwest::Method::from_bytes(request.method.as_bytes()) {
            Ok(method) => method,
            Err(_) => return TunnelResponse::refusal(400, "Bad Request", "bad method"),
        };

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &request.headers {
            if is_hop_by_hop(name) || is_credential_header(provider, name) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        match &provider.key_injection {
            KeyInjection::Header(name) => {
                if let (Ok(name), Ok(value)) = (
                    reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                    reqwest::header::HeaderValue::from_str(real_key),
                ) {
                    headers.insert(name, value);
                }
            }
            KeyInjection::Bearer => {
                if let Ok(value) =
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {real_key}"))
                {
                    headers.insert(reqwest::header::AUTHORIZATION, value);
                }
            }
        }

        let upstream = self
            .client
            .request(method, url)
            .headers(headers)
            .body(request.body)
            .send()
            .await;
        let upstream = match upstream {
            Ok(upstream) => upstream,
            Err(error) => {
                tracing::warn!(provider = provider.name, error = %error, "upstream request failed");
                return TunnelResponse::refusal(502, "Bad Gateway", "upstream request failed");
            }
        };

        let status = upstream.status();
        let mut headers = Vec::new();
        for (name, value) in upstream.headers() {
            let name = name.as_str();
            if is_hop_by_hop(name) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                headers.push((name.to_string(), value.to_string()));
            }
        }
        let body = upstream.bytes().await.map(|b| b.to_vec()).unwrap_or_default();

        TunnelResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        }
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "host"
            | "connection"
            | "content-length"
            | "transfer-encoding"
            | "proxy-authorization"
            | "proxy-connection"
            | "keep-alive"
            | "te"
            | "upgrade"
    )
}

fn is_credential_header(provider: &ProviderEndpoints, name: &str) -> bool {
    match &provider.key_injection {
        KeyInjection::Header(header) => name.eq_ignore_ascii_case(header),
        KeyInjection::Bearer => name.eq_ignore_ascii_case("authorization"),
    }
}

/// Read one HTTP/1.1 request from the tunnel. None on clean EOF.
async fn read_request<R>(reader: &mut R) -> Result<Option<TunnelRequest>, EgressError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    if method.is_empty() || !path.starts_with('/') {
        return Err(EgressError::BadRequest(format!(
            "bad request line: {}",
            line.trim()
        )));
    }

    let mut headers = Vec::new();
    for _ in 0..MAX_HEADER_LINES {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 {
            return Err(EgressError::BadRequest("eof in headers".to_string()));
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(EgressError::BadRequest("body too large".to_string()));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    Ok(Some(TunnelRequest {
        method,
        path,
        headers,
        body,
    }))
}

/// Serialize one response into the tunnel with a recomputed length.
async fn write_response<W>(writer: &mut W, response: &TunnelResponse) -> Result<(), EgressError>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, response.reason);
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!("content-length: {}\r\n\r\n", response.body.len()));

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await?;
    Ok(())
}
