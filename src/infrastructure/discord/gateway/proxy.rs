//! HTTP `CONNECT` tunneling for the gateway transport.

use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::debug;

use super::error::{GatewayError, GatewayResult};

const DEFAULT_PROXY_PORT: u16 = 80;
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// An HTTP proxy the gateway connection is tunneled through.
///
/// `Debug` never shows the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    host: String,
    port: u16,
    credentials: Option<ProxyCredentials>,
}

#[derive(Clone, PartialEq, Eq)]
struct ProxyCredentials {
    username: String,
    password: String,
}

impl ProxyConfig {
    /// Proxy at `host:port` without authentication.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    /// Sends `Proxy-Authorization: Basic` with these credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(ProxyCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Parses `http://[user[:password]@]host[:port]`. The port defaults to 80.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidProxy` for malformed URLs, schemes other
    /// than `http`, and URLs carrying a path.
    pub fn parse(url: &str) -> GatewayResult<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| GatewayError::invalid_proxy(format!("{url}: {e}")))?;

        if uri.scheme_str() != Some("http") {
            return Err(GatewayError::invalid_proxy(format!(
                "{url}: only http:// proxies are supported"
            )));
        }
        if !matches!(uri.path(), "" | "/") || uri.query().is_some() {
            return Err(GatewayError::invalid_proxy(format!("{url}: unexpected path")));
        }

        let authority = uri
            .authority()
            .ok_or_else(|| GatewayError::invalid_proxy(format!("{url}: missing host")))?;
        let mut proxy = Self::new(
            authority.host(),
            authority.port_u16().unwrap_or(DEFAULT_PROXY_PORT),
        );

        if let Some((userinfo, _)) = authority.as_str().rsplit_once('@') {
            let (username, password) = userinfo.split_once(':').unwrap_or((userinfo, ""));
            proxy = proxy.with_credentials(username, password);
        }

        Ok(proxy)
    }

    /// Opens a TCP stream to the proxy and asks it to tunnel to
    /// `target_host:target_port`. The returned stream talks to the target.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ConnectionFailed` if the proxy is unreachable,
    /// hangs up, or answers with a non-200 status.
    pub async fn open_tunnel(
        &self,
        target_host: &str,
        target_port: u16,
    ) -> GatewayResult<TcpStream> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                GatewayError::connection_failed(format!("proxy {}:{}: {e}", self.host, self.port))
            })?;

        stream
            .write_all(self.connect_request(target_host, target_port).as_bytes())
            .await
            .map_err(|e| GatewayError::connection_failed(format!("proxy write: {e}")))?;

        let head = read_response_head(&mut stream).await?;
        let status = parse_status(&head)?;
        if status != 200 {
            return Err(GatewayError::connection_failed(format!(
                "proxy refused tunnel with status {status}"
            )));
        }

        debug!(
            proxy_host = %self.host,
            proxy_port = self.port,
            target_host,
            target_port,
            "Proxy tunnel established"
        );
        Ok(stream)
    }

    fn connect_request(&self, target_host: &str, target_port: u16) -> String {
        let target = format!("{target_host}:{target_port}");
        let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");

        if let Some(credentials) = &self.credentials {
            let encoded = general_purpose::STANDARD
                .encode(format!("{}:{}", credentials.username, credentials.password));
            request.push_str("Proxy-Authorization: Basic ");
            request.push_str(&encoded);
            request.push_str("\r\n");
        }

        request.push_str("\r\n");
        request
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "username",
                &self.credentials.as_ref().map(|c| c.username.as_str()),
            )
            .finish_non_exhaustive()
    }
}

/// Reads up to and including the blank line ending the response head. Reads
/// byte by byte so no tunneled data is consumed.
async fn read_response_head(stream: &mut TcpStream) -> GatewayResult<String> {
    let mut head = Vec::with_capacity(128);

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(GatewayError::connection_failed("proxy response head too large"));
        }
        let byte = stream
            .read_u8()
            .await
            .map_err(|e| GatewayError::connection_failed(format!("proxy read: {e}")))?;
        head.push(byte);
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn parse_status(head: &str) -> GatewayResult<u16> {
    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| GatewayError::connection_failed("malformed proxy response"))
}
