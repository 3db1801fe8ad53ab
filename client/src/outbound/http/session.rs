//! Reqwest-backed session transport.
//!
//! This adapter owns transport details only: endpoint layout, headers,
//! cookie persistence, and timeout mapping. Status codes and bodies are
//! handed back untouched for the domain to interpret.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::domain::ports::{Credentials, RawResponse, SessionTransport, SessionTransportError};

const LOGIN_PATH: &str = "ipa/session/login_password";
const RPC_PATH: &str = "ipa/session/json";
const REFERER_PATH: &str = "ipa";

/// Cookie store holding the IPA session.
///
/// Clone the handle to let several transports share one logical session.
pub type SessionJar = Arc<Jar>;

/// URLs derived from the server scheme and host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpaEndpoints {
    login: Url,
    rpc: Url,
    referer: Url,
}

impl IpaEndpoints {
    /// Derive login, RPC, and referer URLs for `scheme://host`.
    ///
    /// # Examples
    /// ```
    /// use ipa_client::outbound::http::IpaEndpoints;
    ///
    /// let endpoints = IpaEndpoints::new("https", "ipa.example.test").unwrap();
    /// assert_eq!(endpoints.rpc().as_str(), "https://ipa.example.test/ipa/session/json");
    /// assert_eq!(endpoints.referer().as_str(), "https://ipa.example.test/ipa");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when `scheme` and `host` do not form a valid URL.
    pub fn new(scheme: &str, host: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(&format!("{scheme}://{host}/"))?;
        Ok(Self {
            login: base.join(LOGIN_PATH)?,
            rpc: base.join(RPC_PATH)?,
            referer: base.join(REFERER_PATH)?,
        })
    }

    /// Password login form endpoint.
    pub fn login(&self) -> &Url {
        &self.login
    }

    /// JSON-RPC endpoint.
    pub fn rpc(&self) -> &Url {
        &self.rpc
    }

    /// Referer the server requires on every request.
    pub fn referer(&self) -> &Url {
        &self.referer
    }
}

/// Session transport performing HTTP POST requests against one IPA server.
pub struct HttpSessionTransport {
    client: Option<Client>,
    jar: SessionJar,
    endpoints: IpaEndpoints,
}

impl HttpSessionTransport {
    /// Build a transport with a fresh cookie jar and an explicit request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoints: IpaEndpoints, timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_jar(endpoints, timeout, SessionJar::default())
    }

    /// Build a transport that stores cookies in `jar`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_jar(
        endpoints: IpaEndpoints,
        timeout: Duration,
        jar: SessionJar,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        Ok(Self {
            client: Some(client),
            jar,
            endpoints,
        })
    }

    /// Handle to the cookie jar backing this transport.
    pub fn jar(&self) -> SessionJar {
        Arc::clone(&self.jar)
    }

    /// Endpoints this transport talks to.
    pub fn endpoints(&self) -> &IpaEndpoints {
        &self.endpoints
    }

    fn client(&self) -> Result<&Client, SessionTransportError> {
        self.client.as_ref().ok_or_else(SessionTransportError::closed)
    }
}

#[async_trait]
impl SessionTransport for HttpSessionTransport {
    async fn login(&self, credentials: &Credentials) -> Result<RawResponse, SessionTransportError> {
        let response = self
            .client()?
            .post(self.endpoints.login.clone())
            .header(REFERER, self.endpoints.referer.as_str())
            .header(ACCEPT, "text/plain")
            .form(&[
                ("user", credentials.identity()),
                ("password", credentials.secret()),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;
        read_response(response).await
    }

    async fn call(&self, payload: &Value) -> Result<RawResponse, SessionTransportError> {
        let response = self
            .client()?
            .post(self.endpoints.rpc.clone())
            .header(REFERER, self.endpoints.referer.as_str())
            .header(ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;
        read_response(response).await
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            debug!(endpoint = %self.endpoints.rpc, "session transport closed");
        }
    }
}

async fn read_response(response: Response) -> Result<RawResponse, SessionTransportError> {
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(map_transport_error)?;
    debug!(status, bytes = body.len(), "ipa response received");
    Ok(RawResponse::new(status, body.to_vec()))
}

fn map_transport_error(error: reqwest::Error) -> SessionTransportError {
    if error.is_timeout() {
        SessionTransportError::timeout(error.to_string())
    } else {
        SessionTransportError::transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for the HTTP session adapter.
    //!
    //! A throwaway TCP listener stands in for the server so cookie handling
    //! and headers can be observed on the wire.

    use super::*;
    use reqwest::cookie::CookieStore;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    const SESSION_COOKIE: &str = "ipa_session=MagBearerToken%3Dabc";

    #[fixture]
    fn endpoints() -> IpaEndpoints {
        IpaEndpoints::new("https", "ipa.example.test").expect("valid endpoints")
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = stream.read(&mut chunk).await.expect("read request");
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(chunk.get(..read).expect("chunk slice"));
            let text = String::from_utf8_lossy(&buffer);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buffer.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Serve `responses` in order on one port, reporting each raw request.
    async fn serve(responses: Vec<String>) -> (IpaEndpoints, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let address = listener.local_addr().expect("local address");
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = listener.accept().await.expect("accept");
                let request = read_request(&mut stream).await;
                requests_tx.send(request).expect("report request");
                stream
                    .write_all(response.as_bytes())
                    .await
                    .expect("write response");
                stream.shutdown().await.expect("shutdown");
            }
        });
        let endpoints =
            IpaEndpoints::new("http", &address.to_string()).expect("listener endpoints");
        (endpoints, requests_rx)
    }

    fn http_response(status_line: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    #[rstest]
    fn derives_endpoints_from_scheme_and_host(endpoints: IpaEndpoints) {
        assert_eq!(
            endpoints.login().as_str(),
            "https://ipa.example.test/ipa/session/login_password"
        );
        assert_eq!(
            endpoints.rpc().as_str(),
            "https://ipa.example.test/ipa/session/json"
        );
        assert_eq!(endpoints.referer().as_str(), "https://ipa.example.test/ipa");
    }

    #[test]
    fn rejects_hosts_that_do_not_form_a_url() {
        assert!(IpaEndpoints::new("https", "bad host").is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn closed_transport_rejects_calls(endpoints: IpaEndpoints) {
        let mut transport =
            HttpSessionTransport::new(endpoints, Duration::from_secs(1)).expect("client builds");
        transport.close();
        transport.close();

        let err = transport
            .call(&json!({}))
            .await
            .expect_err("closed transport must fail");
        assert_eq!(err, SessionTransportError::Closed);

        let credentials = Credentials::try_new("admin", "secret").expect("credentials");
        let login_err = transport
            .login(&credentials)
            .await
            .expect_err("closed transport must fail");
        assert_eq!(login_err, SessionTransportError::Closed);
    }

    #[rstest]
    fn shared_jar_is_visible_to_every_transport(endpoints: IpaEndpoints) {
        let jar = SessionJar::default();
        let first = HttpSessionTransport::with_jar(endpoints.clone(), Duration::from_secs(1), jar.clone())
            .expect("client builds");
        let second = HttpSessionTransport::with_jar(endpoints.clone(), Duration::from_secs(1), jar)
            .expect("client builds");

        first.jar().add_cookie_str(SESSION_COOKIE, endpoints.rpc());
        let header = second.jar().cookies(endpoints.rpc()).expect("cookie stored");
        assert_eq!(header.to_str().expect("ascii cookie"), SESSION_COOKIE);
    }

    #[tokio::test]
    async fn login_cookie_is_presented_on_rpc_calls() {
        let (endpoints, mut requests) = serve(vec![
            http_response(
                "200 OK",
                &format!("Set-Cookie: {SESSION_COOKIE}; Path=/; HttpOnly\r\n"),
                "",
            ),
            http_response(
                "200 OK",
                "Content-Type: application/json\r\n",
                r#"{"result":{"result":null},"error":null}"#,
            ),
        ])
        .await;
        let transport =
            HttpSessionTransport::new(endpoints, Duration::from_secs(5)).expect("client builds");

        let credentials = Credentials::try_new("admin", "p@ss word").expect("credentials");
        let login = transport.login(&credentials).await.expect("login response");
        assert_eq!(login.status, 200);

        let login_request = requests.recv().await.expect("login request");
        assert!(login_request.starts_with("POST /ipa/session/login_password "));
        assert!(login_request.contains("user=admin&password=p%40ss+word"));
        assert!(login_request.to_ascii_lowercase().contains("referer: http://127.0.0.1"));

        let response = transport
            .call(&json!({ "method": "session_logout", "params": [[], {}] }))
            .await
            .expect("rpc response");
        assert_eq!(response.status, 200);
        assert!(response.body.starts_with(b"{\"result\""));

        let rpc_request = requests.recv().await.expect("rpc request");
        let lowered = rpc_request.to_ascii_lowercase();
        assert!(rpc_request.starts_with("POST /ipa/session/json "));
        assert!(lowered.contains("content-type: application/json"));
        assert!(lowered.contains("accept: application/json"));
        assert!(rpc_request.contains(SESSION_COOKIE));
    }

    #[tokio::test]
    async fn failure_statuses_are_returned_untouched() {
        let (endpoints, _requests) = serve(vec![http_response(
            "401 Unauthorized",
            "Content-Type: text/html\r\n",
            "<html>denied</html>",
        )])
        .await;
        let transport =
            HttpSessionTransport::new(endpoints, Duration::from_secs(5)).expect("client builds");

        let credentials = Credentials::try_new("admin", "wrong").expect("credentials");
        let response = transport.login(&credentials).await.expect("response arrives");
        assert_eq!(response.status, 401);
        assert_eq!(response.body, b"<html>denied</html>");
    }

    #[tokio::test]
    async fn slow_servers_map_to_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let address = listener.local_addr().expect("local address");
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });
        let endpoints = IpaEndpoints::new("http", &address.to_string()).expect("endpoints");
        let transport = HttpSessionTransport::new(endpoints, Duration::from_millis(100))
            .expect("client builds");

        let err = transport
            .call(&json!({}))
            .await
            .expect_err("deadline must elapse");
        assert!(
            matches!(err, SessionTransportError::Timeout { .. }),
            "elapsed deadline should map to Timeout, got {err:?}",
        );
        server.abort();
    }
}
