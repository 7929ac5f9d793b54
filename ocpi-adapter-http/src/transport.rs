//! reqwest-backed HTTP transport

use async_trait::async_trait;
use tracing::{debug, info};

use ocpi_core::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TlsMaterial, TransportError};

use crate::config::TransportConfig;
use crate::error::AdapterError;

/// Sends OCPI requests with a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self, AdapterError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str());

        if let Some(tls) = &config.tls {
            builder = apply_tls(builder, tls)?;
            info!(
                client_identity = tls.client_certificate_pem.is_some(),
                custom_root = tls.root_certificate_pem.is_some(),
                "TLS material configured"
            );
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsMaterial,
) -> Result<reqwest::ClientBuilder, AdapterError> {
    if let Some(root) = &tls.root_certificate_pem {
        let certificate = reqwest::Certificate::from_pem(root.as_bytes())
            .map_err(|e| AdapterError::InvalidTls(format!("root certificate: {}", e)))?;
        builder = builder.add_root_certificate(certificate);
    }

    match (&tls.client_certificate_pem, &tls.client_key_pem) {
        (Some(certificate), Some(key)) => {
            let identity =
                reqwest::Identity::from_pkcs8_pem(certificate.as_bytes(), key.as_bytes())
                    .map_err(|e| AdapterError::InvalidTls(format!("client identity: {}", e)))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(AdapterError::InvalidTls(
                "client certificate and key must be configured together".to_string(),
            ))
        }
    }

    Ok(builder)
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Map a reqwest failure onto the transport fault taxonomy
fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Io(error.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", request.url, e)))?;

        let mut builder = self
            .client
            .request(method(request.method), url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;

        debug!(
            method = %request.method,
            url = %request.url,
            status,
            bytes = body.len(),
            "HTTP response received"
        );

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use ocpi_core::{
        ClientConfig, InMemoryRegistry, OcpiClient, PartyIdentity, RemotePartyRecord, RetryPolicy,
        Role,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    /// Serve one canned response; the handle yields the raw request head
    async fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&head).to_lowercase()
        });

        (base, handle)
    }

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(TransportConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_send_forwards_headers() {
        let (base, server) = serve_once("200 OK", r#"{"status_code":1000}"#).await;

        let url = format!("{}/ocpi/versions", base);
        let request = HttpRequest::new(HttpMethod::Get, url, Duration::from_secs(5))
            .with_header("Authorization", "Token dG9rZW4=")
            .with_header("X-Request-ID", "req-1");
        let response = transport().send(request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"status_code":1000}"#.to_vec());

        let head = server.await.unwrap();
        assert!(head.starts_with("get /ocpi/versions http/1.1"));
        assert!(head.contains("authorization: token dg9rzw4="));
        assert!(head.contains("x-request-id: req-1"));
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let (base, _server) = serve_once("503 Service Unavailable", "busy").await;

        let request = HttpRequest::new(HttpMethod::Get, base, Duration::from_secs(5));
        let response = transport().send(request).await.unwrap();

        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/", addr);
        let request = HttpRequest::new(HttpMethod::Get, url, Duration::from_secs(5));
        let err = transport().send(request).await.unwrap_err();

        assert!(matches!(err, TransportError::Connect(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let request = HttpRequest::new(HttpMethod::Get, base, Duration::from_millis(100));
        let err = transport().send(request).await.unwrap_err();

        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let request = HttpRequest::new(HttpMethod::Get, "not a url", Duration::from_secs(1));
        let err = transport().send(request).await.unwrap_err();

        assert!(matches!(err, TransportError::InvalidRequest(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_half_configured_identity_rejected() {
        let tls = TlsMaterial {
            client_certificate_pem: Some("-----BEGIN CERTIFICATE-----".to_string()),
            ..Default::default()
        };
        let result = ReqwestTransport::new(TransportConfig::default().with_tls(tls));

        assert!(matches!(result, Err(AdapterError::InvalidTls(_))));
    }

    #[tokio::test]
    async fn test_client_discovers_versions_over_http() {
        let body = r#"{"data":[{"version":"2.2.1","url":"https://cpo.example.com/ocpi/2.2.1"}],"status_code":1000,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let (base, server) = serve_once("200 OK", body).await;

        let client = OcpiClient::new(
            ClientConfig::new("https://emsp.example.com/ocpi/versions")
                .with_retry(RetryPolicy::none()),
            PartyIdentity::new("DE", "EXP", Role::Cpo),
            RemotePartyRecord::invited(format!("{}/ocpi/versions", base), "token-a"),
            Arc::new(transport()),
            Arc::new(InMemoryRegistry::new()),
        )
        .unwrap();

        let outcome = client.discover_versions(&CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(client.versions().len(), 1);

        let head = server.await.unwrap();
        assert!(head.contains("x-correlation-id: "));
        assert!(head.contains("authorization: token dg9rzw4tyq=="));
    }
}
