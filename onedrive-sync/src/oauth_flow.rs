use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use futures_util::future::select_all;
use onedrive_core::{OAuthClient, OAuthToken};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

const CALLBACK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
<html><body><p>OneDrive connected. You can close this window.</p>\
<script type=\"text/javascript\">window.close()</script></body></html>";

#[derive(Debug, Error)]
pub enum OAuthFlowError {
    #[error("oauth error: {0}")]
    OAuth(#[from] onedrive_core::OAuthError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authorization code missing in redirect")]
    MissingCode,
    #[error("the server returned an error: {error} - {description}")]
    Denied { error: String, description: String },
    #[error("authorization timed out")]
    Timeout,
}

/// Browser based authorization code flow with a loopback redirect listener.
///
/// The redirect URI names `localhost`, so the listener is bound on both
/// `127.0.0.1` and `::1` (the latter when the host has IPv6 loopback).
pub struct OAuthFlow {
    client: OAuthClient,
    listen_port: u16,
    timeout: Duration,
}

impl OAuthFlow {
    pub fn new(client: OAuthClient, listen_port: u16) -> Self {
        Self {
            client,
            listen_port,
            timeout: Duration::from_secs(180),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn authenticate(&self) -> Result<OAuthToken, OAuthFlowError> {
        let listeners = bind_loopback(self.listen_port).await?;
        let url = self.client.authorize_url(None, None)?;
        open_browser(&url);
        let code = wait_for_code(&listeners, self.timeout).await?;
        info!("authorization code received");
        Ok(self.client.exchange_code(&code).await?)
    }
}

async fn bind_loopback(port: u16) -> std::io::Result<Vec<TcpListener>> {
    let mut listeners = vec![TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?];
    match TcpListener::bind((Ipv6Addr::LOCALHOST, port)).await {
        Ok(listener) => listeners.push(listener),
        Err(err) => debug!("IPv6 loopback unavailable: {err}"),
    }
    Ok(listeners)
}

fn open_browser(url: &Url) {
    if let Err(err) = webbrowser::open(url.as_str()) {
        warn!("could not launch a browser: {err}");
        println!("Open this URL in your browser:\n{url}");
    }
}

/// Accepts one redirect on any of `listeners` and returns the authorization code.
pub async fn wait_for_code(
    listeners: &[TcpListener],
    timeout: Duration,
) -> Result<String, OAuthFlowError> {
    if listeners.is_empty() {
        return Err(OAuthFlowError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "no listener to wait on",
        )));
    }
    let accepts = listeners.iter().map(|listener| Box::pin(listener.accept()));
    let (accepted, _, _) = tokio::time::timeout(timeout, select_all(accepts))
        .await
        .map_err(|_| OAuthFlowError::Timeout)?;
    let (mut stream, peer) = accepted?;
    debug!(%peer, "redirect received");

    let mut request = vec![0u8; 8192];
    let read = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut request))
        .await
        .map_err(|_| OAuthFlowError::Timeout)??;
    let request_text = String::from_utf8_lossy(&request[..read]);
    let result = parse_callback(&request_text);

    let _ = stream.write_all(CALLBACK_RESPONSE).await;
    let _ = stream.shutdown().await;

    result
}

fn parse_callback(request: &str) -> Result<String, OAuthFlowError> {
    let request_line = request.lines().next().ok_or(OAuthFlowError::MissingCode)?;
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or(OAuthFlowError::MissingCode)?;
    let request_url = if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target)
    } else {
        Url::parse(&format!("http://127.0.0.1{target}"))
    }
    .map_err(|_| OAuthFlowError::MissingCode)?;

    let mut code = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in request_url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }
    if let Some(error) = error {
        return Err(OAuthFlowError::Denied {
            error,
            description: description.unwrap_or_default(),
        });
    }
    code.ok_or(OAuthFlowError::MissingCode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[test]
    fn extracts_code_from_request_line() {
        let req = "GET /?code=M1a2b3&lc=1033 HTTP/1.1\r\nHost: localhost:8080\r\n\r\n";
        assert_eq!(parse_callback(req).unwrap(), "M1a2b3");
    }

    #[test]
    fn returns_missing_code_without_code() {
        let req = "GET /favicon.ico HTTP/1.1\r\nHost: localhost:8080\r\n\r\n";
        assert!(matches!(
            parse_callback(req),
            Err(OAuthFlowError::MissingCode)
        ));
    }

    #[test]
    fn reports_denied_authorization() {
        let req = "GET /?error=access_denied&error_description=The%20user%20declined HTTP/1.1\r\n\r\n";
        match parse_callback(req) {
            Err(OAuthFlowError::Denied { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description, "The user declined");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_for_code_answers_the_browser() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /?code=abc123 HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            String::from_utf8_lossy(&response).into_owned()
        });

        let code = wait_for_code(&[listener], Duration::from_secs(5))
            .await
            .unwrap();
        let response = browser.await.unwrap();

        assert_eq!(code, "abc123");
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("window.close()"));
    }

    #[tokio::test]
    async fn wait_for_code_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = wait_for_code(&[listener], Duration::from_millis(20))
            .await
            .expect_err("expected timeout");
        assert!(matches!(err, OAuthFlowError::Timeout));
    }

    #[tokio::test]
    async fn wait_for_code_accepts_ipv6_loopback() {
        let v4 = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let Ok(v6) = TcpListener::bind("[::1]:0").await else {
            return;
        };
        let addr = v6.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /?code=v6code HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
        });

        let code = wait_for_code(&[v4, v6], Duration::from_secs(5))
            .await
            .unwrap();
        browser.await.unwrap();
        assert_eq!(code, "v6code");
    }

    #[tokio::test]
    async fn bind_loopback_always_includes_ipv4() {
        let listeners = bind_loopback(0).await.unwrap();
        assert!(listeners[0].local_addr().unwrap().is_ipv4());
    }
}
