//! Integration tests for Webdis
//!
//! End-to-end tests against a real running instance: HTTP-to-Redis
//! command translation, ACL enforcement, and request size limits.
//! Tests use a real Webdis instance with a temporary configuration file
//! and dynamically allocated ports to avoid conflicts.

use reqwest::Client;
use std::process::{Child, Command};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

use std::io::Write;
use tempfile::NamedTempFile;

/// Test server instance that manages a Webdis process for integration testing.
struct TestServer {
    process: Child,
    _config_file: NamedTempFile,
    pub port: u16,
}

impl TestServer {
    async fn new() -> Self {
        Self::new_with_limit(None).await
    }

    /// `limit` sets `http_max_request_size`. ACL rules put the
    /// identity-specific enable rule *before* the general disable rule —
    /// first-match-wins evaluation means order is the whole contract.
    async fn new_with_limit(limit: Option<usize>) -> Self {
        let status = Command::new("cargo")
            .arg("build")
            .status()
            .expect("Failed to build project");
        assert!(status.success());

        let mut config_file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("Failed to create temp config file");

        let port = {
            let listener =
                std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
            listener.local_addr().unwrap().port()
        };

        let config_content = serde_json::json!({
            "redis_host": "127.0.0.1",
            "redis_port": 6379,
            "http_host": "127.0.0.1",
            "http_port": port,
            "database": 0,
            "daemonize": false,
            "verbosity": 5,
            "logfile": "webdis.log",
            "http_max_request_size": limit,
            "acl": [
                {
                    "http_basic_auth": "user:password",
                    "enabled": ["DEBUG"]
                },
                {
                    "disabled": ["DEBUG"]
                }
            ]
        });

        write!(config_file, "{}", config_content.to_string()).expect("Failed to write config");

        let config_path = config_file.path().to_str().unwrap().to_string();

        let process = Command::new("target/debug/webdis")
            .arg(&config_path)
            .spawn()
            .expect("Failed to start webdis");

        sleep(Duration::from_secs(2)).await;

        Self {
            process,
            _config_file: config_file,
            port,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

/// Basic HTTP GET/SET operations via Webdis, JSON-formatted responses.
#[tokio::test]
async fn test_basic_get_set() {
    let server = TestServer::new().await;
    let client = Client::new();

    let resp = client
        .get(&format!(
            "http://127.0.0.1:{}/SET/test_key/test_value",
            server.port
        ))
        .send()
        .await
        .expect("Failed to send request");
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["SET"], serde_json::json!([true, "OK"]));

    let resp = client
        .get(&format!("http://127.0.0.1:{}/GET/test_key", server.port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["GET"], serde_json::json!([true, "test_value"]));
}

/// Redis stores JSON as a plain string; Webdis returns it unmodified.
#[tokio::test]
async fn test_json_output() {
    let server = TestServer::new().await;
    let client = Client::new();

    let json_val = r#"{"a":1,"b":"c"}"#;
    let _ = client
        .get(&format!(
            "http://127.0.0.1:{}/SET/json_key/{}",
            server.port, json_val
        ))
        .send()
        .await
        .expect("Failed to send request");

    let resp = client
        .get(&format!("http://127.0.0.1:{}/GET/json_key", server.port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.expect("Failed to parse JSON");
    assert_eq!(body["GET"], serde_json::json!([true, json_val]));
}

/// ACL enforcement: DEBUG is disabled by default, allowed only for the
/// configured Basic-auth identity. First-match-wins means the identity
/// rule (listed first) must take priority over the general deny.
#[tokio::test]
async fn test_acl_restrictions() {
    let server = TestServer::new().await;
    let client = Client::new();

    let resp = client
        .get(&format!(
            "http://127.0.0.1:{}/DEBUG/OBJECT/test_key",
            server.port
        ))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);

    let resp = client
        .get(&format!(
            "http://127.0.0.1:{}/DEBUG/OBJECT/test_key",
            server.port
        ))
        .basic_auth("user", Some("password"))
        .send()
        .await
        .expect("Failed to send request");
    assert_ne!(resp.status(), reqwest::StatusCode::FORBIDDEN);
}

/// Server rejects oversized request lines rather than hanging or crashing.
#[tokio::test]
async fn test_huge_url() {
    let limit = 1024 * 1024;
    let server = TestServer::new_with_limit(Some(limit)).await;

    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", server.port))
        .await
        .expect("Failed to connect");

    let huge_path = "A".repeat(1024 * 1024);
    let request = format!("GET /GET/{} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n", huge_path);

    let _ = stream.write_all(request.as_bytes()).await;

    let mut buffer = [0; 1024];
    let n = stream
        .read(&mut buffer)
        .await
        .expect("Failed to read response");
    let response = String::from_utf8_lossy(&buffer[..n]);

    assert!(
        response.contains("414 URI Too Long")
            || response.contains("400 Bad Request")
            || response.contains("431 Request Header Fields Too Large"),
        "Unexpected response: {}",
        response
    );
}

/// Server respects `http_max_request_size` for request bodies.
#[tokio::test]
async fn test_huge_upload() {
    let limit = 1024 * 1024;
    let server = TestServer::new_with_limit(Some(limit)).await;

    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", server.port))
        .await
        .expect("Failed to connect");

    let content_length = 10 * 1024 * 1024;

    let headers = format!(
        "PUT /SET/huge_key HTTP/1.1\r\n\
         Host: 127.0.0.1\r\n\
         Content-Length: {}\r\n\
         Expect: 100-continue\r\n\
         \r\n",
        content_length
    );

    stream
        .write_all(headers.as_bytes())
        .await
        .expect("Failed to write headers");

    let mut buffer = [0; 1024];
    let n = stream
        .read(&mut buffer)
        .await
        .expect("Failed to read 100 continue");
    let response = String::from_utf8_lossy(&buffer[..n]);

    assert!(
        response.contains("100 Continue"),
        "Expected 100 Continue, got: {}",
        response
    );

    let chunk_size = 64 * 1024;
    let chunk = vec![b'A'; chunk_size];
    let mut sent = 0;
    let mut failed = false;

    while sent < content_length {
        match stream.write_all(&chunk).await {
            Ok(_) => {
                sent += chunk_size;
            }
            Err(_) => {
                failed = true;
                break;
            }
        }
    }

    if !failed {
        let n = stream.read(&mut buffer).await.unwrap_or(0);
        if n > 0 {
            let response = String::from_utf8_lossy(&buffer[..n]);
            assert!(
                response.contains("413 Payload Too Large") || response.contains("400 Bad Request"),
                "Expected error response, got: {}",
                response
            );
        }
    }
}
