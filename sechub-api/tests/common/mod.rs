//! Minimal in-process HTTP server answering scripted JSON responses.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use sechub_testkit::{RetryConfig, SecHubClient, SecHubConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One request as seen by the stub.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

type Routes = HashMap<String, VecDeque<(u16, String)>>;

/// Answers `METHOD /path` with the scripted responses in order; the last
/// response of a route repeats. Unknown routes get a 404.
pub struct StubServer {
    pub base_url: String,
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Arc<Mutex<Routes>> = Arc::default();
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();

        let server_routes = Arc::clone(&routes);
        let server_requests = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = Arc::clone(&server_routes);
                let requests = Arc::clone(&server_requests);
                tokio::spawn(async move {
                    handle(stream, routes, requests).await;
                });
            }
        });

        Self {
            base_url,
            routes,
            requests,
        }
    }

    /// Script the responses of `method path`.
    pub fn route(&self, method: &str, path: &str, responses: &[(u16, &str)]) {
        self.routes.lock().unwrap().insert(
            format!("{method} {path}"),
            responses
                .iter()
                .map(|(status, body)| (*status, (*body).to_string()))
                .collect(),
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Client pointing at this stub for both SecHub and PDS.
    pub fn client(&self) -> SecHubClient {
        let config = SecHubConfig::new(
            self.base_url.clone(),
            "int-test_superadmin".to_string(),
            "int-test_superadmin-pwd".to_string(),
        )
        .with_pds_url(self.base_url.clone())
        .with_retry_config(RetryConfig::disabled());
        SecHubClient::new(config).unwrap()
    }
}

async fn handle(
    mut stream: TcpStream,
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let Ok(read) = stream.read(&mut chunk).await else {
            return;
        };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    let mut body_read = buffer.len() - header_end;
    while body_read < content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => body_read += read,
        }
    }

    requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        authorization,
    });

    let (status, body) = {
        let mut routes = routes.lock().unwrap();
        match routes.get_mut(&format!("{method} {path}")) {
            Some(responses) if responses.len() > 1 => responses.pop_front().unwrap(),
            Some(responses) => responses.front().cloned().unwrap(),
            None => (404, r#"{"message":"not found"}"#.to_string()),
        }
    };

    let response = format!(
        "HTTP/1.1 {status} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
