use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use vietrag::config::EmbeddingConfig;
use vietrag::embedding::{EmbedError, EmbeddingProvider, RemoteBackend, RetryPolicy};

/// One request as the stub server saw it.
#[derive(Debug, Clone)]
struct Recorded {
    request_line: String,
    authorization: Option<String>,
    inputs: String,
}

/// Minimal HTTP/1.1 server answering each connection with the next scripted
/// `(status, body)`. Once the script runs out it answers 500.
struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    async fn start(replies: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let mut replies: VecDeque<(u16, String)> = replies
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let Ok(recorded) = read_request(&mut socket).await else {
                    continue;
                };
                seen.lock().unwrap().push(recorded);

                let (status, body) = replies
                    .pop_front()
                    .unwrap_or((500, r#"{"error":"script exhausted"}"#.to_string()));
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { addr, requests }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn inputs(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.inputs).collect()
    }

    fn provider(&self, attempts: u32) -> EmbeddingProvider {
        let config = EmbeddingConfig {
            provider: "remote".into(),
            remote_base_url: format!("http://{}/", self.addr),
            request_timeout_secs: 5,
            embedding_dim: 2,
            ..EmbeddingConfig::default()
        };
        let backend = RemoteBackend::new(&config, Some("test-token".into())).unwrap();
        EmbeddingProvider::remote(backend, config.embedding_dim)
            .with_retry(RetryPolicy::immediate(attempts))
    }
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let header = |name: &str| {
        head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };
    let content_length: usize = header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body: Value = serde_json::from_slice(&buf[header_end..header_end + content_length])
        .unwrap_or(Value::Null);

    Ok(Recorded {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        authorization: header("authorization"),
        inputs: body["inputs"].as_str().unwrap_or_default().to_string(),
    })
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const TOKEN_LEVEL: &str = "[[1.0, 0.0], [3.0, 4.0]]";

#[tokio::test]
async fn sends_one_request_per_text_in_order() {
    let server = StubServer::start(vec![
        (200, "[0.6, 0.8]"),
        (200, TOKEN_LEVEL),
        (200, "[[[0.0, 2.0]]]"),
    ])
    .await;
    let provider = server.provider(3);

    let vectors = provider
        .embed(&texts(&["Xin chào", "Hà Nội", "Hello"]))
        .await
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(server.inputs(), texts(&["Xin chào", "Hà Nội", "Hello"]));
    for request in &requests {
        // The default model is swapped for its hosted stand-in.
        assert_eq!(request.request_line, "POST /models/BAAI/bge-m3 HTTP/1.1");
        assert_eq!(request.authorization.as_deref(), Some("Bearer test-token"));
    }

    assert_eq!(vectors.len(), 3);
    let expected = [
        [0.6, 0.8],
        [std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2],
        [0.0, 1.0],
    ];
    for (vector, expected) in vectors.iter().zip(expected) {
        assert_eq!(vector.len(), 2);
        for (a, b) in vector.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6, "{vector:?} != {expected:?}");
        }
    }
}

#[tokio::test]
async fn rate_limit_is_retried_until_attempts_run_out() {
    let limited = r#"{"error":"Rate limit reached"}"#;
    let server = StubServer::start(vec![(429, limited), (429, limited), (429, limited)]).await;
    let provider = server.provider(3);

    let err = provider.embed(&texts(&["xin chào"])).await.unwrap_err();

    assert!(matches!(err, EmbedError::RateLimit(_)), "{err}");
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn server_error_retries_the_whole_batch() {
    let server = StubServer::start(vec![
        (503, r#"{"error":"Model is loading"}"#),
        (200, TOKEN_LEVEL),
        (200, TOKEN_LEVEL),
    ])
    .await;
    let provider = server.provider(3);

    let vectors = provider.embed(&texts(&["một", "hai"])).await.unwrap();

    assert_eq!(vectors.len(), 2);
    assert_eq!(server.inputs(), texts(&["một", "một", "hai"]));
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = StubServer::start(vec![(400, r#"{"error":"Input should be a string"}"#)]).await;
    let provider = server.provider(3);

    let err = provider.embed(&texts(&["xin chào"])).await.unwrap_err();

    match err {
        EmbedError::Inference(msg) => assert!(msg.contains("400"), "{msg}"),
        other => panic!("expected Inference, got {other:?}"),
    }
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn ragged_response_is_a_dimension_error() {
    let server = StubServer::start(vec![(200, "[[1.0, 0.0], [3.0]]")]).await;
    let provider = server.provider(3);

    let err = provider.embed(&texts(&["xin chào"])).await.unwrap_err();

    assert!(matches!(err, EmbedError::DimensionMismatch { .. }), "{err}");
    assert_eq!(server.requests().len(), 1);
}
