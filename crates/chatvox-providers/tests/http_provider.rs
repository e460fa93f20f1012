//! HTTP provider against a minimal loopback server.

use chatvox_core::{EngineId, ProviderError, SynthesisProvider, SynthesisRequest};
use chatvox_providers::{HttpProvider, HttpProviderConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct Canned {
    status: &'static str,
    content_type: &'static str,
    extra_headers: &'static str,
    body: &'static [u8],
}

/// Serve one request with `canned` and hand back the raw request text.
async fn serve_once(canned: Canned) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/tts", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw);
            if let Some(split) = text.find("\r\n\r\n") {
                let content_length = text[..split]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if raw.len() >= split + 4 + content_length || n == 0 {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        let head = format!(
            "HTTP/1.1 {}\r\ncontent-type: {}\r\ncontent-length: {}\r\n{}connection: close\r\n\r\n",
            canned.status,
            canned.content_type,
            canned.body.len(),
            canned.extra_headers,
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(canned.body).await.unwrap();
        socket.shutdown().await.unwrap();
        let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
    });

    (url, rx)
}

fn provider(endpoint: String, api_key: Option<&str>) -> HttpProvider {
    let config = HttpProviderConfig {
        id: EngineId::new("loopback"),
        endpoint,
        api_key: None,
        api_key_env: None,
        cost_per_char: 0.00002,
        voices: Vec::new(),
        audio_field: "audio".into(),
        default_mime: "audio/mpeg".into(),
    };
    HttpProvider::new(config, api_key.map(str::to_string)).unwrap()
}

#[tokio::test]
async fn posts_text_and_voice_with_bearer_key() {
    let (url, request) = serve_once(Canned {
        status: "200 OK",
        content_type: "audio/mpeg",
        extra_headers: "",
        body: b"ID3fake",
    })
    .await;

    let audio = provider(url, Some("secret"))
        .synthesize(&SynthesisRequest::new("hello chat", Some("en-US-1".into())))
        .await
        .unwrap();
    assert_eq!(audio.bytes.as_ref(), b"ID3fake");
    assert_eq!(audio.mime, "audio/mpeg");

    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /tts"));
    assert!(raw.to_ascii_lowercase().contains("authorization: bearer secret"));
    assert!(raw.contains(r#""text":"hello chat""#));
    assert!(raw.contains(r#""voice":"en-US-1""#));
}

#[tokio::test]
async fn json_response_with_base64_audio() {
    let (url, _request) = serve_once(Canned {
        status: "200 OK",
        content_type: "application/json",
        extra_headers: "",
        body: br#"{"audio":"UklGRg==","mime":"audio/wav"}"#,
    })
    .await;

    let audio = provider(url, None)
        .synthesize(&SynthesisRequest::new("hi", None))
        .await
        .unwrap();
    assert_eq!(audio.bytes.as_ref(), b"RIFF");
    assert_eq!(audio.mime, "audio/wav");
}

#[tokio::test]
async fn unauthorized_maps_to_auth() {
    let (url, _request) = serve_once(Canned {
        status: "401 Unauthorized",
        content_type: "text/plain",
        extra_headers: "",
        body: b"bad key",
    })
    .await;

    let err = provider(url, Some("wrong"))
        .synthesize(&SynthesisRequest::new("hi", None))
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::auth("bad key"));
}

#[tokio::test]
async fn throttling_carries_retry_after() {
    let (url, _request) = serve_once(Canned {
        status: "429 Too Many Requests",
        content_type: "text/plain",
        extra_headers: "retry-after: 7\r\n",
        body: b"slow down",
    })
    .await;

    let err = provider(url, None)
        .synthesize(&SynthesisRequest::new("hi", None))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::RateLimited {
            retry_after_secs: Some(7)
        }
    );
}

#[tokio::test]
async fn server_error_maps_to_server() {
    let (url, _request) = serve_once(Canned {
        status: "503 Service Unavailable",
        content_type: "text/plain",
        extra_headers: "",
        body: b"overloaded",
    })
    .await;

    let err = provider(url, None)
        .synthesize(&SynthesisRequest::new("hi", None))
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::server(Some(503), "overloaded"));
}

#[tokio::test]
async fn connection_refused_is_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/tts", listener.local_addr().unwrap());
    drop(listener);

    let err = provider(url, None)
        .synthesize(&SynthesisRequest::new("hi", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Transport { .. }));
}
