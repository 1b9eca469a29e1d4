use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use gen_api::{GenApiClient, GenApiConfig, GenApiError};
use gen_contract::{
    cancel_signal, ChunkKind, GenerationRequest, GenerationTransport, Intent, NewRemoteEntry,
    PersonalizationProfile, RemoteError, RemoteHistory, SamplingProfile, SettingsSource,
    TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

fn allow_local_integration() -> bool {
    std::env::var("GEN_API_ALLOW_LOCAL_INTEGRATION")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
enum ScriptedResponse {
    Respond {
        status: u16,
        content_type: &'static str,
        chunks: Vec<ResponseChunk>,
    },
    Reset,
}

/// Shared between the accept loop and every connection task.
struct ServerState {
    base_url: String,
    scripts: Vec<ScriptedResponse>,
    /// Request lines in arrival order; its length doubles as the script cursor.
    requests: Mutex<Vec<String>>,
}

impl ServerState {
    fn next_response(&self, request_line: String) -> ScriptedResponse {
        let mut requests = self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = requests.len();
        requests.push(request_line);
        self.scripts
            .get(index)
            .cloned()
            .unwrap_or_else(|| response_json(500, r#"{"error":"unexpected request"}"#))
    }
}

/// One-shot HTTP/1.1 server replaying `scripts` in request order.
struct ScriptedServer {
    base_url: String,
    state: Arc<ServerState>,
    accept_loop: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let state = Arc::new(ServerState {
            base_url: format!("http://{addr}/api"),
            scripts,
            requests: Mutex::new(Vec::new()),
        });

        let accept_loop = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let _ = serve_connection(socket, &state).await;
                    });
                }
            }
        });

        Self {
            base_url: state.base_url.clone(),
            state,
            accept_loop,
        }
    }

    fn request_count(&self) -> usize {
        self.request_lines().len()
    }

    fn request_lines(&self) -> Vec<String> {
        self.state
            .requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn shutdown(&self) {
        self.accept_loop.abort();
    }
}

fn response_lines(status: u16, lines: &[&str]) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "text/event-stream",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: data_lines(lines),
        }],
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn data_lines(lines: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for line in lines {
        body.push_str("data: ");
        body.push_str(line);
        body.push('\n');
    }
    body.into_bytes()
}

fn request() -> GenerationRequest {
    GenerationRequest {
        prompt: "print jay".to_string(),
        context: None,
        intent: Intent::Generate,
        sampling: SamplingProfile {
            temperature: 0.2,
            top_p: 0.95,
            max_tokens: 256,
            include_comments: false,
            include_docstring: false,
            include_type_hints: false,
        },
        personalization: PersonalizationProfile::default(),
    }
}

fn client(server: &ScriptedServer) -> GenApiClient {
    let config = GenApiConfig::new(&server.base_url)
        .with_access_token("tok")
        .with_retries(3, Duration::from_millis(20));
    GenApiClient::new(config).expect("client")
}

#[tokio::test]
async fn stream_integration_successful_completion() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_lines(
        200,
        &[r#"{"text":"print("}"#, r#"{"text":"'jay')"}"#, "[DONE]"],
    )])
    .await;

    let stream = client(&server)
        .open(&request(), cancel_signal())
        .await
        .expect("stream should open");
    let events: Vec<_> = stream.collect().await;

    let kinds: Vec<_> = events
        .iter()
        .map(|event| event.as_ref().expect("chunk").kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ChunkKind::Start,
            ChunkKind::Token,
            ChunkKind::Token,
            ChunkKind::Done
        ]
    );
    let lines = server.request_lines();
    assert!(lines[0].starts_with("POST /api/generate/stream"));

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_error_line_ends_stream() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_lines(
        200,
        &[r#"{"text":"x"}"#, r#"{"error":"model crashed"}"#, r#"{"text":"late"}"#],
    )])
    .await;

    let events: Vec<_> = client(&server)
        .open(&request(), cancel_signal())
        .await
        .expect("stream should open")
        .collect()
        .await;

    let last = events.last().expect("events").as_ref().expect("chunk");
    assert_eq!(last.kind, ChunkKind::Error);
    assert_eq!(last.content, "model crashed");
    assert_eq!(events.len(), 3);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_retryable_then_success() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_json(503, r#"{"error":{"message":"overloaded"}}"#),
        response_lines(200, &["[DONE]"]),
    ])
    .await;

    let stream = timeout(
        Duration::from_secs(5),
        client(&server).open(&request(), cancel_signal()),
    )
    .await
    .expect("retry path should be bounded")
    .expect("stream should eventually open");
    let events: Vec<_> = stream.collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_unauthorized_fails_without_retry() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        401,
        r#"{"detail":"Invalid token."}"#,
    )])
    .await;

    let error = match client(&server).open(&request(), cancel_signal()).await {
        Ok(_) => panic!("stream should fail"),
        Err(error) => error,
    };
    assert_eq!(error, TransportError::Unauthorized { status: 401 });
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_cancellation_during_stream() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: data_lines(&[r#"{"text":"first\n"}"#]),
            },
            ResponseChunk {
                delay_ms: 400,
                bytes: data_lines(&[r#"{"text":"second"}"#, "[DONE]"]),
            },
        ],
    }])
    .await;

    let cancel = cancel_signal();
    let mut stream = client(&server)
        .open(&request(), Arc::clone(&cancel))
        .await
        .expect("stream should open");

    let mut seen = Vec::new();
    while let Some(event) = stream.next().await {
        let event = event.expect("chunk");
        if event.kind == ChunkKind::Token {
            cancel.store(true, Ordering::Release);
        }
        seen.push(event.kind);
    }

    assert_eq!(seen, vec![ChunkKind::Start, ChunkKind::Token]);
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_connection_reset_then_retry_exhausted() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
    ])
    .await;

    let result = timeout(
        Duration::from_secs(10),
        client(&server).stream_generation(&request(), cancel_signal()),
    )
    .await
    .expect("retry path should resolve");

    assert!(matches!(
        result,
        Err(GenApiError::RetryExhausted { status: None, .. })
    ));
    assert!(server.request_count() >= 4);

    server.shutdown();
}

#[tokio::test]
async fn history_integration_lists_paginated_sessions_and_entries() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_json(
            200,
            r#"{"results":[{"id":"s1","created_at":"2026-02-14T10:00:00Z"}],"next":"{base}/history/sessions?page=2"}"#,
        ),
        response_json(
            200,
            r#"{"results":[{"id":"s2","created_at":"2026-02-14T11:00:00Z"}],"next":null}"#,
        ),
        response_json(
            200,
            r#"[{"type":"question","content":"print jay","created_at":"2026-02-14T10:00:00Z"},{"type":"answer","content":"print('jay')","created_at":"2026-02-14T10:00:01Z"}]"#,
        ),
    ])
    .await;

    let client = client(&server);
    let sessions = client.list_sessions().await.expect("sessions");
    assert_eq!(sessions.len(), 2);
    assert!(server.request_lines()[1].starts_with("GET /api/history/sessions?page=2 "));

    let entries = client.session_entries("s1").await.expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].content, "print('jay')");

    server.shutdown();
}

#[tokio::test]
async fn history_integration_ignores_next_links_to_other_hosts() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        200,
        r#"{"results":[{"id":"s1","created_at":"2026-02-14T10:00:00Z"}],"next":"http://collector.example.invalid/history/sessions?page=2"}"#,
    )])
    .await;

    let client = client(&server);
    let sessions = client.list_sessions().await.expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn history_integration_create_session_and_entry() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_json(201, r#"{"id":"remote-7","title":"print jay"}"#),
        response_json(201, r#"{"id":1}"#),
    ])
    .await;

    let client = client(&server);
    let session_id = client.create_session("print jay").await.expect("session");
    assert_eq!(session_id, "remote-7");
    client
        .create_entry(&session_id, NewRemoteEntry::question("print jay"))
        .await
        .expect("entry");

    let lines = server.request_lines();
    assert!(lines[0].starts_with("POST /api/history/sessions "));
    assert!(lines[1].starts_with("POST /api/history/sessions/remote-7/entries "));

    server.shutdown();
}

#[tokio::test]
async fn history_integration_requires_credential() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(Vec::new()).await;
    let client = GenApiClient::new(GenApiConfig::new(&server.base_url)).expect("client");

    assert_eq!(
        client.list_sessions().await,
        Err(RemoteError::MissingCredential)
    );
    assert_eq!(server.request_count(), 0);

    server.shutdown();
}

#[tokio::test]
async fn settings_integration_reads_typed_values() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        200,
        r#"[{"key":"skill_level","value":"expert","type":"string"},{"key":"max_history","value":50,"type":"int"}]"#,
    )])
    .await;

    let settings = client(&server).fetch_settings().await.expect("settings");
    assert_eq!(settings.len(), 2);
    assert_eq!(settings[0].as_text(), Some("expert"));
    assert_eq!(settings[1].as_text(), None);

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_connection(mut socket: TcpStream, state: &ServerState) -> io::Result<()> {
    let request_line = read_request_head(&mut socket).await?;
    let (status, content_type, chunks) = match state.next_response(request_line) {
        ScriptedResponse::Reset => return Ok(()),
        ScriptedResponse::Respond {
            status,
            content_type,
            chunks,
        } => (status, content_type, chunks),
    };

    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        reason = status_reason(status),
    );
    socket.write_all(head.as_bytes()).await?;

    for chunk in chunks {
        if chunk.delay_ms > 0 {
            sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        // `{base}` in a scripted body expands to this server's base URL.
        let body = String::from_utf8_lossy(&chunk.bytes).replace("{base}", &state.base_url);
        write_chunk(&mut socket, body.as_bytes()).await?;
    }

    socket.write_all(b"0\r\n\r\n").await?;
    socket.shutdown().await
}

async fn write_chunk(socket: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    let mut framed = format!("{:X}\r\n", bytes.len()).into_bytes();
    framed.extend_from_slice(bytes);
    framed.extend_from_slice(b"\r\n");
    socket.write_all(&framed).await
}

/// Reads the request head and returns its first line. Any body is
/// read up to `Content-Length` so the client never sees a reset.
async fn read_request_head(socket: &mut TcpStream) -> io::Result<String> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    let head_end = loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break request.len();
        }
        request.extend_from_slice(&buffer[..n]);
        if let Some(pos) = request.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&request[..head_end.min(request.len())]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    let mut body_read = request.len().saturating_sub(head_end);
    while body_read < content_length {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        body_read += n;
    }

    Ok(head.lines().next().unwrap_or_default().to_string())
}
