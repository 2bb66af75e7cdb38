//! Common utilities for integration tests
//!
//! `spawn_upstream` serves fake Whisper, chat-completion and ElevenLabs
//! endpoints on an ephemeral port and records what the relay sent them.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use relay_server::{app, config::ServerConfig, AppState};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Stand-in for the MP3 the synthesizer returns (starts with an MPEG frame sync)
pub const FAKE_MP3: &[u8] = &[0xFF, 0xFB, 0x90, 0x64, 0x00, 0x0F, 0xF0, 0x00, 0x01, 0x02];

/// Appears only in fake upstream error bodies, so tests can check it never leaks
pub const UPSTREAM_SECRET_DETAIL: &str = "upstream-internal-detail";

pub const OPENAI_KEY: &str = "sk-test";
pub const ELEVENLABS_KEY: &str = "xi-test";
pub const VOICE_ID: &str = "test-voice";

pub struct FakeBehavior {
    /// `None` answers with a JSON body that has no `text` field
    pub transcript: Option<String>,
    pub stt_statuses: Vec<StatusCode>,
    pub llm_status: StatusCode,
    pub reply: String,
    /// Consumed one per synthesis call; `200 OK` once exhausted
    pub tts_statuses: Vec<StatusCode>,
    pub audio: Vec<u8>,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            transcript: Some("hello".to_string()),
            stt_statuses: Vec::new(),
            llm_status: StatusCode::OK,
            reply: "Hi there!".to_string(),
            tts_statuses: Vec::new(),
            audio: FAKE_MP3.to_vec(),
        }
    }
}

#[derive(Default)]
pub struct Recorded {
    pub stt_calls: AtomicUsize,
    pub llm_calls: AtomicUsize,
    pub tts_calls: AtomicUsize,
    pub stt_auth: Mutex<Option<String>>,
    pub stt_fields: Mutex<HashMap<String, String>>,
    pub stt_file_name: Mutex<Option<String>>,
    pub stt_audio: Mutex<Option<Vec<u8>>>,
    pub llm_auth: Mutex<Option<String>>,
    pub llm_body: Mutex<Option<Value>>,
    pub tts_api_key: Mutex<Option<String>>,
    pub tts_voice: Mutex<Option<String>>,
    pub tts_body: Mutex<Option<Value>>,
}

impl Recorded {
    pub fn stt_calls(&self) -> usize {
        self.stt_calls.load(Ordering::SeqCst)
    }

    pub fn llm_calls(&self) -> usize {
        self.llm_calls.load(Ordering::SeqCst)
    }

    pub fn tts_calls(&self) -> usize {
        self.tts_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.llm_body
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|body| body["messages"][0]["content"].as_str().map(str::to_string))
    }
}

struct FakeState {
    transcript: Option<String>,
    stt_statuses: Mutex<VecDeque<StatusCode>>,
    llm_status: StatusCode,
    reply: String,
    tts_statuses: Mutex<VecDeque<StatusCode>>,
    audio: Vec<u8>,
    recorded: Arc<Recorded>,
}

pub struct FakeUpstream {
    pub base_url: String,
    pub recorded: Arc<Recorded>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn upstream_failure(status: StatusCode) -> Response {
    (
        status,
        Json(json!({ "detail": UPSTREAM_SECRET_DETAIL })),
    )
        .into_response()
}

async fn transcriptions(
    State(s): State<Arc<FakeState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    s.recorded.stt_calls.fetch_add(1, Ordering::SeqCst);
    *s.recorded.stt_auth.lock().unwrap() = bearer(&headers);

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap_or_default();
        if name == "file" {
            *s.recorded.stt_file_name.lock().unwrap() = file_name;
            *s.recorded.stt_audio.lock().unwrap() = Some(data.to_vec());
        } else {
            s.recorded
                .stt_fields
                .lock()
                .unwrap()
                .insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }

    let status = s
        .stt_statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(StatusCode::OK);
    if status != StatusCode::OK {
        return upstream_failure(status);
    }

    match &s.transcript {
        Some(text) => Json(json!({ "text": text })).into_response(),
        None => Json(json!({ "duration": 1.0 })).into_response(),
    }
}

async fn chat_completions(
    State(s): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    s.recorded.llm_calls.fetch_add(1, Ordering::SeqCst);
    *s.recorded.llm_auth.lock().unwrap() = bearer(&headers);
    *s.recorded.llm_body.lock().unwrap() = Some(body);

    if s.llm_status != StatusCode::OK {
        return upstream_failure(s.llm_status);
    }

    Json(json!({
        "id": "chatcmpl-test",
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": s.reply } }
        ]
    }))
    .into_response()
}

async fn text_to_speech(
    State(s): State<Arc<FakeState>>,
    Path(voice_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    s.recorded.tts_calls.fetch_add(1, Ordering::SeqCst);
    *s.recorded.tts_api_key.lock().unwrap() = headers
        .get("xi-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *s.recorded.tts_voice.lock().unwrap() = Some(voice_id);
    *s.recorded.tts_body.lock().unwrap() = Some(body);

    let status = s
        .tts_statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(StatusCode::OK);
    if status != StatusCode::OK {
        return upstream_failure(status);
    }

    ([(header::CONTENT_TYPE, "audio/mpeg")], s.audio.clone()).into_response()
}

/// Serve the fake upstream APIs on an ephemeral port
pub async fn spawn_upstream(behavior: FakeBehavior) -> FakeUpstream {
    let recorded = Arc::new(Recorded::default());
    let state = Arc::new(FakeState {
        transcript: behavior.transcript,
        stt_statuses: Mutex::new(behavior.stt_statuses.into()),
        llm_status: behavior.llm_status,
        reply: behavior.reply,
        tts_statuses: Mutex::new(behavior.tts_statuses.into()),
        audio: behavior.audio,
        recorded: recorded.clone(),
    });

    let router = Router::new()
        .route("/v1/audio/transcriptions", post(transcriptions))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/text-to-speech/{voice_id}", post(text_to_speech))
        .with_state(state);

    let addr = serve(router).await;
    FakeUpstream {
        base_url: format!("http://{addr}/v1"),
        recorded,
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Relay config pointing every stage at `upstream`, with a short retry delay
pub fn test_config(upstream: &FakeUpstream, extra: &[(&str, &str)]) -> ServerConfig {
    let mut vars: HashMap<String, String> = [
        ("OPENAI_API_KEY", OPENAI_KEY),
        ("ELEVENLABS_API_KEY", ELEVENLABS_KEY),
        ("VOICE_ID", VOICE_ID),
        ("OPENAI_BASE_URL", upstream.base_url.as_str()),
        ("ELEVENLABS_BASE_URL", upstream.base_url.as_str()),
        ("RETRY_DELAY_MS", "5"),
        ("UPSTREAM_TIMEOUT_SECS", "5"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    ServerConfig::from_lookup(move |key: &str| vars.get(key).cloned())
        .expect("test config should be complete")
}

/// Create a test app instance backed by the real router
pub fn create_test_app(config: ServerConfig) -> Router {
    app(AppState::new(config).expect("Failed to build app state for tests"))
}

/// Serve the relay itself on an ephemeral port (needed for WebSocket tests)
pub async fn spawn_relay(config: ServerConfig) -> SocketAddr {
    serve(create_test_app(config)).await
}

/// 100 ms of a 440 Hz tone as 16-bit mono PCM WAV
pub fn wav_fixture() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..1_600 {
            let t = i as f32 / 16_000.0;
            let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin();
            writer
                .write_sample((sample * i16::MAX as f32 * 0.5) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub const BOUNDARY: &str = "relay-test-boundary";

/// Hand-built `multipart/form-data` body with a single file field
pub fn multipart_body(field: &str, file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
