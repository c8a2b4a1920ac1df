use crate::format::{FormattedThought, Formatter};
use crate::markov::generate_thought;
use crate::vocab::{DEFAULT_MAX_WORD_LENGTH, Vocabulary, VocabularyVersion, format_thoughtword};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

type SharedState = Arc<AppState>;

pub struct AppState {
    pub formatter: Formatter,
    /// Current vocabulary snapshot; replaced wholesale by `/api/words`.
    pub vocabulary: RwLock<Arc<Vocabulary>>,
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    /// Thoughtwords the server starts with.
    pub words: Vec<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            words: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    init_tracing();
    let state = Arc::new(AppState {
        formatter: Formatter::new(),
        vocabulary: RwLock::new(Arc::new(Vocabulary::from_words(config.words))),
    });
    let router = build_router(state);
    info!(%config.addr, "Binding HTTP listener");
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/format", post(api_format))
        .route("/api/generate", post(api_generate))
        .route("/api/normalize", get(api_normalize))
        .route("/api/words", post(api_set_words))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn home(State(state): State<SharedState>) -> impl IntoResponse {
    let words = state.vocabulary.read().len();
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Thoughtwords • Formatting Service</title>
  </head>
  <body>
    <main>
      <h1>Thoughtwords</h1>
      <p>Auto-link thoughtwords, soft-break overlong tokens, and generate pseudo-thoughts.</p>
      <p>Current vocabulary: {words} words.</p>
      <ul>
        <li><code>POST /api/format</code> &mdash; render a thought</li>
        <li><code>POST /api/generate</code> &mdash; Markov pseudo-thought</li>
        <li><code>GET /api/normalize?word=...</code> &mdash; canonical thoughtword</li>
        <li><code>POST /api/words</code> &mdash; replace the vocabulary snapshot</li>
      </ul>
    </main>
  </body>
</html>"#
    ))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct FormatRequest {
    text: String,
    /// Overrides the server's vocabulary snapshot for this call.
    #[serde(default)]
    words: Option<Vec<String>>,
}

async fn api_format(
    State(state): State<SharedState>,
    Json(request): Json<FormatRequest>,
) -> Json<FormattedThought> {
    let vocabulary = match request.words {
        Some(words) => Arc::new(Vocabulary::from_words(words)),
        None => Arc::clone(&state.vocabulary.read()),
    };
    Json(state.formatter.format(&request.text, &vocabulary))
}

fn default_block_size() -> usize {
    2
}

fn default_length() -> usize {
    100
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    corpus: String,
    #[serde(default = "default_block_size")]
    block_size: usize,
    #[serde(default = "default_length")]
    length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeneratePayload {
    text: String,
    word_count: usize,
}

async fn api_generate(
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GeneratePayload>, ApiError> {
    let text = generate_thought(&request.corpus, request.block_size, request.length)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    let word_count = text.split_whitespace().count();
    Ok(Json(GeneratePayload { text, word_count }))
}

#[derive(Debug, Deserialize)]
struct NormalizeParams {
    word: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct NormalizePayload {
    word: String,
    thoughtword: String,
}

async fn api_normalize(Query(params): Query<NormalizeParams>) -> Json<NormalizePayload> {
    let thoughtword = format_thoughtword(&params.word, DEFAULT_MAX_WORD_LENGTH);
    Json(NormalizePayload {
        word: params.word,
        thoughtword,
    })
}

#[derive(Debug, Deserialize)]
struct WordsRequest {
    words: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WordsPayload {
    count: usize,
    version: VocabularyVersion,
}

async fn api_set_words(
    State(state): State<SharedState>,
    Json(request): Json<WordsRequest>,
) -> Json<WordsPayload> {
    let vocabulary = Arc::new(Vocabulary::from_words(request.words));
    let payload = WordsPayload {
        count: vocabulary.len(),
        version: vocabulary.version(),
    };
    *state.vocabulary.write() = vocabulary;
    info!(count = payload.count, "replaced vocabulary snapshot");
    Json(payload)
}
