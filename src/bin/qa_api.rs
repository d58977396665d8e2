use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use askdocs::config::{GeneratorArgs, ModelArgs, RetrievalArgs, RetryArgs};
use askdocs::logging::init_logging;
use askdocs::rate_limit::TokenBucket;
use askdocs::upload::decode_text;
use askdocs::{
    render_html, validate_upload, Answer, Answerer, Generator, Indexer, OpenAiEmbedder,
    QueryError, UploadError, MAX_UPLOAD_BYTES, NO_MATCH_MESSAGE,
};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "askdocs-qa-api",
    about = "HTTP API answering questions about the indexed documents"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "ASKDOCS_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory uploaded documents are saved to before indexing.
    #[arg(long, env = "ASKDOCS_INPUT_DIR", default_value = "Input")]
    upload_dir: PathBuf,

    /// Max requests per minute allowed (0 disables rate limiting).
    #[arg(long, default_value_t = 120)]
    max_requests_per_minute: u32,

    /// Rate-limit burst size (tokens available instantly).
    #[arg(long, default_value_t = 12)]
    rate_limit_burst: u32,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    generator: GeneratorArgs,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    #[command(flatten)]
    retry: RetryArgs,
}

type SharedAnswerer = Answerer<OpenAiEmbedder, Box<dyn Generator>>;

#[derive(Clone)]
struct AppState {
    answerer: Arc<SharedAnswerer>,
    indexer: Arc<Indexer<OpenAiEmbedder>>,
    upload_dir: Arc<PathBuf>,
    rate_limiter: Option<Arc<Mutex<TokenBucket>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum ResponseStatus {
    Answered,
    NoMatch,
    Uploaded,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    status: ResponseStatus,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

enum Submission {
    Question(String),
    Upload { file_name: String, bytes: Vec<u8> },
}

fn main() -> Result<()> {
    init_logging();
    let cli = ApiCli::parse();

    // Blocking HTTP clients must exist before the async runtime starts.
    let embedder = cli.model.build_embedder()?;
    let generator = cli.generator.build_generator(&cli.model)?;
    let retry = cli.retry.policy();
    let mut answerer = Answerer::new(embedder.clone(), generator, cli.retrieval.store())
        .with_settings(cli.retrieval.settings(&cli.generator)?)
        .with_retry(retry)
        .with_query_cache(cli.retrieval.query_cache_size);
    if let Some(audit) = cli.retrieval.audit() {
        answerer = answerer.with_audit_log(audit);
    }
    let indexer = Indexer::new(embedder, cli.retrieval.store()).with_retry(retry);

    let state = AppState {
        answerer: Arc::new(answerer),
        indexer: Arc::new(indexer),
        upload_dir: Arc::new(cli.upload_dir.clone()),
        rate_limiter: TokenBucket::new(cli.max_requests_per_minute, cli.rate_limit_burst)
            .map(|bucket| Arc::new(Mutex::new(bucket))),
    };
    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    // The last handle on the blocking clients is dropped outside the runtime.
    let result = runtime.block_on(serve(addr, state.clone()));
    drop(runtime);
    drop(state);
    result
}

async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/query", post(query_handler))
        // Leave headroom above the upload cap so oversized files get a JSON 400.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES * 2))
        .with_state(state);

    info!(%addr, "askdocs qa api listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn query_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<QueryResponse>, ApiError> {
    if let Some(limiter) = &state.rate_limiter {
        if !limiter.lock().await.try_acquire() {
            return Err(error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"));
        }
    }
    match read_submission(multipart).await? {
        Submission::Question(question) => answer_question(&state, question).await,
        Submission::Upload { file_name, bytes } => accept_upload(&state, &file_name, bytes).await,
    }
}

async fn read_submission(mut multipart: Multipart) -> Result<Submission, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("malformed form: {err}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| bad_request(format!("failed to read upload: {err}")))?;
                return Ok(Submission::Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("query") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| bad_request(format!("failed to read query: {err}")))?;
                return Ok(Submission::Question(text));
            }
            _ => continue,
        }
    }
    Err(bad_request("expected a `query` field or a `file` upload"))
}

async fn answer_question(state: &AppState, question: String) -> Result<Json<QueryResponse>, ApiError> {
    let question = question.trim().to_string();
    if question.is_empty() {
        return Err(bad_request("Please enter a question."));
    }
    let start = Instant::now();
    let answerer = state.answerer.clone();
    let outcome = tokio::task::spawn_blocking(move || answerer.ask(&question))
        .await
        .map_err(|err| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("query task join error: {err}"),
            )
        })?;
    info!(latency_ms = start.elapsed().as_secs_f64() * 1000.0, "query handled");
    match outcome {
        Ok(Answer::Answered { text, .. }) => Ok(Json(QueryResponse {
            status: ResponseStatus::Answered,
            message: render_html(&text),
        })),
        Ok(Answer::NoMatch) => Ok(Json(QueryResponse {
            status: ResponseStatus::NoMatch,
            message: NO_MATCH_MESSAGE.to_string(),
        })),
        Err(err) => Err(query_error(&err)),
    }
}

async fn accept_upload(
    state: &AppState,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<Json<QueryResponse>, ApiError> {
    let name = validate_upload(file_name, bytes.len()).map_err(upload_error)?;
    let text = decode_text(&bytes).map_err(upload_error)?;

    tokio::fs::create_dir_all(state.upload_dir.as_path())
        .await
        .map_err(|err| internal_error(format!("failed to create upload directory: {err}")))?;
    let path = state.upload_dir.join(&name);
    tokio::fs::write(&path, text.as_bytes())
        .await
        .map_err(|err| internal_error(format!("failed to save {name}: {err}")))?;
    info!(document = %name, bytes = bytes.len(), "upload saved");

    let indexer = state.indexer.clone();
    let document = name.clone();
    tokio::task::spawn_blocking(move || match indexer.index_document(&document, &text) {
        Ok(record) => info!(
            document = %document,
            fragments = record.fragments.len(),
            "uploaded document indexed"
        ),
        Err(err) => error!(document = %document, error = %err, "failed to index upload"),
    });

    Ok(Json(QueryResponse {
        status: ResponseStatus::Uploaded,
        message: format!("File {name} uploaded successfully and is being indexed."),
    }))
}

fn query_error(err: &QueryError) -> ApiError {
    match err {
        QueryError::TransientService { .. } => {
            warn!(error = %err, "model service unavailable");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "An error occurred contacting the model service, please try again later.",
            )
        }
        other => internal_error(other.to_string()),
    }
}

fn upload_error(err: UploadError) -> ApiError {
    bad_request(err.to_string())
}

fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn internal_error(message: impl Into<String>) -> ApiError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}
