use crate::{
    Error, Label, Moderator, SessionHandle, SessionStore, TICKET_FILENAME, TOXIC_THRESHOLD,
    TrackOutcome, Verdict,
};
use askama::Template;
use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;
pub const SESSION_COOKIE: &str = "toxguard_session";

#[derive(Clone)]
pub struct AppState {
    pub moderator: Moderator,
    pub sessions: SessionStore,
}

#[derive(Debug, Clone, Copy)]
struct Chrome {
    body_class: &'static str,
    main_class: &'static str,
    card_class: &'static str,
    eyebrow_class: &'static str,
    headline_class: &'static str,
    lede_class: &'static str,
    input_class: &'static str,
    button_class: &'static str,
    toxic_class: &'static str,
    safe_class: &'static str,
    note_class: &'static str,
}

impl Chrome {
    const NEON: Chrome = Chrome {
        body_class: "bg-black text-white",
        main_class: "min-h-screen flex flex-col items-center justify-start py-10 px-4",
        card_class: "max-w-3xl w-full space-y-6",
        eyebrow_class: "uppercase tracking-wide text-sm text-slate-400",
        headline_class: "text-5xl font-black text-center text-[#00ffcc]",
        lede_class: "text-lg text-slate-300",
        input_class: "w-full rounded-md bg-[#111111] border-2 border-[#0aff9d] px-3 py-2 text-white font-semibold",
        button_class: "inline-flex items-center rounded-md bg-[#00ff66] border-2 border-white px-4 py-2 text-black font-extrabold",
        toxic_class: "text-3xl font-extrabold text-red-400",
        safe_class: "text-3xl font-extrabold text-[#00ffcc]",
        note_class: "text-sm text-[#aaaaaa]",
    };
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub max_sessions: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_sessions: crate::DEFAULT_MAX_SESSIONS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(config: WebConfig, moderator: Moderator) -> Result<(), WebError> {
    let state = Arc::new(AppState {
        moderator,
        sessions: SessionStore::new(config.max_sessions),
    });
    let router = build_router(state);
    info!(
        addr = %config.addr,
        max_sessions = config.max_sessions,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::ClassifierUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Lexicon(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(error = %err, "moderation request failed");
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/analyze", get(analyze_form).post(analyze_html))
        .route("/rewrite", get(rewrite_form).post(rewrite_html))
        .route("/clean", get(clean_form).post(clean_html))
        .route("/ticket", get(download_ticket))
        .route("/api/analyze", post(api_analyze))
        .route("/api/rewrite", post(api_rewrite))
        .route("/api/clean", post(api_clean))
        .route("/api/lexicon", get(api_lexicon))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new()),
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

/// The session bound to a request, plus the cookie to send back when the
/// session id was just issued.
struct SessionContext {
    id: String,
    handle: SessionHandle,
    set_cookie: Option<HeaderValue>,
}

impl SessionContext {
    fn open(state: &AppState, headers: &HeaderMap) -> Self {
        let requested = session_cookie(headers);
        let (id, handle, issued) = state.sessions.open(requested.as_deref());
        let set_cookie = issued.then(|| session_cookie_header(&id)).flatten();
        Self {
            id,
            handle,
            set_cookie,
        }
    }

    fn respond(self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if let Some(cookie) = self.set_cookie {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        response
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

fn session_cookie_header(id: &str) -> Option<HeaderValue> {
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    HeaderValue::from_str(&cookie.to_string()).ok()
}

async fn run_blocking<T, F>(job: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| ApiError::internal(format!("classifier task failed: {err}")))?
        .map_err(ApiError::from)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnalyzeSummary {
    label: Label,
    toxic_count: usize,
    threshold: usize,
    ticket_ready: bool,
    ticket_url: Option<String>,
}

impl AnalyzeSummary {
    fn from_outcome(outcome: &TrackOutcome) -> Self {
        let ticket_ready = outcome.ticket.is_some();
        Self {
            label: outcome.label,
            toxic_count: outcome.toxic_count,
            threshold: TOXIC_THRESHOLD,
            ticket_ready,
            ticket_url: ticket_ready.then(|| "/ticket".to_string()),
        }
    }
}

/// Classifies `text` for the analyzer and parks any emitted ticket in the
/// session until the client fetches it.
async fn track(
    state: &AppState,
    session: &SessionContext,
    text: String,
) -> Result<Option<AnalyzeSummary>, ApiError> {
    let moderator = state.moderator.clone();
    let handle = Arc::clone(&session.handle);
    let summary = run_blocking(move || {
        let mut guard = handle.lock();
        let outcome = moderator.classify_and_track(&mut guard.accountant, &text)?;
        Ok(outcome.map(|outcome| {
            let summary = AnalyzeSummary::from_outcome(&outcome);
            if let Some(ticket) = outcome.ticket {
                guard.stash_ticket(ticket);
            }
            summary
        }))
    })
    .await?;
    if summary.as_ref().is_some_and(|s| s.ticket_ready) {
        info!(session = %session.id, "warning ticket ready for download");
    }
    Ok(summary)
}

#[derive(Debug, Deserialize)]
struct TextForm {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Copy)]
enum Tool {
    Analyzer,
    Rewriter,
    Cleaner,
}

impl Tool {
    const ALL: [Tool; 3] = [Tool::Analyzer, Tool::Rewriter, Tool::Cleaner];

    fn path(self) -> &'static str {
        match self {
            Tool::Analyzer => "/analyze",
            Tool::Rewriter => "/rewrite",
            Tool::Cleaner => "/clean",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Tool::Analyzer => "AI Comment Detector",
            Tool::Rewriter => "Toxic Word Dictionary",
            Tool::Cleaner => "Toxic Pong",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Tool::Analyzer => "Type your message:",
            Tool::Rewriter => "Enter a sentence:",
            Tool::Cleaner => "Enter a sentence to clean:",
        }
    }

    fn button(self) -> &'static str {
        match self {
            Tool::Analyzer => "Analyze",
            Tool::Rewriter => "Rewrite Politely",
            Tool::Cleaner => "Start Cleaning",
        }
    }

    fn blurb(self) -> &'static str {
        match self {
            Tool::Analyzer => "Chat-style toxicity check. Repeated toxic messages issue a warning ticket.",
            Tool::Rewriter => "(ML detection + polite rewrite)",
            Tool::Cleaner => "(ML detection + toxic-word removal)",
        }
    }
}

/// What a tool page shows below its form.
struct ToolResult {
    toxic: bool,
    headline: String,
    detail: Option<String>,
    note: Option<&'static str>,
    warning: Option<String>,
    download: bool,
}

impl ToolResult {
    fn analyzed(summary: &AnalyzeSummary) -> Self {
        let toxic = summary.label.is_toxic();
        Self {
            toxic,
            headline: if toxic { "Toxic" } else { "Safe Message" }.to_string(),
            detail: None,
            note: Some(if toxic {
                "(Note: This result is based on dataset patterns and may not reflect actual intention.)"
            } else {
                "(Based on dataset patterns, no harmful language detected.)"
            }),
            warning: summary.ticket_ready.then(|| {
                format!("{TOXIC_THRESHOLD} Toxic Messages Detected — Issuing Warning Ticket...")
            }),
            download: summary.ticket_ready,
        }
    }

    fn rewritten(verdict: &Verdict) -> Self {
        match &verdict.output {
            Some(output) if verdict.label.is_toxic() => Self {
                toxic: true,
                headline: "This sentence was flagged toxic by the ML model.".to_string(),
                detail: Some(format!("Polite Rewrite: {output}")),
                note: Some("(Note: Rewrite is based on dataset patterns + dictionary.)"),
                warning: None,
                download: false,
            },
            _ => Self::safe(
                "This sentence is safe according to the ML model.",
                "No rewrite needed.",
            ),
        }
    }

    fn cleaned(verdict: &Verdict) -> Self {
        match &verdict.output {
            Some(output) if verdict.label.is_toxic() => Self {
                toxic: true,
                headline: "Toxic sentence detected by ML model.".to_string(),
                detail: Some(format!("Cleaned Sentence: {output}")),
                note: None,
                warning: None,
                download: false,
            },
            _ => Self::safe("Sentence is already clean (ML model).", "No cleaning needed."),
        }
    }

    fn safe(headline: &str, detail: &str) -> Self {
        Self {
            toxic: false,
            headline: headline.to_string(),
            detail: Some(detail.to_string()),
            note: None,
            warning: None,
            download: false,
        }
    }
}

async fn home() -> impl IntoResponse {
    let template = HomeTemplate {
        chrome: Chrome::NEON,
        tools: Tool::ALL
            .iter()
            .map(|tool| ToolLink {
                href: tool.path(),
                title: tool.title(),
                blurb: tool.blurb(),
            })
            .collect(),
        threshold: TOXIC_THRESHOLD,
        version: env!("CARGO_PKG_VERSION"),
    };
    render_html(StatusCode::OK, template.render())
}

async fn analyze_form() -> Response {
    render_tool(Tool::Analyzer, "", None, StatusCode::OK)
}

async fn rewrite_form() -> Response {
    render_tool(Tool::Rewriter, "", None, StatusCode::OK)
}

async fn clean_form() -> Response {
    render_tool(Tool::Cleaner, "", None, StatusCode::OK)
}

async fn analyze_html(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<TextForm>,
) -> Response {
    let session = SessionContext::open(&state, &headers);
    let response = match track(&state, &session, form.text.clone()).await {
        Ok(summary) => render_tool(
            Tool::Analyzer,
            &form.text,
            summary.as_ref().map(ToolResult::analyzed),
            StatusCode::OK,
        ),
        Err(err) => render_error_page(err),
    };
    session.respond(response)
}

async fn rewrite_html(State(state): State<SharedState>, Form(form): Form<TextForm>) -> Response {
    let moderator = state.moderator.clone();
    let text = form.text.clone();
    match run_blocking(move || moderator.classify_and_rewrite(&text)).await {
        Ok(verdict) => render_tool(
            Tool::Rewriter,
            &form.text,
            verdict.as_ref().map(ToolResult::rewritten),
            StatusCode::OK,
        ),
        Err(err) => render_error_page(err),
    }
}

async fn clean_html(State(state): State<SharedState>, Form(form): Form<TextForm>) -> Response {
    let moderator = state.moderator.clone();
    let text = form.text.clone();
    match run_blocking(move || moderator.classify_and_clean(&text)).await {
        Ok(verdict) => render_tool(
            Tool::Cleaner,
            &form.text,
            verdict.as_ref().map(ToolResult::cleaned),
            StatusCode::OK,
        ),
        Err(err) => render_error_page(err),
    }
}

async fn download_ticket(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let session = SessionContext::open(&state, &headers);
    let pending = session.handle.lock().take_ticket();
    let response = match pending {
        Some(ready) => {
            let disposition = format!("attachment; filename=\"{TICKET_FILENAME}\"");
            (
                [
                    (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                    (header::CACHE_CONTROL, "no-store".to_string()),
                ],
                ready.pdf,
            )
                .into_response()
        }
        None => ApiError::not_found("No warning ticket is waiting for this session").into_response(),
    };
    session.respond(response)
}

async fn api_analyze(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<TextForm>,
) -> Response {
    let session = SessionContext::open(&state, &headers);
    let response = match track(&state, &session, request.text).await {
        Ok(Some(summary)) => Json(summary).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    };
    session.respond(response)
}

async fn api_rewrite(
    State(state): State<SharedState>,
    Json(request): Json<TextForm>,
) -> Result<Response, ApiError> {
    let moderator = state.moderator.clone();
    let verdict = run_blocking(move || moderator.classify_and_rewrite(&request.text)).await?;
    Ok(verdict_response(verdict))
}

async fn api_clean(
    State(state): State<SharedState>,
    Json(request): Json<TextForm>,
) -> Result<Response, ApiError> {
    let moderator = state.moderator.clone();
    let verdict = run_blocking(move || moderator.classify_and_clean(&request.text)).await?;
    Ok(verdict_response(verdict))
}

fn verdict_response(verdict: Option<Verdict>) -> Response {
    match verdict {
        Some(verdict) => Json(verdict).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LexiconEntryPayload {
    term: String,
    replacement: String,
}

async fn api_lexicon(State(state): State<SharedState>) -> Json<Vec<LexiconEntryPayload>> {
    let entries = state
        .moderator
        .lexicon()
        .entries()
        .into_iter()
        .map(|(term, replacement)| LexiconEntryPayload {
            term,
            replacement: replacement.to_string(),
        })
        .collect();
    Json(entries)
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "toxguard-web",
        "sessions": state.sessions.len(),
    }))
}

fn render_tool(tool: Tool, text: &str, result: Option<ToolResult>, status: StatusCode) -> Response {
    let template = ToolTemplate {
        chrome: Chrome::NEON,
        path: tool.path(),
        title: tool.title(),
        prompt: tool.prompt(),
        button: tool.button(),
        blurb: tool.blurb(),
        text,
        result,
        ticket_filename: TICKET_FILENAME,
    };
    render_html(status, template.render())
}

fn render_error_page(err: ApiError) -> Response {
    let template = ErrorTemplate {
        chrome: Chrome::NEON,
        message: &err.message,
    };
    render_html(err.status, template.render())
}

fn render_html(status: StatusCode, rendered: askama::Result<String>) -> Response {
    match rendered {
        Ok(body) => (status, Html(body)).into_response(),
        Err(err) => ApiError::internal(format!("template error: {err}")).into_response(),
    }
}

struct ToolLink {
    href: &'static str,
    title: &'static str,
    blurb: &'static str,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>AI Comment Detector</title>
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }}">
        <p class="{{ chrome.eyebrow_class }}">toxguard v{{ version }}</p>
        <h1 class="{{ chrome.headline_class }}">AI Comment Detector</h1>
        <p class="{{ chrome.lede_class }}">Check messages for toxic language, get a polite rewrite, or strip the offending words. {{ threshold }} toxic messages in one session issue a warning ticket.</p>
        <ul class="space-y-4">
          {% for tool in tools %}
          <li>
            <a href="{{ tool.href }}" class="{{ chrome.button_class }}">{{ tool.title }}</a>
            <p class="{{ chrome.note_class }}">{{ tool.blurb }}</p>
          </li>
          {% endfor %}
        </ul>
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct HomeTemplate {
    chrome: Chrome,
    tools: Vec<ToolLink>,
    threshold: usize,
    version: &'static str,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ title }}</title>
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }}">
        <nav class="flex gap-4 text-sm">
          <a href="/analyze">Chatbot</a>
          <a href="/rewrite">Toxic Word Dictionary</a>
          <a href="/clean">Toxic Pong</a>
        </nav>
        <h1 class="{{ chrome.headline_class }}">{{ title }}</h1>
        <form method="post" action="{{ path }}" class="space-y-3">
          <label for="text" class="{{ chrome.lede_class }}">{{ prompt }}</label>
          <input id="text" name="text" type="text" value="{{ text }}" class="{{ chrome.input_class }}" autocomplete="off" />
          <p class="{{ chrome.note_class }}">{{ blurb }}</p>
          <button type="submit" class="{{ chrome.button_class }}">{{ button }}</button>
        </form>
        {% if let Some(result) = result %}
        <section id="result" class="space-y-2">
          {% if result.toxic %}
          <p class="{{ chrome.toxic_class }}">{{ result.headline }}</p>
          {% else %}
          <p class="{{ chrome.safe_class }}">{{ result.headline }}</p>
          {% endif %}
          {% if let Some(detail) = result.detail %}
          <p class="{{ chrome.lede_class }}">{{ detail }}</p>
          {% endif %}
          {% if let Some(note) = result.note %}
          <p class="{{ chrome.note_class }}">{{ note }}</p>
          {% endif %}
          {% if let Some(warning) = result.warning %}
          <p class="text-yellow-300 font-bold" role="alert">{{ warning }}</p>
          {% endif %}
          {% if result.download %}
          <a id="auto_ticket" href="/ticket" download="{{ ticket_filename }}" class="{{ chrome.button_class }}">Download warning ticket</a>
          <script>document.getElementById('auto_ticket').click();</script>
          {% endif %}
        </section>
        {% endif %}
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct ToolTemplate<'a> {
    chrome: Chrome,
    path: &'static str,
    title: &'static str,
    prompt: &'static str,
    button: &'static str,
    blurb: &'static str,
    text: &'a str,
    result: Option<ToolResult>,
    ticket_filename: &'static str,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>AI Comment Detector • Error</title>
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }}">
        <h1 class="{{ chrome.headline_class }}">Something went wrong</h1>
        <p class="{{ chrome.lede_class }}">{{ message }}</p>
        <a href="/" class="{{ chrome.button_class }}">Back to home</a>
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct ErrorTemplate<'a> {
    chrome: Chrome,
    message: &'a str,
}
