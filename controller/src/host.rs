use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode, Uri},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use irbridge_common::{
    http::{changed_flag, not_found_body, CHANGED_HEADER},
    CommandEngine, CommandParams, CommandRegistry, Dispatch, IrAction, Palette, RuntimeConfig,
    Transmitter,
};

const DEFAULT_CONFIG_PATH: &str = "./irbridge.json";

struct Bridge {
    engine: CommandEngine,
    transmitter: LoggingTransmitter,
}

#[derive(Clone)]
struct AppState {
    // One lock covers the engine and the transmitter, so a dispatch and its
    // pulse train finish before anything else reads or mutates state.
    bridge: Arc<Mutex<Bridge>>,
    registry: Arc<CommandRegistry>,
}

impl AppState {
    fn new(engine: CommandEngine, registry: CommandRegistry) -> Self {
        Self {
            bridge: Arc::new(Mutex::new(Bridge {
                transmitter: LoggingTransmitter::new(engine.config().indicator_ms),
                engine,
            })),
            registry: Arc::new(registry),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Default)]
struct LoggingTransmitter {
    indicator_ms: u64,
    sent_frames: u64,
    last_code: Option<u32>,
    last_send_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
struct IrDiagnosticsView {
    enabled: bool,
    #[serde(rename = "sentFrames")]
    sent_frames: u64,
    #[serde(rename = "lastCode")]
    last_code: Option<String>,
    #[serde(rename = "lastSendMs")]
    last_send_ms: Option<u64>,
    #[serde(rename = "failedFrames")]
    failed_frames: u64,
    #[serde(rename = "lastError")]
    last_error: Option<String>,
}

impl LoggingTransmitter {
    fn new(indicator_ms: u64) -> Self {
        Self {
            indicator_ms,
            ..Self::default()
        }
    }

    fn diagnostics(&self) -> IrDiagnosticsView {
        IrDiagnosticsView {
            enabled: false,
            sent_frames: self.sent_frames,
            last_code: self.last_code.map(|code| format!("0x{code:08X}")),
            last_send_ms: self.last_send_ms,
            failed_frames: 0,
            last_error: Some("IR transmission is only available in ESP32 builds".to_string()),
        }
    }
}

impl Transmitter for LoggingTransmitter {
    fn transmit(&mut self, code: u32) {
        info!("IR transmit 0x{code:08X}");
        self.sent_frames = self.sent_frames.saturating_add(1);
        self.last_code = Some(code);
        self.last_send_ms = Some(monotonic_ms());
    }

    fn pulse_indicator(&mut self) {
        debug!("indicator on for {}ms", self.indicator_ms);
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });

    let palette = Palette::new(runtime.palette.clone()).unwrap_or_else(|err| {
        warn!("configured palette rejected ({err}); using built-in palette");
        Palette::default()
    });
    let registry = CommandRegistry::build(&runtime.bridge, &palette, &runtime.raw_commands);
    let engine = CommandEngine::new(runtime.bridge.clone(), palette);
    info!(
        "bridge ready: {} commands, {} palette entries, {} brightness levels",
        registry.descriptors().len(),
        engine.palette().len(),
        engine.config().max_level
    );

    let app_state = AppState::new(engine, registry);

    spawn_button_listener(app_state.clone())?;

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/state", get(handle_get_state))
        .route("/diagnostics", get(handle_get_diagnostics))
        .route("/{command}", get(handle_command))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let port = std::env::var("IRBRIDGE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bridge server at {addr}"))?;

    info!("{} listening on http://{addr}", runtime.network.hostname);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let path = std::env::var("IRBRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    match tokio::fs::read(&path).await {
        Ok(raw) => RuntimeConfig::from_json_slice(&raw)
            .with_context(|| format!("invalid config in {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}, using defaults", path.display());
            Ok(RuntimeConfig::default())
        }
        Err(err) => {
            Err(anyhow::Error::new(err).context(format!("failed to read {}", path.display())))
        }
    }
}

#[cfg(unix)]
fn spawn_button_listener(app_state: AppState) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut presses =
        signal(SignalKind::user_defined1()).context("failed to install SIGUSR1 handler")?;
    info!("send SIGUSR1 to simulate the physical button");

    tokio::spawn(async move {
        while presses.recv().await.is_some() {
            let mut bridge = app_state.bridge.lock().await;
            let dispatch = bridge.engine.button_pressed();
            info!(
                "button pressed: changed={} pulses={}",
                dispatch.changed,
                dispatch.pulse_count()
            );
            execute_ir_actions(&mut bridge.transmitter, &dispatch.actions).await;
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_button_listener(_app_state: AppState) -> anyhow::Result<()> {
    Ok(())
}

async fn execute_ir_actions<T: Transmitter>(transmitter: &mut T, actions: &[IrAction]) {
    for action in actions {
        match *action {
            IrAction::Send(code) => {
                transmitter.transmit(code);
                transmitter.pulse_indicator();
            }
            IrAction::Delay(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    }
}

async fn handle_root() -> impl IntoResponse {
    Html("<html>Done!</html>")
}

async fn handle_get_state(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.bridge.lock().await.engine.current_state();
    Json(snapshot)
}

async fn handle_get_diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    let diagnostics = state.bridge.lock().await.transmitter.diagnostics();
    Json(diagnostics)
}

async fn handle_command(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let Some(descriptor) = state.registry.resolve(&identifier).cloned() else {
        return not_found_response(&method, &uri, &query);
    };
    let params = CommandParams {
        value: query.get("value").cloned(),
    };

    let mut bridge = state.bridge.lock().await;
    let dispatch = match bridge.engine.dispatch(&descriptor, &params) {
        Ok(dispatch) => dispatch,
        Err(err) => {
            warn!("command `{identifier}` rejected: {err}");
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
    };

    info!(
        "command `{identifier}`: changed={} pulses={}",
        dispatch.changed,
        dispatch.pulse_count()
    );
    execute_ir_actions(&mut bridge.transmitter, &dispatch.actions).await;
    drop(bridge);

    dispatch_response(&dispatch)
}

async fn handle_not_found(
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> axum::response::Response {
    not_found_response(&method, &uri, &query)
}

fn dispatch_response(dispatch: &Dispatch) -> axum::response::Response {
    (
        [(CHANGED_HEADER, changed_flag(dispatch.changed))],
        Json(dispatch.snapshot),
    )
        .into_response()
}

fn not_found_response(
    method: &Method,
    uri: &Uri,
    query: &HashMap<String, String>,
) -> axum::response::Response {
    let mut arguments: Vec<(String, String)> = query
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    arguments.sort();

    let body = not_found_body(uri.path(), method.as_str(), &arguments);
    (StatusCode::NOT_FOUND, body).into_response()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use irbridge_common::{PowerState, StateSnapshot};

    fn app_state() -> AppState {
        let engine = CommandEngine::new(Default::default(), Palette::default());
        let registry = CommandRegistry::build(engine.config(), engine.palette(), &[]);
        AppState::new(engine, registry)
    }

    async fn command(
        state: &AppState,
        identifier: &str,
        value: Option<&str>,
    ) -> axum::response::Response {
        let mut query = HashMap::new();
        let mut uri = format!("/{identifier}");
        if let Some(value) = value {
            query.insert("value".to_string(), value.to_string());
            uri.push_str(&format!("?value={value}"));
        }
        handle_command(
            State(state.clone()),
            Path(identifier.to_string()),
            Method::GET,
            uri.parse().unwrap(),
            Query(query),
        )
        .await
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn executor_transmits_every_send() {
        let mut transmitter = LoggingTransmitter::new(0);
        let actions = [
            IrAction::Send(0x01FE_E01F),
            IrAction::Delay(1),
            IrAction::Send(0x01FE_E01F),
        ];

        execute_ir_actions(&mut transmitter, &actions).await;

        let diagnostics = transmitter.diagnostics();
        assert_eq!(diagnostics.sent_frames, 2);
        assert_eq!(diagnostics.last_code.as_deref(), Some("0x01FEE01F"));
    }

    #[test]
    fn dispatch_response_flags_unchanged_state() {
        let mut engine = CommandEngine::new(Default::default(), Palette::default());
        let registry = CommandRegistry::build(engine.config(), engine.palette(), &[]);
        let off = registry.resolve("off").unwrap().clone();
        let dispatch = engine.dispatch(&off, &CommandParams::default()).unwrap();

        let response = dispatch_response(&dispatch);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-irbridge-changed"], "false");
    }

    #[tokio::test]
    async fn malformed_color_is_rejected_without_side_effects() {
        let state = app_state();
        command(&state, "on", None).await;
        let before = state.bridge.lock().await.engine.current_state();

        let response = command(&state, "color", Some("(1,2)")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("(1,2)"));

        let bridge = state.bridge.lock().await;
        assert_eq!(bridge.engine.current_state(), before);
        assert_eq!(bridge.transmitter.diagnostics().sent_frames, 1);
    }

    #[tokio::test]
    async fn out_of_range_brightness_is_rejected() {
        let state = app_state();
        command(&state, "on", None).await;

        let response = command(&state, "brightness", Some("9")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["error"].is_string());
        assert_eq!(state.bridge.lock().await.engine.current_state().brightness, 3);
    }

    #[tokio::test]
    async fn applied_command_reports_new_state() {
        let state = app_state();

        let response = command(&state, "on", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CHANGED_HEADER], "true");
        let snapshot: serde_json::Value =
            serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            snapshot,
            serde_json::json!({"state": "ON", "brightness": 3, "color": [139, 0, 0]})
        );

        let response = command(&state, "color", Some("(0,128,0)")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            state.bridge.lock().await.engine.current_state(),
            StateSnapshot {
                state: PowerState::On,
                brightness: 3,
                color: [0, 128, 0],
            }
        );
    }

    #[tokio::test]
    async fn unknown_identifier_gets_not_found_page() {
        let state = app_state();

        let response = command(&state, "nope", Some("1")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_text(response).await,
            "File Not Found\n\nURI: /nope\nMethod: GET\nArguments: 1\n value: 1\n"
        );
        assert_eq!(state.bridge.lock().await.transmitter.diagnostics().sent_frames, 0);
    }

    #[tokio::test]
    async fn fallback_sorts_arguments() {
        let query = HashMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);

        let response =
            handle_not_found(Method::GET, "/x/y?b=2&a=1".parse().unwrap(), Query(query)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_text(response).await,
            "File Not Found\n\nURI: /x/y\nMethod: GET\nArguments: 2\n a: 1\n b: 2\n"
        );
    }
}
