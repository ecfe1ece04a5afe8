//! End-to-end tests against an in-process mock hub.
//!
//! [`MockHub`] serves the hub's HTTP API and workspace streams with axum on
//! an ephemeral port; [`FakeProber`] stands in for the container engine.


use crate::{
    Config,
    checks::HubContext,
    container::{ContainerProber, ContainerStatus, ContainerSummary, ExecOutput, parse_port_list},
};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde_json::{Value, json};
use std::{
    convert::Infallible,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum StatsReply {
    Json(Value),
    Status(StatusCode),
    Html(&'static str),
}

pub fn valid_stats() -> Value {
    json!({
        "totalServers": 2,
        "activeServers": 1,
        "totalWorkspaces": 1,
        "activeWorkspaces": 1
    })
}

struct HubState {
    stats: Mutex<StatsReply>,
    events: Mutex<Vec<String>>,
    stream_content_type: Mutex<&'static str>,
    hold_open: AtomicBool,
    header_delay: Mutex<Duration>,
    servers: Mutex<Vec<Value>>,
    workspaces: Mutex<Vec<Value>>,
    stream_requests: AtomicUsize,
}

/// In-process stand-in for the hub's HTTP surface
pub struct MockHub {
    pub url: String,
    state: Arc<HubState>,
    task: JoinHandle<()>,
}

impl MockHub {
    pub async fn start() -> Self {
        let state = Arc::new(HubState {
            stats: Mutex::new(StatsReply::Json(valid_stats())),
            events: Mutex::new(Vec::new()),
            stream_content_type: Mutex::new("text/event-stream"),
            hold_open: AtomicBool::new(false),
            header_delay: Mutex::new(Duration::ZERO),
            servers: Mutex::new(Vec::new()),
            workspaces: Mutex::new(Vec::new()),
            stream_requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/stats", get(stats))
            .route("/api/servers", post(add_server))
            .route("/api/workspaces", post(add_workspace))
            .route("/mcp/{workspace}", get(workspace_stream))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
            task,
        }
    }

    pub fn set_stats(&self, reply: StatsReply) {
        *self.state.stats.lock().unwrap() = reply;
    }

    /// Raw blocks written to every stream, in order
    pub fn set_events<I, S>(&self, blocks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.state.events.lock().unwrap() = blocks.into_iter().map(Into::into).collect();
    }

    pub fn set_stream_content_type(&self, content_type: &'static str) {
        *self.state.stream_content_type.lock().unwrap() = content_type;
    }

    /// Keep streams open after the configured events instead of closing
    pub fn hold_open(&self) {
        self.state.hold_open.store(true, Ordering::SeqCst);
    }

    /// Wait this long before answering a stream request at all
    pub fn delay_stream_headers(&self, delay: Duration) {
        *self.state.header_delay.lock().unwrap() = delay;
    }

    pub fn servers(&self) -> Vec<Value> {
        self.state.servers.lock().unwrap().clone()
    }

    pub fn workspaces(&self) -> Vec<Value> {
        self.state.workspaces.lock().unwrap().clone()
    }

    pub fn stream_requests(&self) -> usize {
        self.state.stream_requests.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> Config {
        Config::default()
            .with_backend_url(&self.url)
            .with_stream_timeout(Duration::from_secs(3))
            .with_reload_window(Duration::from_millis(600))
            .with_cleanup_window(Duration::from_millis(600))
            .with_log_file(None)
    }
}

impl Drop for MockHub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn stats(State(state): State<Arc<HubState>>) -> Response {
    let reply = state.stats.lock().unwrap().clone();
    match reply {
        StatsReply::Json(value) => Json(value).into_response(),
        StatsReply::Status(status) => (status, "internal error").into_response(),
        StatsReply::Html(body) => ([(header::CONTENT_TYPE, "text/html")], body).into_response(),
    }
}

async fn add_server(State(state): State<Arc<HubState>>, Json(body): Json<Value>) -> Json<Value> {
    state.servers.lock().unwrap().push(body);
    Json(json!({"success": true}))
}

async fn add_workspace(
    State(state): State<Arc<HubState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.workspaces.lock().unwrap().push(body);
    Json(json!({"success": true}))
}

async fn workspace_stream(
    State(state): State<Arc<HubState>>,
    Path(_workspace): Path<String>,
) -> Response {
    state.stream_requests.fetch_add(1, Ordering::SeqCst);

    let delay = *state.header_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let blocks = state.events.lock().unwrap().clone();
    let content_type = *state.stream_content_type.lock().unwrap();
    let chunks = futures::stream::iter(
        blocks
            .into_iter()
            .map(|block| Ok::<_, Infallible>(Bytes::from(block))),
    );

    let body = if state.hold_open.load(Ordering::SeqCst) {
        Body::from_stream(futures::StreamExt::chain(chunks, futures::stream::pending()))
    } else {
        Body::from_stream(chunks)
    };

    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

pub fn exec_ok(stdout: &str) -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

type ExecHandler = Box<dyn Fn(&str) -> ExecOutput + Send + Sync>;

/// Container engine double. `exec` receives the argv joined with spaces.
pub struct FakeProber {
    containers: Vec<ContainerSummary>,
    handler: ExecHandler,
}

impl FakeProber {
    pub fn new(containers: Vec<ContainerSummary>) -> Self {
        Self {
            containers,
            handler: Box::new(|_| exec_ok("")),
        }
    }

    /// A single running `yamcp-ui-dev` with both ports published
    pub fn healthy() -> Self {
        Self::new(vec![container(
            "yamcp-ui-dev",
            "running",
            "0.0.0.0:5173->5173/tcp, 0.0.0.0:8765->8765/tcp",
        )])
    }

    pub fn on_exec(mut self, handler: impl Fn(&str) -> ExecOutput + Send + Sync + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }
}

pub fn container(name: &str, state: &str, ports: &str) -> ContainerSummary {
    ContainerSummary {
        id: format!("{name}-id"),
        name: name.to_string(),
        state: state.to_string(),
        ports: parse_port_list(ports),
    }
}

#[async_trait::async_trait]
impl ContainerProber for FakeProber {
    fn backend(&self) -> &'static str {
        "fake"
    }

    async fn list(&self, filter: &str) -> crate::Result<Vec<ContainerSummary>> {
        Ok(self
            .containers
            .iter()
            .filter(|container| container.name.contains(filter))
            .cloned()
            .collect())
    }

    async fn status(&self, name: &str) -> crate::Result<ContainerStatus> {
        Ok(self
            .containers
            .iter()
            .find(|container| container.name == name)
            .map_or(ContainerStatus::Missing, ContainerSummary::status))
    }

    async fn exec(&self, _name: &str, argv: &[&str], _timeout: Duration) -> crate::Result<ExecOutput> {
        Ok((self.handler)(&argv.join(" ")))
    }
}

/// A context whose container was already located
pub fn context(config: Config, prober: FakeProber) -> HubContext {
    let mut ctx = HubContext::new(config, Box::new(prober));
    ctx.container = "yamcp-ui-dev".to_string();
    ctx
}
