use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    /// Name (or name filter) of the container hosting the hub
    pub container_name: String,

    /// Base URL of the hub's HTTP API
    pub backend_url: String,

    /// Container ports that must have a host binding, e.g. `8765/tcp`
    pub required_ports: Vec<String>,

    /// Server registered by the streaming check
    pub validation_server: String,

    /// Workspace registered by the streaming check
    pub validation_workspace: String,

    /// Payload the streaming check looks for in event data
    pub validation_marker: String,

    /// Upper bound on events read before giving up on the marker
    pub max_events: usize,

    /// Timeout for plain API requests
    pub request_timeout: Duration,

    /// Timeout for the streaming check's connection
    pub stream_timeout: Duration,

    /// Short-lived connection used by the cleanup check
    pub cleanup_stream_timeout: Duration,

    /// How long the hot reload check waits for a restart
    pub reload_window: Duration,

    /// How long the cleanup check waits for processes to exit
    pub cleanup_window: Duration,

    /// Timeout for commands executed inside the container
    pub exec_timeout: Duration,

    /// Pattern matching the hub's backend process
    pub backend_process: String,

    /// Config file touched to trigger a hot reload
    pub providers_file: String,

    /// Process name spawned for the validation server
    pub stdio_process: String,

    /// Log file written by `validate` in addition to stderr
    pub log_file: Option<PathBuf>,

    /// Streamable HTTP endpoint the Context7 suite connects to
    pub hub_mcp_url: String,

    pub openai_api_key: Option<String>,

    pub openai_model: String,

    pub openai_base_url: String,

    /// Upper bound on a single harness test
    pub test_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            container_name: "yamcp-ui-dev".to_string(),
            backend_url: "http://localhost:8765".to_string(),
            required_ports: vec!["5173/tcp".to_string(), "8765/tcp".to_string()],
            validation_server: "validation-server".to_string(),
            validation_workspace: "validation-workspace".to_string(),
            validation_marker: "VALIDATION_TEST".to_string(),
            max_events: 10,
            request_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(10),
            cleanup_stream_timeout: Duration::from_secs(2),
            reload_window: Duration::from_secs(5),
            cleanup_window: Duration::from_secs(3),
            exec_timeout: Duration::from_secs(15),
            backend_process: "yamcp-ui-backend-hub".to_string(),
            providers_file: "/root/.local/share/yamcp-nodejs/providers.json".to_string(),
            stdio_process: "echo".to_string(),
            log_file: Some(PathBuf::from("validation.log")),
            hub_mcp_url: "http://localhost:8765/mcp/test0".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4.1".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            test_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_required_ports(mut self, ports: Vec<String>) -> Self {
        self.required_ports = ports;
        self
    }

    pub fn with_validation_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.validation_workspace = workspace.into();
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_reload_window(mut self, window: Duration) -> Self {
        self.reload_window = window;
        self
    }

    pub fn with_cleanup_window(mut self, window: Duration) -> Self {
        self.cleanup_window = window;
        self
    }

    pub fn with_cleanup_stream_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_stream_timeout = timeout;
        self
    }

    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    pub fn with_hub_mcp_url(mut self, url: impl Into<String>) -> Self {
        self.hub_mcp_url = url.into();
        self
    }

    pub fn with_openai_api_key(mut self, key: Option<String>) -> Self {
        self.openai_api_key = key.filter(|key| !key.is_empty());
        self
    }

    pub fn with_openai_model(mut self, model: impl Into<String>) -> Self {
        self.openai_model = model.into();
        self
    }

    pub fn with_openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// URL of the event stream for `workspace`
    pub fn workspace_stream_url(&self, workspace: &str) -> String {
        format!("{}/mcp/{workspace}", self.backend_url)
    }
}
