use crate::{
    Error, Result,
    agent::{ToolInvoker, ToolSpec},
};
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation, Tool},
    service::RunningService,
    transport::StreamableHttpClientTransport,
};
use serde_json::{Value, json};

/// MCP client connected to a hub workspace over streamable HTTP
pub struct McpClient {
    service: RunningService<RoleClient, ClientInfo>,
    tools: Vec<Tool>,
}

impl McpClient {
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::debug!(url, "connecting to MCP endpoint");

        let client_info = ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let transport = StreamableHttpClientTransport::from_uri(url.to_string());
        let service = client_info
            .serve(transport)
            .await
            .map_err(|err| Error::connectivity(url, err))?;

        let tools = service.list_all_tools().await?;
        tracing::info!(url, tools = tools.len(), "MCP session established");

        Ok(Self { service, tools })
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name.to_string()).collect()
    }

    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Calls `name` and concatenates the text content of the result
    pub async fn call_text(&self, name: &str, arguments: Value) -> Result<String> {
        if self.tool(name).is_none() {
            return Err(Error::Protocol(format!("tool '{name}' not found")));
        }

        let result = self
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: arguments.as_object().cloned(),
            })
            .await?;

        let result = serde_json::to_value(result)?;
        let text = text_content(&result);

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            Err(Error::Protocol(format!("tool '{name}' failed: {text}")))
        } else {
            Ok(text)
        }
    }

    pub async fn close(self) {
        if let Err(err) = self.service.cancel().await {
            tracing::debug!(%err, "MCP session did not shut down cleanly");
        }
    }
}

/// Joins the `text` entries of a serialized tool result
fn text_content(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|content| {
            content
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Name, description and input schema of a tool, read from its wire form
pub fn tool_spec(tool: &Tool) -> ToolSpec {
    let value = serde_json::to_value(tool).unwrap_or(Value::Null);
    ToolSpec {
        name: tool.name.to_string(),
        description: value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        parameters: value
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| json!({"type": "object"})),
    }
}

#[async_trait::async_trait]
impl ToolInvoker for McpClient {
    fn tools(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(tool_spec).collect()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<String> {
        self.call_text(name, arguments).await
    }
}
