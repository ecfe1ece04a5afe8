use rand::Rng;
use rmcp::{
    RoleServer,
    handler::server::{
        ServerHandler,
        tool::{Parameters, ToolRouter},
    },
    model::{
        CallToolResult, Content, ErrorData, GetPromptRequestParam, GetPromptResult,
        Implementation, ListPromptsResult, ListResourceTemplatesResult, PaginatedRequestParam,
        Prompt, PromptArgument, PromptMessage, PromptMessageRole, ProtocolVersion,
        RawResourceTemplate, ReadResourceRequestParam, ReadResourceResult, ResourceContents,
        ResourceTemplate, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router,
};

type McpResult<T = (), E = ErrorData> = core::result::Result<T, E>;

pub const SERVER_NAME: &str = "test-server";
pub const ECHO_TEMPLATE: &str = "test://echo/{message}";
const ECHO_PREFIX: &str = "test://echo/";
const TEST_PROMPT: &str = "test_prompt";

/// Sample MCP server the hub can launch as a stdio child
#[derive(Clone)]
pub struct DemoServer {
    tool_router: ToolRouter<Self>,
}

fn default_max() -> i64 {
    100
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct RandomNumber {
    #[schemars(description = "Minimum value (default 0)")]
    #[serde(default)]
    min_val: i64,
    #[schemars(description = "Maximum value (default 100)")]
    #[serde(default = "default_max")]
    max_val: i64,
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

#[tool_router]
impl DemoServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Generate a random number between min and max values")]
    async fn get_random_number(
        &self,
        Parameters(params): Parameters<RandomNumber>,
    ) -> McpResult<CallToolResult> {
        let RandomNumber { min_val, max_val } = params;
        if min_val > max_val {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "min_val ({min_val}) must not exceed max_val ({max_val})"
            ))]));
        }

        let number = rand::thread_rng().gen_range(min_val..=max_val);
        tracing::debug!(min_val, max_val, number, "random number");
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Random number: {number}"
        ))]))
    }

    #[tool(description = "Get the current system time")]
    async fn get_system_time(&self) -> McpResult<CallToolResult> {
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Current time: {}",
            now()
        ))]))
    }
}

impl Default for DemoServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for DemoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some("Sample tools, an echo resource and a prompt for hub testing".into()),
        }
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> McpResult<ListResourceTemplatesResult> {
        Ok(ListResourceTemplatesResult {
            resource_templates: vec![ResourceTemplate {
                raw: RawResourceTemplate {
                    uri_template: ECHO_TEMPLATE.into(),
                    name: "echo_resource".into(),
                    description: Some("Echoes the message back with a timestamp".into()),
                    mime_type: Some("text/plain".into()),
                },
                annotations: None,
            }],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> McpResult<ReadResourceResult> {
        let message = request
            .uri
            .strip_prefix(ECHO_PREFIX)
            .filter(|message| !message.is_empty())
            .ok_or_else(|| {
                ErrorData::resource_not_found(format!("unknown resource {}", request.uri), None)
            })?;

        let text = format!("Echo at {}: {message}", now());
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: request.uri.clone(),
                mime_type: Some("text/plain".into()),
                text,
            }],
        })
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> McpResult<ListPromptsResult> {
        Ok(ListPromptsResult {
            prompts: vec![Prompt::new(
                TEST_PROMPT,
                Some("Simple test prompt template"),
                Some(vec![PromptArgument {
                    name: "data".into(),
                    description: Some("Data for the assistant to process".into()),
                    required: Some(true),
                }]),
            )],
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> McpResult<GetPromptResult> {
        if request.name != TEST_PROMPT {
            return Err(ErrorData::invalid_params(
                format!("unknown prompt {}", request.name),
                None,
            ));
        }

        let data = request
            .arguments
            .as_ref()
            .and_then(|args| args.get("data"))
            .and_then(|data| data.as_str())
            .ok_or_else(|| ErrorData::invalid_params("missing argument 'data'", None))?;

        let text = format!(
            "You are a helpful test assistant.\nPlease process this data: {data}\nCurrent time: {}",
            now()
        );
        Ok(GetPromptResult {
            description: Some("Simple test prompt template".into()),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
        })
    }
}
