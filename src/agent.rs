//! A minimal tool-calling agent over an OpenAI-compatible chat API.
//!
//! The agent sends the available tools as function definitions, executes
//! the calls the model asks for through a [`ToolInvoker`] and feeds the
//! results back until the model answers in plain text or calls
//! `final_answer`.

use crate::{Error, Result, probe::preview};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const FINAL_ANSWER: &str = "final_answer";

/// A tool as advertised to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

impl ToolSpec {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: Some(self.description.clone()),
                parameters: Some(self.parameters.clone()),
            },
        }
    }

    fn final_answer() -> Self {
        Self {
            name: FINAL_ANSWER.to_string(),
            description: "Provides the final answer to the task".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "answer": {"type": "string", "description": "The final answer"}
                },
                "required": ["answer"]
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolDefinition {
    r#type: String,
    function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionDefinition {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: ToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text("assistant", content)
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::text("tool", content)
        }
    }

    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn requested_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage>;
}

#[async_trait::async_trait]
pub trait ToolInvoker: Send + Sync {
    fn tools(&self) -> Vec<ToolSpec>;

    /// Runs `name` and returns its text output
    async fn invoke(&self, name: &str, arguments: Value) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat completions endpoint of OpenAI or a compatible server
#[derive(Debug, Clone)]
pub struct OpenAiModel {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    timeout: Duration,
}

impl OpenAiModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_id: model_id.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiModel {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage> {
        let url = format!("{}/chat/completions", self.base_url);
        let tools: Vec<_> = tools.iter().map(ToolSpec::definition).collect();
        let body = json!({
            "model": self.model_id,
            "messages": messages,
            "tools": tools,
            "tool_choice": "auto",
        });

        tracing::debug!(model = %self.model_id, messages = messages.len(), "chat completion");
        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::connectivity(&url, crate::probe::describe(&err)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| Error::connectivity(&url, crate::probe::describe(&err)))?;

        if !status.is_success() {
            return Err(Error::Agent(format!(
                "chat completion failed with {status}: {}",
                preview(&text)
            )));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&text)?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| Error::Agent("chat completion returned no choices".to_string()))
    }
}

pub struct ToolCallingAgent<M, T> {
    model: M,
    tools: T,
    max_steps: usize,
}

impl<M: ChatModel, T: ToolInvoker> ToolCallingAgent<M, T> {
    pub fn new(model: M, tools: T, max_steps: usize) -> Self {
        Self {
            model,
            tools,
            max_steps,
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn tool_count(&self) -> usize {
        self.tools.tools().len()
    }

    pub fn into_tools(self) -> T {
        self.tools
    }

    /// Runs `task` to completion. Each model turn is one step.
    pub async fn run(&self, task: &str) -> Result<String> {
        let mut tools = self.tools.tools();
        tools.push(ToolSpec::final_answer());

        let mut messages = vec![
            ChatMessage::system(
                "You are an assistant that solves tasks with the provided tools. \
                 Call tools as needed, then call final_answer with the result.",
            ),
            ChatMessage::user(task),
        ];

        for step in 1..=self.max_steps {
            let reply = self.model.complete(&messages, &tools).await?;
            tracing::debug!(step, calls = reply.requested_calls().len(), "agent step");

            if reply.requested_calls().is_empty() {
                return reply
                    .content
                    .filter(|content| !content.trim().is_empty())
                    .ok_or_else(|| Error::Agent("model returned an empty answer".to_string()));
            }

            let calls = reply.requested_calls().to_vec();
            messages.push(reply);

            for call in calls {
                let arguments = parse_arguments(&call.function.arguments);

                if call.function.name == FINAL_ANSWER {
                    return Ok(match arguments.get("answer") {
                        Some(Value::String(answer)) => answer.clone(),
                        Some(other) => other.to_string(),
                        None => arguments.to_string(),
                    });
                }

                tracing::info!(step, tool = %call.function.name, %arguments, "calling tool");
                let output = match self.tools.invoke(&call.function.name, arguments).await {
                    Ok(output) => output,
                    Err(err) => format!("Error: {err}"),
                };
                messages.push(ChatMessage::tool(call.id, output));
            }
        }

        Err(Error::Agent(format!(
            "max steps ({}) reached without a final answer",
            self.max_steps
        )))
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "input": raw }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<ChatMessage>>);

    impl Scripted {
        fn new(mut replies: Vec<ChatMessage>) -> Self {
            replies.reverse();
            Self(Mutex::new(replies))
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, _: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage> {
            assert!(tools.iter().any(|tool| tool.name == FINAL_ANSWER));
            self.0
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::Agent("script exhausted".into()))
        }
    }

    #[derive(Default)]
    struct Library(Mutex<Vec<(String, Value)>>);

    #[async_trait::async_trait]
    impl ToolInvoker for Library {
        fn tools(&self) -> Vec<ToolSpec> {
            vec![ToolSpec {
                name: "resolve-library-id".into(),
                description: "Resolves a library name".into(),
                parameters: json!({"type": "object"}),
            }]
        }

        async fn invoke(&self, name: &str, arguments: Value) -> Result<String> {
            self.0.lock().unwrap().push((name.to_string(), arguments));
            Ok("- /facebook/react".into())
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> ChatMessage {
        ChatMessage {
            role: "assistant".into(),
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: id.into(),
                r#type: "function".into(),
                function: ToolCallFunction {
                    name: name.into(),
                    arguments: arguments.into(),
                },
            }]),
            tool_call_id: None,
        }
    }

    #[tokio::test]
    async fn tool_call_then_final_answer() {
        let model = Scripted::new(vec![
            call("1", "resolve-library-id", r#"{"libraryName":"react"}"#),
            call("2", FINAL_ANSWER, r#"{"answer":"React is /facebook/react"}"#),
        ]);
        let agent = ToolCallingAgent::new(model, Library::default(), 3);

        let answer = agent.run("find react").await.unwrap();
        assert_eq!(answer, "React is /facebook/react");

        let calls = agent.into_tools().0.into_inner().unwrap();
        assert_eq!(calls, [("resolve-library-id".to_string(), json!({"libraryName": "react"}))]);
    }

    #[tokio::test]
    async fn plain_answer_ends_the_run() {
        let model = Scripted::new(vec![ChatMessage::assistant("No matches found")]);
        let agent = ToolCallingAgent::new(model, Library::default(), 3);
        assert_eq!(agent.run("find xyz").await.unwrap(), "No matches found");
    }

    #[tokio::test]
    async fn step_limit_is_an_agent_error() {
        let model = Scripted::new(vec![
            call("1", "resolve-library-id", "{}"),
            call("2", "resolve-library-id", "{}"),
        ]);
        let agent = ToolCallingAgent::new(model, Library::default(), 2);

        let err = agent.run("loop forever").await.unwrap_err();
        assert!(matches!(err, Error::Agent(msg) if msg.contains("max steps (2)")));
    }

    #[test]
    fn tool_message_wire_format() {
        let message = ChatMessage::tool("call_1", "result");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"role": "tool", "content": "result", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn arguments_fall_back_gracefully() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("react"), json!({"input": "react"}));
    }

    #[tokio::test]
    async fn slow_completions_time_out() {
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            axum::routing::post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let model = OpenAiModel::new(format!("http://{addr}/v1"), "sk-test", "gpt-4o-mini")
            .with_timeout(Duration::from_millis(100));
        let err = model
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "{err}");

        server.abort();
    }
}
