//! Context7 integration suite: tool discovery through the hub, then library
//! resolution by an OpenAI-backed tool-calling agent.

use super::{
    HarnessTest, Outcome, Prerequisite, Session, Suite, assert_library_in_result,
    assert_mentions_any, check_critical_setup, run_agent_with_timer, skip_if_prerequisite_failed,
};
use crate::{
    Config, Error, Result,
    agent::{OpenAiModel, ToolCallingAgent},
    mcp::McpClient,
};
use std::sync::Arc;

pub mod prerequisites {
    pub const OPENAI_API_KEY: &str = "openai_api_key";
    pub const TOOL_NAMES: &str = "tool_names";
    pub const AGENT_INITIALIZED: &str = "agent_initialized";
    pub const REACT_TEST_TIME: &str = "react_test_time";
}

const RESOLVE_TOOL: &str = "resolve-library-id";
const DOCS_TOOL: &str = "get-library-docs";
const AGENT_STEPS: usize = 3;

/// Libraries resolved by the parametrized test, with terms one of which
/// must appear in the answer
pub const LIBRARIES: &[(&str, &[&str])] = &[
    ("vue", &["vue", "/vuejs"]),
    ("numpy", &["numpy", "numerical"]),
    ("django", &["django", "python"]),
];

struct Env {
    config: Config,
}

impl Env {
    fn api_key(&self) -> Result<&str> {
        self.config
            .openai_api_key
            .as_deref()
            .ok_or_else(|| Error::Assertion("OpenAI API key is not set".to_string()))
    }

    async fn connect(&self) -> Result<McpClient> {
        McpClient::connect(&self.config.hub_mcp_url)
            .await
            .map_err(|err| match err {
                Error::Connectivity { url, reason } => Error::Connectivity {
                    url,
                    reason: format!("{reason}. Is the hub running?"),
                },
                other => other,
            })
    }

    fn model(&self) -> Result<OpenAiModel> {
        Ok(OpenAiModel::new(
            &self.config.openai_base_url,
            self.api_key()?,
            &self.config.openai_model,
        )
        .with_timeout(self.config.test_timeout))
    }

    async fn agent(&self, max_steps: usize) -> Result<ToolCallingAgent<OpenAiModel, McpClient>> {
        let model = self.model()?;
        let client = self.connect().await?;
        Ok(ToolCallingAgent::new(model, client, max_steps))
    }

    /// Runs one prompt through a fresh agent and closes its MCP session
    async fn ask(&self, prompt: &str) -> Result<(String, std::time::Duration)> {
        let agent = self.agent(AGENT_STEPS).await?;
        let result = run_agent_with_timer(&agent, prompt).await;
        agent.into_tools().close().await;
        result
    }
}

/// The suite in declaration order
pub fn suite(config: Config) -> Suite {
    let timeout = config.test_timeout;
    let env = Arc::new(Env { config });

    let mut suite = Suite::new(timeout);
    suite
        .add(SmokeOpenAiApiKey(env.clone()))
        .add(ToolDiscovery(env.clone()))
        .add(ResolveToolStructure(env.clone()))
        .add(AgentInitialization(env.clone()))
        .add(ResolveReact(env.clone()))
        .add(InvalidLibrary(env.clone()));

    for &(library, terms) in LIBRARIES {
        suite.add(LibraryResolution {
            env: env.clone(),
            library,
            terms,
        });
    }

    suite
}

struct SmokeOpenAiApiKey(Arc<Env>);

#[async_trait::async_trait]
impl HarnessTest for SmokeOpenAiApiKey {
    fn name(&self) -> String {
        "smoke_openai_api_key".to_string()
    }

    async fn run(&self, session: &mut Session) -> Outcome {
        let check = || -> Result<()> {
            let key = self.0.api_key()?;
            let head: String = key.chars().take(10).collect();
            check_critical_setup(
                key.starts_with("sk-"),
                format!("API key has incorrect format: {head}..."),
            )?;
            check_critical_setup(
                key.len() > 20,
                format!("API key seems too short: {} chars", key.len()),
            )
        };

        let check = check();
        if check.is_ok() {
            session.record(prerequisites::OPENAI_API_KEY, Prerequisite::Flag);
        }
        check.into()
    }
}

struct ToolDiscovery(Arc<Env>);

#[async_trait::async_trait]
impl HarnessTest for ToolDiscovery {
    fn name(&self) -> String {
        "mcp_connection_and_tool_discovery".to_string()
    }

    async fn run(&self, session: &mut Session) -> Outcome {
        let client = match self.0.connect().await {
            Ok(client) => client,
            Err(err) => return Outcome::failed(format!("MCP connection error: {err}")),
        };
        let names = client.tool_names();
        client.close().await;

        let check = || -> Result<()> {
            let url = &self.0.config.hub_mcp_url;
            check_critical_setup(
                !names.is_empty(),
                format!("no tools loaded from MCP hub at {url}"),
            )?;
            for required in [RESOLVE_TOOL, DOCS_TOOL] {
                check_critical_setup(
                    names.iter().any(|name| name == required),
                    format!("missing {required}. Found: {names:?}"),
                )?;
            }
            Ok(())
        };

        match check() {
            Ok(()) => {
                session.record(prerequisites::TOOL_NAMES, Prerequisite::Tools(names));
                Outcome::Passed
            }
            Err(err) => Outcome::Failed(err.to_string()),
        }
    }
}

struct ResolveToolStructure(Arc<Env>);

#[async_trait::async_trait]
impl HarnessTest for ResolveToolStructure {
    fn name(&self) -> String {
        "resolve_library_id_tool_structure".to_string()
    }

    async fn run(&self, session: &mut Session) -> Outcome {
        if let Some(skip) = skip_if_prerequisite_failed(session, prerequisites::TOOL_NAMES) {
            return skip;
        }

        let client = match self.0.connect().await {
            Ok(client) => client,
            Err(err) => return Outcome::failed(format!("tool structure error: {err}")),
        };
        let spec = client.tool(RESOLVE_TOOL).map(crate::mcp::tool_spec);
        client.close().await;

        let Some(spec) = spec else {
            return Outcome::failed(format!("{RESOLVE_TOOL} tool not found"));
        };
        check_critical_setup(
            !spec.description.trim().is_empty(),
            "tool description is empty",
        )
        .into()
    }
}

struct AgentInitialization(Arc<Env>);

#[async_trait::async_trait]
impl HarnessTest for AgentInitialization {
    fn name(&self) -> String {
        "agent_initialization".to_string()
    }

    async fn run(&self, session: &mut Session) -> Outcome {
        for prerequisite in [prerequisites::OPENAI_API_KEY, prerequisites::TOOL_NAMES] {
            if let Some(skip) = skip_if_prerequisite_failed(session, prerequisite) {
                return skip;
            }
        }

        let agent = match self.0.agent(5).await {
            Ok(agent) => agent,
            Err(err) => return Outcome::failed(format!("agent init error: {err}")),
        };
        let tool_count = agent.tool_count();
        let max_steps = agent.max_steps();
        agent.into_tools().close().await;

        let check = check_critical_setup(tool_count > 0, "agent has no tools").and_then(|()| {
            check_critical_setup(max_steps == 5, format!("max_steps incorrect: {max_steps}"))
        });

        if check.is_ok() {
            session.record(prerequisites::AGENT_INITIALIZED, Prerequisite::Flag);
        }
        check.into()
    }
}

struct ResolveReact(Arc<Env>);

#[async_trait::async_trait]
impl HarnessTest for ResolveReact {
    fn name(&self) -> String {
        "resolve_react_library".to_string()
    }

    async fn run(&self, session: &mut Session) -> Outcome {
        if let Some(skip) = skip_if_prerequisite_failed(session, prerequisites::AGENT_INITIALIZED)
        {
            return skip;
        }

        let prompt = format!("Use {RESOLVE_TOOL} to find the Context7 ID for 'react'");
        let result = self.0.ask(&prompt).await.and_then(|(answer, elapsed)| {
            assert_library_in_result(&answer, "react", &["facebook", "meta", "/react"])?;
            Ok(elapsed)
        });

        match result {
            Ok(elapsed) => {
                session.record(prerequisites::REACT_TEST_TIME, Prerequisite::Elapsed(elapsed));
                Outcome::Passed
            }
            Err(err) => Outcome::failed(format!("React resolution error: {err}")),
        }
    }
}

struct InvalidLibrary(Arc<Env>);

#[async_trait::async_trait]
impl HarnessTest for InvalidLibrary {
    fn name(&self) -> String {
        "invalid_library_handling".to_string()
    }

    async fn run(&self, session: &mut Session) -> Outcome {
        if let Some(skip) = skip_if_prerequisite_failed(session, prerequisites::AGENT_INITIALIZED)
        {
            return skip;
        }

        let prompt = format!("Use {RESOLVE_TOOL} to find 'xyzabc123nonexistent'");
        self.0
            .ask(&prompt)
            .await
            .and_then(|(answer, _)| {
                assert_mentions_any(
                    &answer,
                    &["no", "not found", "couldn't find", "no matches", "no results"],
                )
            })
            .into()
    }
}

struct LibraryResolution {
    env: Arc<Env>,
    library: &'static str,
    terms: &'static [&'static str],
}

#[async_trait::async_trait]
impl HarnessTest for LibraryResolution {
    fn name(&self) -> String {
        format!("library_resolution[{}]", self.library)
    }

    async fn run(&self, session: &mut Session) -> Outcome {
        if let Some(skip) = skip_if_prerequisite_failed(session, prerequisites::AGENT_INITIALIZED)
        {
            return skip;
        }

        let prompt = format!("Use {RESOLVE_TOOL} to find '{}'", self.library);
        match self.env.ask(&prompt).await {
            Ok((answer, _)) => assert_library_in_result(&answer, self.library, self.terms).into(),
            Err(err) => Outcome::failed(format!("{} error: {err}", self.library)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_declares_tests_in_order() {
        let suite = suite(Config::default());
        assert_eq!(
            suite.names(),
            [
                "smoke_openai_api_key",
                "mcp_connection_and_tool_discovery",
                "resolve_library_id_tool_structure",
                "agent_initialization",
                "resolve_react_library",
                "invalid_library_handling",
                "library_resolution[vue]",
                "library_resolution[numpy]",
                "library_resolution[django]",
            ]
        );
    }

    #[tokio::test]
    async fn api_key_format_is_checked() {
        let mut session = Session::new();

        let config = Config::default().with_openai_api_key(Some("sk-short".into()));
        let test = SmokeOpenAiApiKey(Arc::new(Env { config }));
        let outcome = test.run(&mut session).await;
        assert!(matches!(&outcome, Outcome::Failed(reason) if reason.contains("too short")));

        let config = Config::default().with_openai_api_key(Some("pk-0123456789abcdefghijkl".into()));
        let test = SmokeOpenAiApiKey(Arc::new(Env { config }));
        let outcome = test.run(&mut session).await;
        assert!(matches!(&outcome, Outcome::Failed(reason) if reason.contains("incorrect format")));

        assert!(!session.is_set(prerequisites::OPENAI_API_KEY));

        let config = Config::default().with_openai_api_key(Some("sk-0123456789abcdefghijkl".into()));
        let test = SmokeOpenAiApiKey(Arc::new(Env { config }));
        assert_eq!(test.run(&mut session).await, Outcome::Passed);
        assert!(session.is_set(prerequisites::OPENAI_API_KEY));
    }

    #[tokio::test]
    async fn missing_key_fails_smoke_test() {
        let test = SmokeOpenAiApiKey(Arc::new(Env {
            config: Config::default(),
        }));
        let outcome = test.run(&mut Session::new()).await;
        assert_eq!(
            outcome,
            Outcome::Failed("assertion failed: OpenAI API key is not set".into())
        );
    }

    #[tokio::test]
    async fn agent_initialization_waits_for_a_usable_key() {
        let mut session = Session::new();
        session.record(prerequisites::TOOL_NAMES, Prerequisite::Tools(vec![RESOLVE_TOOL.into()]));

        let env = Arc::new(Env {
            config: Config::default().with_hub_mcp_url("http://127.0.0.1:9/mcp/test0"),
        });
        SmokeOpenAiApiKey(env.clone()).run(&mut session).await;

        let outcome = AgentInitialization(env).run(&mut session).await;
        assert_eq!(
            outcome,
            Outcome::Skipped("prerequisite 'openai_api_key' did not succeed".into())
        );
        assert!(!session.is_set(prerequisites::AGENT_INITIALIZED));
    }
}
