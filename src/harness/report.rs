use super::{Session, context7::prerequisites};
use std::fmt::Write as _;

const RULE_WIDTH: usize = 70;
const LISTED_TOOLS: usize = 5;

/// End-of-session summary of what the Context7 suite established
pub fn generate_test_report(session: &Session) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "TEST REPORT - Context7 MCP Integration");
    let _ = writeln!(out, "{rule}");

    match session.tools(prerequisites::TOOL_NAMES) {
        Some(tools) => {
            let _ = writeln!(out, "\n✓ MCP Tools Discovered: {}", tools.len());
            for tool in tools.iter().take(LISTED_TOOLS) {
                let _ = writeln!(out, "  - {tool}");
            }
            if tools.len() > LISTED_TOOLS {
                let _ = writeln!(out, "  ... and {} more", tools.len() - LISTED_TOOLS);
            }
        }
        None => {
            let _ = writeln!(out, "\n✗ MCP Connection Failed - No tools discovered");
        }
    }

    if session.is_set(prerequisites::AGENT_INITIALIZED) {
        let _ = writeln!(out, "\n✓ Agent Initialization: Success");
    } else {
        let _ = writeln!(out, "\n✗ Agent Initialization: Failed");
    }

    if let Some(elapsed) = session.elapsed(prerequisites::REACT_TEST_TIME) {
        let _ = writeln!(
            out,
            "\n✓ React Library Resolution: {:.2}s",
            elapsed.as_secs_f64()
        );
    }

    let _ = write!(out, "\n{rule}");
    out
}
