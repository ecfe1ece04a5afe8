use crate::{
    Error, Result,
    agent::{ChatModel, ToolCallingAgent, ToolInvoker},
    probe::preview,
};
use std::time::{Duration, Instant};

/// Fails fast when a setup condition does not hold
pub fn check_critical_setup(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Assertion(message.into()))
    }
}

/// Case-insensitive: the result must mention `library` and, when
/// `expected_terms` is not empty, at least one of them.
pub fn assert_library_in_result(result: &str, library: &str, expected_terms: &[&str]) -> Result<()> {
    let lowered = result.to_lowercase();

    if !lowered.contains(&library.to_lowercase()) {
        return Err(Error::Assertion(format!(
            "result doesn't mention {library}: {}",
            preview(&lowered)
        )));
    }

    if expected_terms.is_empty() {
        return Ok(());
    }
    assert_mentions_any(result, expected_terms).map_err(|_| {
        Error::Assertion(format!(
            "result for {library} doesn't contain any of {expected_terms:?}: {}",
            preview(&lowered)
        ))
    })
}

/// Case-insensitive: at least one of `terms` occurs in `result`
pub fn assert_mentions_any(result: &str, terms: &[&str]) -> Result<()> {
    let lowered = result.to_lowercase();
    if terms.iter().any(|term| lowered.contains(&term.to_lowercase())) {
        Ok(())
    } else {
        Err(Error::Assertion(format!(
            "result doesn't mention any of {terms:?}: {}",
            preview(&lowered)
        )))
    }
}

pub async fn run_agent_with_timer<M, T>(
    agent: &ToolCallingAgent<M, T>,
    prompt: &str,
) -> Result<(String, Duration)>
where
    M: ChatModel,
    T: ToolInvoker,
{
    let start = Instant::now();
    let answer = agent.run(prompt).await?;
    let elapsed = start.elapsed();
    tracing::debug!(?elapsed, "agent finished");
    Ok((answer, elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_setup() {
        assert!(check_critical_setup(true, "unused").is_ok());
        let err = check_critical_setup(false, "OpenAI API key is not set").unwrap_err();
        assert_eq!(err.to_string(), "assertion failed: OpenAI API key is not set");
    }

    #[test]
    fn library_match_is_case_insensitive() {
        let result = "The Context7 ID for React is /facebook/react";
        assert!(assert_library_in_result(result, "react", &["facebook", "meta", "/react"]).is_ok());
        assert!(assert_library_in_result(result, "REACT", &[]).is_ok());
    }

    #[test]
    fn library_must_be_mentioned() {
        let err = assert_library_in_result("Found /vuejs/core", "django", &["python"]).unwrap_err();
        assert!(err.to_string().contains("doesn't mention django"));
    }

    #[test]
    fn one_expected_term_is_enough() {
        let result = "numpy is at /numpy/numpy";
        assert!(assert_library_in_result(result, "numpy", &["numerical", "numpy"]).is_ok());

        let err = assert_library_in_result(result, "numpy", &["numerical", "scipy"]).unwrap_err();
        assert!(err.to_string().contains("numerical"));
    }

    #[test]
    fn mentions_any_term() {
        assert!(assert_mentions_any("No matches were found", &["not found", "no matches"]).is_ok());
        assert!(assert_mentions_any("Here you go", &["not found"]).is_err());
    }
}
