use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum HttpError {
    #[error("HTTP status {0}{1}")]
    Status(u16, String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response decode failed: {0}")]
    Body(String),
}

pub(crate) fn basic_auth_header(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

fn status_snippet(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        let truncated = body.chars().take(240).collect::<String>();
        format!(" ({truncated})")
    }
}

/// Performs one GET bounded by `timeout` for connect, read and write.
pub(crate) fn get_text(
    agent: &ureq::Agent,
    url: &str,
    authorization: &str,
    query: &[(&str, &str)],
) -> Result<String, HttpError> {
    let mut request = agent.get(url).set("Authorization", authorization);
    for (key, value) in query {
        request = request.query(key, value);
    }

    match request.call() {
        Ok(response) => response
            .into_string()
            .map_err(|err| HttpError::Body(err.to_string())),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().ok().unwrap_or_default();
            Err(HttpError::Status(status, status_snippet(&body)))
        }
        Err(ureq::Error::Transport(err)) => Err(HttpError::Transport(err.to_string())),
    }
}

pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}
