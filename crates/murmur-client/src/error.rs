use thiserror::Error;

/// One variant per remote operation; the orchestrator collapses all three
/// into the same user-visible fallback, but logs keep the distinction.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("speech-to-text request failed: {0}")]
    Transcription(#[source] RequestFailure),

    #[error("text generation request failed: {0}")]
    Generation(#[source] RequestFailure),

    #[error("speech synthesis request failed: {0}")]
    Synthesis(#[source] RequestFailure),
}

#[derive(Error, Debug)]
pub enum RequestFailure {
    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed response: {0}")]
    Body(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failure_display_names_the_operation() {
        let err = ClientError::Generation(RequestFailure::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: "upstream down".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("text generation"));
        let source = std::error::Error::source(&err).unwrap().to_string();
        assert!(source.contains("502"));
        assert!(source.contains("upstream down"));
    }

    #[test]
    fn body_failure_display() {
        let err = ClientError::Transcription(RequestFailure::Body("missing transcript".into()));
        assert!(err.to_string().contains("speech-to-text"));
    }
}
