use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The embedding provider could not produce a usable vector. The whole
    /// match call fails and may be retried.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// One vocabulary partition timed out or failed. The matcher recovers
    /// this locally as an empty sublist.
    #[error("Vocabulary '{vocabulary}' unavailable: {reason}")]
    VocabularyUnavailable { vocabulary: String, reason: String },

    #[error("Malformed label: {0}")]
    MalformedLabel(String),

    #[error("Unknown vocabulary: {0}")]
    UnknownVocabulary(String),

    #[error("Explanation failed: {0}")]
    Explanation(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::EmbeddingUnavailable(_) | Error::VocabularyUnavailable { .. })
    }

    pub fn vocabulary_unavailable(vocabulary: impl Into<String>, reason: impl ToString) -> Self {
        Error::VocabularyUnavailable { vocabulary: vocabulary.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_provider_and_partition_failures_are_transient() {
        assert!(Error::EmbeddingUnavailable("down".into()).is_transient());
        assert!(Error::vocabulary_unavailable("fast", "timed out").is_transient());
        assert!(!Error::MalformedLabel("".into()).is_transient());
        assert!(!Error::UnknownVocabulary("mesh".into()).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn partition_failure_names_the_vocabulary() {
        let err = Error::vocabulary_unavailable("fast", "timed out");
        assert_eq!(err.to_string(), "Vocabulary 'fast' unavailable: timed out");
    }
}
