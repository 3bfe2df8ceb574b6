use thiserror::Error;

/// Failure taxonomy for a single cluster-client call, as classified by
/// §4.4/§7. `ClusterClient` implementations are expected to map raw
/// transport/API errors onto these variants; the executor and retry
/// manager branch on them directly rather than re-parsing error strings.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("pod or container not found")]
    NotFound,

    #[error("resize would exceed node allocatable capacity")]
    NodeResourceConstraint,

    #[error("resize would exceed a resource quota")]
    ResourceQuotaConstraint,

    #[error("memory limit cannot be decreased in place for this container")]
    MemoryDecreaseForbidden,

    #[error("the resize subresource is not supported by this cluster")]
    ResizeUnsupported,

    #[error("transient transport error: {0}")]
    Transport(String),

    #[error("request validation failed: {0}")]
    Validation(String),

    #[error("unclassified cluster client error: {0}")]
    Other(String),
}

impl ClientError {
    /// Whether this failure should be queued for retry by the deferral
    /// manager (C7), as opposed to being treated as a terminal outcome for
    /// this tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::NodeResourceConstraint | ClientError::ResourceQuotaConstraint | ClientError::Transport(_)
        )
    }
}

/// Failure from the metrics provider collaborator (§6). Any failure means
/// "skip this pod for this tick" (§4.6 step 4); there is no retry path for
/// metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics unavailable for pod: {0}")]
    Unavailable(String),
}
