use ph_db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("vps {0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The registry references a container the runtime no longer has.
    #[error("vps {vps_id} references container {handle}, which the runtime does not have")]
    NotFoundInRuntime { vps_id: String, handle: String },

    #[error("runtime error: {0}")]
    Runtime(#[from] ph_infra::Error),

    #[error("registry error: {0}")]
    Store(#[from] StoreError),

    #[error("no unused vps id found after {0} attempts")]
    IdSpaceExhausted(usize),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
