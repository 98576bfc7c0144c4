/// Errors produced by the pure domain layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A submission precondition failed. Carries a user-visible,
    /// field-specific message; nothing was mutated.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
