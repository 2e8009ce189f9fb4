use thiserror::Error;

use strata_state::StateError;

pub type FencingResult<T> = Result<T, FencingError>;

#[derive(Debug, Error)]
pub enum FencingError {
    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("generation counter exhausted for tenant {0}")]
    GenerationExhausted(String),
}
