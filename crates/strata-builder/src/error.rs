use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to render {what}: {reason}")]
    Render { what: &'static str, reason: String },
}
