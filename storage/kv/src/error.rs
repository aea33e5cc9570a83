#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("transaction conflict")]
    Conflict,
    #[error("backend fault: {0}")]
    Backend(String),
}
