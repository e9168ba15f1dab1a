#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("broker {endpoint} unreachable after {attempts} attempts: {last}")]
    ConnectExhausted {
        endpoint: String,
        attempts: u32,
        last: bridge_api::BridgeError,
    },

    #[error("dispatch thread: {0}")]
    Dispatch(String),
}
