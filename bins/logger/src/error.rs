#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("log directory '{path}': {source}")]
    LogDir { path: String, source: std::io::Error },

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
