use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Detections dump Error at line {line}: {reason}")]
    Dump { line: usize, reason: String },

    #[error("Pipeline is closed")]
    PipelineClosed,

    #[error("Pipeline worker panicked")]
    WorkerPanicked,
}
