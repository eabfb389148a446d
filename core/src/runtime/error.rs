use thiserror::Error;

use crate::detection::DetectionError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to build detection pool")]
    Detection(#[from] DetectionError),

    #[error("frame processing task failed")]
    FrameTask(#[from] tokio::task::JoinError),
}
