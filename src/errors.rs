use crate::canvas::state::Lifecycle;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("Frame already in progress")]
    FrameInProgress,

    #[error("No frame in progress")]
    NoFrameInProgress,

    #[error("Finish while interrupted; resume first")]
    FinishWhileInterrupted,

    #[error("Interrupt outside an active frame (lifecycle {0:?})")]
    InterruptOutsideFrame(Lifecycle),

    #[error("Resume without a matching interrupt (lifecycle {0:?})")]
    UnbalancedResume(Lifecycle),

    #[error("Zero-sized surface")]
    EmptySurface,

    #[error("Surface allocation failed: {0}")]
    Allocation(String),
}
