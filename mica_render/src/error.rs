use thiserror::Error;

/// Errors surfaced by resource-setup entry points.
///
/// Draw, blit and clear operations do not return errors; their
/// preconditions are debug-asserted instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("out of memory")]
    OutOfMemory,
    #[error("incomplete framebuffer")]
    IncompleteFramebuffer,
    #[error("invalid handle")]
    InvalidHandle,
}
