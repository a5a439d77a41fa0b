use thiserror::Error;

/// Errors surfaced by the encoder.
///
/// Misuse of the start/add_frame/commit call sequence and malformed
/// frame data are returned to the caller rather than logged and
/// ignored.
#[derive(Error, Debug)]
pub enum GifEncodeError {
    #[error("add_frame/commit called before start")]
    NotStarted,

    #[error("start called twice without an intervening commit")]
    AlreadyStarted,

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("sink write failed: {0}")]
    Sink(#[from] std::io::Error),
}
