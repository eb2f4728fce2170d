/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Internal engine error.
    #[error(transparent)]
    Sys(#[from] crate::sys::Error),

    /// No debuggee is attached to the session.
    #[error("no process attached")]
    NotAttached,

    /// No thread of the target process could be attached.
    #[error("could not attach to any thread of process {0}")]
    AttachFailed(nix::unistd::Pid),

    /// The given thread is not tracked by the session.
    #[error("unknown thread: {0}")]
    UnknownThread(nix::unistd::Pid),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
