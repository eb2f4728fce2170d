use nix::sys::wait::WaitStatus;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// File open/read error.
    #[error("{0}: {1}")]
    File(std::path::PathBuf, std::io::Error),

    #[error("bad child wait status: {0:?}")]
    BadChildWait(WaitStatus),

    #[error("os error: {0}")]
    Os(#[from] nix::Error),

    #[error(transparent)]
    Elf(#[from] goblin::error::Error),

    #[error("elf.e_machine={0:#x} not supported")]
    ElfPlatform(u16),

    #[error("missing auxv value")]
    MissingAuxv,

    #[error("memory read/write {0} bytes instead of {1}")]
    PartialMemOp(usize, usize),

    #[error(transparent)]
    InteriorNulByte(#[from] std::ffi::NulError),

    #[error("child process execution failed: {0}")]
    ChildExec(std::io::Error),
}

/// Result type of the OS layer.
pub type Result<T> = core::result::Result<T, Error>;
