use thiserror::Error;

/// Failure detail for the typed TFS API.
///
/// The literal `tfs_*` facade methods collapse every variant to `-1`, per
/// the original contract of "non-negative on success, -1 on failure". This
/// enum exists purely so callers of the typed layer (and the crate's own
/// logging) can tell failures apart without re-deriving them from
/// preconditions.
#[derive(Debug, Error)]
pub enum TfsError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("no free data blocks")]
    NoFreeBlocks,
    #[error("no free inodes")]
    NoFreeInodes,
    #[error("no free open-file handles")]
    NoFreeFileHandles,
    #[error("file not found")]
    NotFound,
    #[error("inode is not a directory")]
    NotADirectory,
    #[error("directory is full")]
    DirectoryFull,
    #[error("invalid file handle")]
    InvalidHandle,
    #[error("invalid inode number")]
    InvalidInumber,
    #[error("host filesystem I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PartialEq for TfsError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidArgument, Self::InvalidArgument) => true,
            (Self::NoFreeBlocks, Self::NoFreeBlocks) => true,
            (Self::NoFreeInodes, Self::NoFreeInodes) => true,
            (Self::NoFreeFileHandles, Self::NoFreeFileHandles) => true,
            (Self::NotFound, Self::NotFound) => true,
            (Self::NotADirectory, Self::NotADirectory) => true,
            (Self::DirectoryFull, Self::DirectoryFull) => true,
            (Self::InvalidHandle, Self::InvalidHandle) => true,
            (Self::InvalidInumber, Self::InvalidInumber) => true,
            (Self::Io(a), Self::Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}

impl Eq for TfsError {}
