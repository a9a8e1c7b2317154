use std::io;

use thiserror::Error;

use crate::disk::block::SectorAddress;

/// Errors that can be returned from disk image operations.  These are
/// generally converted into `io::Error`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DiskError {
    /// Unknown error
    #[error("unknown error")]
    Unknown,
    /// Write access attempted to write protected media
    #[error("write access attempted to write protected media")]
    ReadOnly,
    /// The file is delete protected
    #[error("file {0} is delete protected")]
    DeleteProtected(String),
    /// Bad track or sector
    #[error("bad track or sector {0}")]
    InvalidSector(SectorAddress),
    /// Offset out of bounds
    #[error("offset out of bounds")]
    InvalidOffset,
    /// A side has to be given for sector access on unformatted media
    #[error("side required for sector access on unformatted media")]
    UnexpectedSide,
    /// Neither a FLX nor a DSK image
    #[error("not a FLEX disk image")]
    NotAFlexImage,
    /// The JVC header contradicts the image layout
    #[error("invalid JVC header")]
    InvalidJvcHeader,
    /// Attempt to use unformatted media
    #[error("attempt to use unformatted media")]
    Unformatted,
    /// Format parameters out of range or media already formatted
    #[error("invalid format request")]
    InvalidFormatRequest,
    /// File not found
    #[error("file not found: {0}")]
    NotFound(String),
    /// A file with the specified filename already exists
    #[error("file already exists: {0}")]
    FileExists(String),
    /// Free chain exhausted
    #[error("disk is full")]
    DiskFull,
    /// No directory slot left and the directory cannot be extended
    #[error("directory is full")]
    DirectoryFull,
    /// Random file sector map exhausted
    #[error("random file sector map is full")]
    RecordMapFull,
    /// Chain loop detected
    #[error("chain loop detected at {0}")]
    ChainLoop(SectorAddress),
    /// A file chain is longer than its directory entry claims
    #[error("file {0} has unexpected sector {1}")]
    UnexpectedSector(String, SectorAddress),
    /// Filename is not a valid 8.3 FLEX filename
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    /// Wildcards are not allowed here
    #[error("wildcard not supported: {0}")]
    WildcardNotSupported(String),
    /// Malformed wildcard pattern
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    /// Attempt to write a file without content
    #[error("attempt to write empty file {0}")]
    EmptyFile(String),
    /// Rename with identical names
    #[error("old and new filename are identical: {0}")]
    SameName(String),
    /// Copy source and destination are the same file
    #[error("attempt to copy {0} onto itself")]
    CopyOnItself(String),
    /// Sector map access to a sequential file
    #[error("not a random file: {0}")]
    NotRandomFile(String),
    /// Iterator operation without a current entry
    #[error("directory iterator is not positioned on an entry")]
    Unpositioned,
    /// Operation not supported by this container
    #[error("operation not supported by this container")]
    Unsupported,
}

/// The error taxonomy callers branch on.  Each `DiskError` belongs to
/// exactly one kind; plain host I/O errors are `IoFailure`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    ReadOnly,
    CorruptStructure,
    StorageFull,
    IoFailure,
    InvalidArgument,
}

impl ErrorKind {
    /// Classify any `io::Error` returned by this crate.
    pub fn of(error: &io::Error) -> ErrorKind {
        match DiskError::from_io_error(error) {
            Some(disk_error) => disk_error.kind(),
            None => ErrorKind::IoFailure,
        }
    }
}

impl From<DiskError> for io::Error {
    fn from(error: DiskError) -> io::Error {
        use std::io::ErrorKind::*;
        let kind = match error.kind() {
            ErrorKind::NotFound => NotFound,
            ErrorKind::AlreadyExists => AlreadyExists,
            ErrorKind::ReadOnly => PermissionDenied,
            ErrorKind::CorruptStructure => InvalidData,
            ErrorKind::StorageFull => Other,
            ErrorKind::IoFailure => Other,
            ErrorKind::InvalidArgument => InvalidInput,
        };
        io::Error::new(kind, error)
    }
}

impl DiskError {
    /// If the provided `io::Error` contains a `DiskError`, return the
    /// underlying `DiskError`.  If not, return None.
    pub fn from_io_error(error: &io::Error) -> Option<DiskError> {
        error
            .get_ref()
            .and_then(|e| e.downcast_ref::<DiskError>())
            .cloned()
    }

    /// This is sometimes useful instead of .into() when the compiler doesn't
    /// have enough information to perform type inference.
    pub fn to_io_error(&self) -> io::Error {
        self.clone().into()
    }

    pub fn kind(&self) -> ErrorKind {
        use self::DiskError::*;
        match *self {
            NotFound(_) => ErrorKind::NotFound,
            FileExists(_) => ErrorKind::AlreadyExists,
            ReadOnly | DeleteProtected(_) => ErrorKind::ReadOnly,
            InvalidSector(_)
            | InvalidOffset
            | NotAFlexImage
            | InvalidJvcHeader
            | Unformatted
            | DirectoryFull
            | RecordMapFull
            | ChainLoop(_)
            | UnexpectedSector(_, _) => ErrorKind::CorruptStructure,
            DiskFull => ErrorKind::StorageFull,
            Unknown => ErrorKind::IoFailure,
            UnexpectedSide
            | InvalidFormatRequest
            | InvalidFilename(_)
            | WildcardNotSupported(_)
            | InvalidPattern(_)
            | EmptyFile(_)
            | SameName(_)
            | CopyOnItself(_)
            | NotRandomFile(_)
            | Unpositioned
            | Unsupported => ErrorKind::InvalidArgument,
        }
    }
}

impl PartialEq<io::Error> for DiskError {
    fn eq(&self, other: &io::Error) -> bool {
        matches!(DiskError::from_io_error(other), Some(ref e) if e == self)
    }
}

impl PartialEq<DiskError> for io::Error {
    fn eq(&self, other: &DiskError) -> bool {
        matches!(DiskError::from_io_error(self), Some(ref e) if e == other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_round_trip() {
        let error: io::Error = DiskError::FileExists("CAT.CMD".into()).into();
        assert_eq!(error.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(
            DiskError::from_io_error(&error),
            Some(DiskError::FileExists("CAT.CMD".into()))
        );
        assert!(error == DiskError::FileExists("CAT.CMD".into()));
        assert_eq!(ErrorKind::of(&error), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_plain_io_error_is_io_failure() {
        let error = io::Error::new(io::ErrorKind::Other, "disk on fire");
        assert_eq!(DiskError::from_io_error(&error), None);
        assert_eq!(ErrorKind::of(&error), ErrorKind::IoFailure);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(DiskError::DiskFull.kind(), ErrorKind::StorageFull);
        assert_eq!(DiskError::DirectoryFull.kind(), ErrorKind::CorruptStructure);
        assert_eq!(DiskError::RecordMapFull.kind(), ErrorKind::CorruptStructure);
        assert_eq!(DiskError::InvalidJvcHeader.kind(), ErrorKind::CorruptStructure);
        assert_eq!(DiskError::ReadOnly.kind(), ErrorKind::ReadOnly);
        assert_eq!(
            DiskError::NotFound("X.TXT".into()).to_io_error().kind(),
            io::ErrorKind::NotFound
        );
    }
}
