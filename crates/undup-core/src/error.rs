use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("checksum mismatch between {anchor} and {duplicate}; re-run duplicate discovery")]
    ChecksumMismatch { anchor: String, duplicate: String },

    #[error("{0} is a symlink and cannot be merged by content")]
    SymlinkNotMergeable(String),

    #[error("no record for path {0}")]
    RecordNotFound(String),

    #[error("{0} is not empty; refusing to move files")]
    SweepDirNotEmpty(String),

    #[error("unknown checksum type '{0}'")]
    UnknownChecksumType(String),
}
