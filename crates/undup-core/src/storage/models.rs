/// A tracked filesystem path and its content fingerprint.
///
/// `is_linked` is set once the path's storage has been merged with another
/// path sharing the same checksum; such records are the preferred anchor for
/// later merges since linking into them cannot form re-link chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub checksum: String,
    pub is_symlink: bool,
    pub is_linked: bool,
}
