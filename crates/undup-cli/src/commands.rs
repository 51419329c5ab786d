use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "undup", about = "Content-addressed file deduplication index")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk the configured roots (or a given one), refresh all checksums,
    /// and hard-link confirmed duplicates
    Scan {
        /// Root directory to scan; defaults to the configured root_paths
        root: Option<String>,
    },
    /// Update or insert the checksum for a single path
    Update { path: String },
    /// List all non-symlink paths recorded for a checksum, anchors first
    Dupes { checksum: String },
    /// Merge a duplicate's storage into an anchor's and mark both linked
    Merge { anchor: String, duplicate: String },
    /// Move duplicate files into DUPDIR, keeping one anchor per checksum
    Sweep {
        dupdir: String,
        /// Symlink the vacated paths back to their anchor instead of
        /// dropping their records
        #[arg(long)]
        symlink: bool,
    },
    /// Remove entries for files that no longer exist
    Vacuum,
    /// Rewrite a path prefix (covers file and directory renames)
    Rename { old: String, new: String },
    /// Remove the entry for a path
    Remove { path: String },
    /// Migrate the store schema to the current version
    Migrate,
    /// Print the effective configuration
    PrintConfig,
}
