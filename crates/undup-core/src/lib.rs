pub mod config;
pub mod error;
pub mod fsops;
pub mod hasher;
pub mod index;
pub mod scanner;
pub mod storage;

pub use config::AppConfig;
pub use error::Error;
pub use hasher::ChecksumKind;
pub use index::{DedupIndex, UpdateResult};
pub use storage::models::FileRecord;
pub use storage::Database;
