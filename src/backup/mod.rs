//! Point-in-time backups of instance data directories.
//!
//! * `archive` - zip packing and unpacking
//! * `store` - listing, naming and pruning the archives of one instance
//! * `schedule` - the recurring timer of one instance
//! * `engine` - backups coordinated with the live server's save state
pub mod archive;
mod engine;
mod schedule;
mod store;

pub use archive::{ArchiveScope, create_archive, extract_archive};
pub use engine::{SAVE_ALL_COMMAND, SAVE_OFF_COMMAND, SAVE_ON_COMMAND, write_backup};
pub use schedule::BackupSchedule;
pub use store::{ARCHIVE_EXTENSION, BackupRecord, BackupStore, NAME_FORMAT, partial_path};
