pub mod config;
pub mod project;
pub mod sync;

pub use project::{IgnoreFilter, ProjectError, ThemeProject};
pub use sync::file::FileEntry;
pub use sync::queue::{Operation, OperationKind};
pub use sync::syncer::{DownloadOptions, SyncError, Syncer, UploadOptions};
