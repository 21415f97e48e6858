pub mod backoff;
pub mod checksums;
pub mod file;
pub mod queue;
pub mod report;
pub mod syncer;
