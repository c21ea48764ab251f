pub mod cert;
pub mod drive;
pub mod git_sync;
pub mod history;
pub mod login;
pub mod progress;
pub mod report;
pub mod schedule;
pub mod secrets;
pub mod status;
pub mod tenant;
