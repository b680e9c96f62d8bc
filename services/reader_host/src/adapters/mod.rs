
pub mod backend;
pub mod clock;
pub mod db;
pub mod shell;

pub use backend::HttpNoteBackend;
pub use clock::SystemClock;
pub use db::SqliteAccessStore;
pub use shell::{ShellAdSdk, ShellBridge, ShellScreenCapture};
