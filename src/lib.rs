pub mod config;
pub mod error;
pub mod logging;
pub mod sender;
pub mod storage;

pub use config::Config;
pub use error::SenderError;
pub use sender::{DicomSender, RunSummary, SendHandle, StudyRegistration};
