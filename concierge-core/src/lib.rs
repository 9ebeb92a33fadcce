pub mod command;
pub mod context;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod user;
pub mod worker;

pub use command::Command;
pub use error::{ConciergeError, Result};
pub use models::{Snap, SnapInfo, SnapSource};
pub use worker::Worker;
