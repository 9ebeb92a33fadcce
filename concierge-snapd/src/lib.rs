pub mod client;

pub use client::{SnapdClient, SNAPD_SOCKET};
