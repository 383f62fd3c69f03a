//! Control socket for pomoctl

pub mod server;

pub use server::{entry_reports, status_report};
