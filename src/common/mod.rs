//! Common module
//!
//! This module contains shared errors and utility functions used throughout the application.

pub mod error;
pub mod fs;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{ProxyError, Result};
pub use fs::{check_file_exists, read_file, write_file_atomic};
pub use self::log::{init_logger, parse_level, set_log_level};
pub use net::{check_port, parse_socket_addr, split_host_port};
