pub mod key;
pub mod backend;
pub mod memory;
pub mod log;
pub mod layout;
pub mod file_lock;