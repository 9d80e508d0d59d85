pub mod channels;
pub mod files;
mod not_found;
pub mod stream;

pub use not_found::not_found_handler;
