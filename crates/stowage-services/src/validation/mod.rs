//! Structural and content checks applied to a candidate upload before any write.

mod file;
mod scanner;

pub use file::{FileValidator, ValidationReport};
pub use scanner::ContentScanner;
