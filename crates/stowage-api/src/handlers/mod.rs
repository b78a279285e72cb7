//! Route handlers

pub mod attachments;
pub mod content;
pub mod health;
pub mod quota;
pub mod upload;
