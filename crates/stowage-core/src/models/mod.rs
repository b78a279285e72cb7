//! Data models for the upload governance domain.

mod attachment;
mod category;
mod content;
mod context;
mod object;
mod quota;
mod role;

pub use attachment::*;
pub use category::{extension_of, normalize_mime, Category};
pub use content::*;
pub use context::*;
pub use object::*;
pub use quota::*;
pub use role::*;
