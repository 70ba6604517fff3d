//! Utility functions shared by the import and export paths.
//!
//! - **URL normalization**: canonical lookup keys for feed addresses and links
//! - **Text cleanup**: control-character stripping and title tidying for
//!   user-supplied documents

mod text;
mod urlnorm;

pub use text::{clean_title, strip_control_chars, truncate_chars};
pub use urlnorm::{normalize_optional_url, normalize_url, UrlNormError};
