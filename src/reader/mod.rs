//! HTTP access to the external reader service.

mod client;

pub use client::{ReaderClient, ReaderError};

/// API path of the subscription list (XML).
pub const SUBSCRIPTION_LIST_PATH: &str = "0/subscription/list";

/// API path of the user's starred items (JSON), limited to `count` items.
pub fn starred_items_path(count: u32) -> String {
    format!("0/stream/contents/user/-/state/com.google/starred?n={}", count)
}
