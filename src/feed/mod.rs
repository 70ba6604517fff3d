//! Subscription document formats.
//!
//! - [`folder_tree`] - the per-user folder layout and its compact JSON form
//! - [`opml`] - OPML parsing into an outline tree, and OPML rendering
//! - [`reader_xml`] - the reader service's subscription list (lenient XML)
//! - [`starred`] - the reader service's starred-items stream (JSON)

mod folder_tree;
mod opml;
mod reader_xml;
mod starred;

pub use folder_tree::{FolderNode, FolderTree};
pub use opml::{
    export_opml, export_to_file, parse_opml, OpmlDocument, OpmlError, OpmlOutline, MAX_OPML_DEPTH,
};
pub use reader_xml::{parse_subscription_list, ReaderItem};
pub use starred::{
    raw_item_title, ItemContent, ItemLink, ItemOrigin, MissingField, StarredItem, StarredStream,
    UNTITLED,
};
