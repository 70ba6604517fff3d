//! Subscription import and export.
//!
//! - [`OpmlExporter`] renders a user's folder tree as OPML
//! - [`OpmlImporter`] replaces a user's subscriptions and folders from OPML
//! - [`ReaderImporter`] migrates subscriptions and starred items from the
//!   reader service
//!
//! Importers report progress through an [`ImportReporter`]; the default
//! [`TracingReporter`] logs every event.

mod exporter;
mod opml_importer;
mod reader_importer;
mod reporter;
mod resolve;

use std::time::Duration;
use thiserror::Error;

use crate::feed::OpmlError;
use crate::storage::DatabaseError;

pub use exporter::{OpmlExporter, EXPORT_TITLE};
pub use opml_importer::OpmlImporter;
pub use reader_importer::{ReaderImporter, ROOT_CATEGORY};
pub use reporter::{ImportEvent, ImportReporter, MemoryReporter, SkipReason, TracingReporter};
pub use resolve::FeedLimits;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Invalid OPML: {0}")]
    Opml(#[from] OpmlError),

    #[error("User {0} does not exist")]
    UserNotFound(i64),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No folders stored for user {0}")]
    FoldersNotFound(i64),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Render(#[from] anyhow::Error),
}
