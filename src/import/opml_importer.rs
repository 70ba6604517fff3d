use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::feed::{parse_opml, FolderTree, OpmlOutline};
use crate::storage::{Database, User};
use crate::util::clean_title;

use super::reporter::{ImportEvent, ImportReporter, SkipReason, TracingReporter};
use super::resolve::{resolve_feed, subscribe, FeedCandidate, FeedLimits, Resolution};
use super::ImportError;

/// Imports an OPML subscription list for one user.
///
/// The user's subscriptions are replaced by the document's feeds and the
/// folder tree is replaced by the document's outline structure.
pub struct OpmlImporter {
    db: Database,
    user_id: i64,
    limits: FeedLimits,
    timeout: Duration,
    reporter: Arc<dyn ImportReporter>,
}

impl OpmlImporter {
    pub fn new(db: Database, user_id: i64) -> Self {
        let config = Config::default();
        Self {
            db,
            user_id,
            limits: FeedLimits::from(&config),
            timeout: config.import_timeout(),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.limits = FeedLimits::from(config);
        self.timeout = config.import_timeout();
        self
    }

    pub fn with_limits(mut self, limits: FeedLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ImportReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run [`process`](Self::process) under the import deadline.
    ///
    /// Writes made before the deadline passed are kept.
    pub async fn try_processing(&self, opml: &str) -> Result<FolderTree, ImportError> {
        tokio::time::timeout(self.timeout, self.process(opml))
            .await
            .map_err(|_| {
                tracing::warn!(user_id = self.user_id, timeout = ?self.timeout, "OPML import timed out");
                ImportError::Timeout(self.timeout)
            })?
    }

    /// Replace the user's subscriptions and folders with the document's.
    ///
    /// Returns the folder tree that was stored.
    pub async fn process(&self, opml: &str) -> Result<FolderTree, ImportError> {
        let user = self
            .db
            .get_user(self.user_id)
            .await?
            .ok_or(ImportError::UserNotFound(self.user_id))?;

        let cleared = self.db.clear_subscriptions(self.user_id).await?;
        self.report(ImportEvent::SubscriptionsCleared { count: cleared });

        let document = parse_opml(opml)?;
        let folders = self.process_outlines(&document.outlines, &user).await?;

        self.db.replace_folders(self.user_id, &folders).await?;
        self.report(ImportEvent::FoldersSaved {
            feeds: folders.feed_ids().len(),
            folders: folders.folder_count(),
        });

        Ok(folders)
    }

    /// Progress estimate: the larger of the current subscription count and
    /// the number of top-level outlines.
    pub async fn count_feeds_in_opml(&self, opml: &str) -> Result<usize, ImportError> {
        let outline_count = parse_opml(opml)?.outlines.len();
        let subscription_count = self.db.count_subscriptions(self.user_id).await?;
        Ok(outline_count.max(usize::try_from(subscription_count).unwrap_or(0)))
    }

    fn process_outlines<'a>(
        &'a self,
        outlines: &'a [OpmlOutline],
        user: &'a User,
    ) -> BoxFuture<'a, Result<FolderTree, ImportError>> {
        async move {
            let mut folders = FolderTree::new();

            for outline in outlines {
                if outline.xml_url.is_none() && (outline.text.is_some() || outline.title.is_some()) {
                    let name = first_title(&[outline.text.as_deref(), outline.title.as_deref()])
                        .unwrap_or_default();
                    let children = self.process_outlines(&outline.children, user).await?;
                    folders.push_folder(name, children);
                } else if let Some(xml_url) = outline.xml_url.as_deref() {
                    if let Some(feed_id) = self.process_feed(outline, xml_url, user).await? {
                        folders.push_feed(feed_id);
                    }
                }
            }

            Ok(folders)
        }
        .boxed()
    }

    /// Subscribe to one feed outline. `None` when the outline was skipped.
    async fn process_feed(
        &self,
        outline: &OpmlOutline,
        xml_url: &str,
        user: &User,
    ) -> Result<Option<i64>, ImportError> {
        let (feed_title, mut user_title) =
            match first_title(&[outline.title.as_deref(), outline.text.as_deref()]) {
                Some(title) => (title.clone(), Some(title)),
                None => {
                    let fallback = outline
                        .html_url
                        .as_deref()
                        .filter(|url| !url.trim().is_empty())
                        .unwrap_or(xml_url);
                    (fallback.to_owned(), None)
                }
            };

        let candidate = FeedCandidate {
            address: xml_url,
            link: outline.html_url.as_deref(),
            title: &feed_title,
        };
        let (feed, created) = match resolve_feed(&self.db, self.limits, &candidate).await? {
            Resolution::Feed { record, created } => (record, created),
            Resolution::Skipped(reason) => {
                self.skip(xml_url, reason);
                return Ok(None);
            }
        };

        if user_title.as_deref() == Some(feed.feed_title.as_str()) {
            user_title = None;
        }

        subscribe(
            &self.db,
            self.user_id,
            feed.id,
            user.is_premium,
            user_title,
            user.is_premium,
        )
        .await?;

        self.report(ImportEvent::FeedSubscribed {
            feed_id: feed.id,
            title: feed_title,
            new_feed: created,
        });
        Ok(Some(feed.id))
    }

    fn skip(&self, address: &str, reason: SkipReason) {
        self.report(ImportEvent::FeedSkipped {
            address: address.to_owned(),
            reason,
        });
    }

    fn report(&self, event: ImportEvent) {
        self.reporter.report(self.user_id, &event);
    }
}

/// First candidate that still has text after cleaning.
fn first_title(candidates: &[Option<&str>]) -> Option<String> {
    candidates.iter().flatten().find_map(|raw| clean_title(raw))
}
