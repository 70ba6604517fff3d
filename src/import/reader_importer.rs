use std::sync::Arc;

use crate::config::Config;
use crate::feed::{
    parse_subscription_list, raw_item_title, FolderTree, ReaderItem, StarredItem, StarredStream,
};
use crate::reader::{starred_items_path, ReaderClient, SUBSCRIPTION_LIST_PATH};
use crate::storage::{Database, DatabaseError, FeedRecord};
use crate::util::clean_title;

use super::reporter::{ImportEvent, ImportReporter, SkipReason, TracingReporter};
use super::resolve::{resolve_feed, subscribe, FeedCandidate, FeedLimits, Resolution};
use super::ImportError;

/// Bucket for items without a category; its feeds go to the top level.
pub const ROOT_CATEGORY: &str = "Root";

/// Migrates subscriptions and starred items from the reader service.
pub struct ReaderImporter {
    db: Database,
    client: ReaderClient,
    user_id: i64,
    limits: FeedLimits,
    starred_count: u32,
    reporter: Arc<dyn ImportReporter>,
}

impl ReaderImporter {
    pub fn new(db: Database, client: ReaderClient, user_id: i64) -> Self {
        let config = Config::default();
        Self {
            db,
            client,
            user_id,
            limits: FeedLimits::from(&config),
            starred_count: config.starred_count,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.limits = FeedLimits::from(config);
        self.starred_count = config.starred_count;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ImportReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Import the subscription list.
    ///
    /// Without `xml` the list is fetched from the service; when that yields
    /// nothing the import does nothing and returns `Ok(None)`. `auto_active`
    /// activates new subscriptions even for non-premium users.
    pub async fn import_feeds(
        &self,
        xml: Option<&str>,
        auto_active: bool,
    ) -> Result<Option<FolderTree>, ImportError> {
        let fetched;
        let xml = match xml {
            Some(xml) => xml,
            None => match self.client.authorized_get(self.user_id, SUBSCRIPTION_LIST_PATH).await {
                Some(body) => {
                    fetched = body;
                    fetched.as_str()
                }
                None => {
                    self.report(ImportEvent::NoSubscriptionList);
                    return Ok(None);
                }
            },
        };

        self.process_feeds(xml, auto_active).await.map(Some)
    }

    /// Subscribe the user to every listed feed and build the folder tree.
    ///
    /// The tree is returned whether or not it was stored: an existing tree is
    /// never overwritten.
    pub async fn process_feeds(&self, xml: &str, auto_active: bool) -> Result<FolderTree, ImportError> {
        let user = self
            .db
            .get_user(self.user_id)
            .await?
            .ok_or(ImportError::UserNotFound(self.user_id))?;
        let active = user.is_premium || auto_active;

        let cleared = self.db.clear_subscriptions(self.user_id).await?;
        self.report(ImportEvent::SubscriptionsCleared { count: cleared });

        let mut buckets: Vec<(String, FolderTree)> = Vec::new();
        for item in parse_subscription_list(xml) {
            let address = item
                .feed_address
                .clone()
                .or_else(|| item.feed_link.clone())
                .unwrap_or_default();

            match self.process_item(&item, &address, active).await {
                Ok(Some(feed_id)) => {
                    let category = item.category.as_deref().unwrap_or(ROOT_CATEGORY);
                    bucket(&mut buckets, category).push_feed(feed_id);
                }
                Ok(None) => {}
                Err(e) => self.report(ImportEvent::FeedFailed {
                    address,
                    error: e.to_string(),
                }),
            }
        }

        let folders = rearrange_folders(buckets);
        if self.db.create_folders_if_absent(self.user_id, &folders).await? {
            self.report(ImportEvent::FoldersSaved {
                feeds: folders.feed_ids().len(),
                folders: folders.folder_count(),
            });
        } else {
            self.report(ImportEvent::FoldersKept);
        }

        Ok(folders)
    }

    async fn process_item(
        &self,
        item: &ReaderItem,
        address: &str,
        active: bool,
    ) -> Result<Option<i64>, DatabaseError> {
        if address.trim().is_empty() {
            self.report(ImportEvent::FeedSkipped {
                address: String::new(),
                reason: SkipReason::MissingAddress,
            });
            return Ok(None);
        }

        let title = item
            .title
            .as_deref()
            .and_then(clean_title)
            .unwrap_or_else(|| address.to_owned());
        let candidate = FeedCandidate {
            address,
            link: item.feed_link.as_deref(),
            title: &title,
        };

        let (feed, created) = match resolve_feed(&self.db, self.limits, &candidate).await? {
            Resolution::Feed { record, created } => (record, created),
            Resolution::Skipped(reason) => {
                self.report(ImportEvent::FeedSkipped {
                    address: address.to_owned(),
                    reason,
                });
                return Ok(None);
            }
        };

        subscribe(&self.db, self.user_id, feed.id, active, None, false).await?;
        self.report(ImportEvent::FeedSubscribed {
            feed_id: feed.id,
            title,
            new_feed: created,
        });
        Ok(Some(feed.id))
    }

    /// Fetch up to `count` starred items (config default when `None`) and
    /// store them. Returns how many were newly stored.
    pub async fn import_starred_items(&self, count: Option<u32>) -> Result<usize, ImportError> {
        let path = starred_items_path(count.unwrap_or(self.starred_count));
        let stream = match self.client.authorized_get(self.user_id, &path).await {
            Some(body) => StarredStream::from_json(&body).ok(),
            None => None,
        };

        match stream {
            Some(stream) if !stream.items.is_empty() => {
                self.report(ImportEvent::StoriesFetched {
                    count: stream.items.len(),
                });
                self.process_starred_items(&stream.items).await
            }
            _ => {
                self.report(ImportEvent::NoStories);
                Ok(0)
            }
        }
    }

    /// Store each item as a starred story. Failures are reported per item and
    /// never stop the batch.
    pub async fn process_starred_items(
        &self,
        items: &[serde_json::Value],
    ) -> Result<usize, ImportError> {
        let mut starred = 0;

        for value in items {
            let item = match StarredItem::from_value(value) {
                Ok(item) => item,
                Err(e) => {
                    self.report(ImportEvent::StarFailed {
                        title: raw_item_title(value).to_owned(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let title = item.display_title().to_owned();

            let feed = match self.origin_feed(&item).await {
                Ok(feed) => feed,
                Err(e) => {
                    self.report(ImportEvent::StarFailed {
                        title,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let feed_id = feed.map(|f| f.id);

            let story = match item.to_story(self.user_id, feed_id) {
                Ok(story) => story,
                Err(e) => {
                    self.report(ImportEvent::StarFailed {
                        title,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match self.db.create_starred_story(&story).await {
                Ok(_) => {
                    starred += 1;
                    self.report(ImportEvent::StoryStarred { title, feed_id });
                }
                Err(DatabaseError::Duplicate(_)) => {
                    self.report(ImportEvent::AlreadyStarred { title });
                }
                Err(e) => {
                    self.report(ImportEvent::StarFailed {
                        title,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(starred)
    }

    /// Existing feed the item came from, by stream id then site URL.
    async fn origin_feed(&self, item: &StarredItem) -> Result<Option<FeedRecord>, DatabaseError> {
        if let Some(stream_id) = item.origin.stream_id.as_deref() {
            let address = stream_id.strip_prefix("feed/").unwrap_or(stream_id);
            if let Some(feed) = self.db.get_feed_from_url(address).await? {
                return Ok(Some(feed));
            }
        }
        match item.origin.html_url.as_deref() {
            Some(html_url) => self.db.get_feed_from_url(html_url).await,
            None => Ok(None),
        }
    }

    fn report(&self, event: ImportEvent) {
        self.reporter.report(self.user_id, &event);
    }
}

fn bucket<'a>(buckets: &'a mut Vec<(String, FolderTree)>, category: &str) -> &'a mut FolderTree {
    let index = match buckets.iter().position(|(name, _)| name == category) {
        Some(index) => index,
        None => {
            buckets.push((category.to_owned(), FolderTree::new()));
            buckets.len() - 1
        }
    };
    &mut buckets[index].1
}

/// Root-bucket feeds go to the top level; every other bucket becomes a
/// folder. Buckets keep their first-seen order.
fn rearrange_folders(buckets: Vec<(String, FolderTree)>) -> FolderTree {
    let mut folders = FolderTree::new();
    for (category, tree) in buckets {
        if category == ROOT_CATEGORY {
            for feed_id in tree.feed_ids() {
                folders.push_feed(feed_id);
            }
        } else {
            folders.push_folder(category, tree);
        }
    }
    folders
}
