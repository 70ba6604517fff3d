use std::collections::HashMap;

use crate::feed::{export_opml, FolderNode, FolderTree, OpmlDocument, OpmlOutline};
use crate::storage::{Database, SubscribedFeed};

use super::ExportError;

/// Title written into the OPML head.
pub const EXPORT_TITLE: &str = "feedport Feeds";

/// Renders a user's folder tree and subscriptions as OPML.
pub struct OpmlExporter {
    db: Database,
    user_id: i64,
}

impl OpmlExporter {
    pub fn new(db: Database, user_id: i64) -> Self {
        Self { db, user_id }
    }

    /// The OPML text for the user.
    pub async fn process(&self) -> Result<String, ExportError> {
        let document = self.document().await?;
        Ok(export_opml(&document)?)
    }

    /// The outline document for the user, before rendering.
    ///
    /// # Errors
    ///
    /// [`ExportError::FoldersNotFound`] when the user has no folder tree.
    pub async fn document(&self) -> Result<OpmlDocument, ExportError> {
        let feeds: HashMap<i64, SubscribedFeed> = self
            .db
            .subscribed_feeds(self.user_id)
            .await?
            .into_iter()
            .map(|feed| (feed.feed_id, feed))
            .collect();
        let folders = self
            .db
            .get_folders(self.user_id)
            .await?
            .ok_or(ExportError::FoldersNotFound(self.user_id))?;

        let now = chrono::Utc::now().to_rfc2822();
        let outlines = outlines_for(&folders.folders, &feeds);
        tracing::debug!(
            user_id = self.user_id,
            feeds = feeds.len(),
            outlines = outlines.len(),
            "Built OPML export"
        );

        Ok(OpmlDocument {
            title: Some(EXPORT_TITLE.to_string()),
            date_created: Some(now.clone()),
            date_modified: Some(now),
            outlines,
        })
    }
}

fn outlines_for(tree: &FolderTree, feeds: &HashMap<i64, SubscribedFeed>) -> Vec<OpmlOutline> {
    tree.iter()
        .filter_map(|node| match node {
            FolderNode::Feed(feed_id) => feeds.get(feed_id).map(|feed| {
                OpmlOutline::feed(
                    feed.display_title(),
                    &feed.feed_address,
                    feed.feed_link.as_deref(),
                )
            }),
            FolderNode::Folder { name, children } => {
                Some(OpmlOutline::folder(name, outlines_for(children, feeds)))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parse_opml;
    use crate::storage::{NewFeed, NewSubscription};
    use pretty_assertions::assert_eq;

    async fn subscribed(db: &Database, user_id: i64, address: &str, title: &str, user_title: Option<&str>) -> i64 {
        let (feed, _) = db
            .find_or_create_feed(&NewFeed {
                feed_address: address.to_string(),
                feed_link: Some(format!("{}home", address)),
                feed_title: title.to_string(),
            })
            .await
            .unwrap();
        db.get_or_create_subscription(
            user_id,
            feed.id,
            &NewSubscription {
                active: true,
                user_title: user_title.map(str::to_string),
                mark_read_date: 0,
            },
        )
        .await
        .unwrap();
        feed.id
    }

    #[tokio::test]
    async fn test_exports_tree_with_overrides() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("exporter", false).await.unwrap();
        let a = subscribed(&db, user_id, "http://a.example.com/", "A", None).await;
        let b = subscribed(&db, user_id, "http://b.example.com/", "B", Some("My B")).await;

        let mut news = FolderTree::new();
        news.push_feed(b);
        news.push_feed(4242); // not subscribed
        let mut tree = FolderTree::new();
        tree.push_feed(a);
        tree.push_folder("News", news);
        db.replace_folders(user_id, &tree).await.unwrap();

        let opml = OpmlExporter::new(db, user_id).process().await.unwrap();
        assert!(opml.contains(r#"<opml version="1.1">"#));
        assert!(opml.contains("<title>feedport Feeds</title>"));
        assert!(opml.contains("<dateCreated>"));

        let parsed = parse_opml(&opml).unwrap();
        assert_eq!(
            parsed.outlines,
            vec![
                OpmlOutline::feed("A", "http://a.example.com/", Some("http://a.example.com/home")),
                OpmlOutline::folder(
                    "News",
                    vec![OpmlOutline::feed(
                        "My B",
                        "http://b.example.com/",
                        Some("http://b.example.com/home"),
                    )],
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_folders_is_error() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("empty", false).await.unwrap();

        let err = OpmlExporter::new(db, user_id).process().await.unwrap_err();
        assert!(matches!(err, ExportError::FoldersNotFound(id) if id == user_id));
    }

    #[tokio::test]
    async fn test_empty_tree_exports_empty_body() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("blank", false).await.unwrap();
        db.replace_folders(user_id, &FolderTree::new()).await.unwrap();

        let document = OpmlExporter::new(db, user_id).document().await.unwrap();
        assert!(document.outlines.is_empty());
        assert_eq!(document.date_created, document.date_modified);
    }
}
