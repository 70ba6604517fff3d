//! End-to-end OPML import/export against an in-memory store.

use feedport::feed::{FolderNode, FolderTree};
use feedport::import::{FeedLimits, ImportEvent, MemoryReporter, OpmlExporter, OpmlImporter};
use feedport::storage::Database;
use pretty_assertions::assert_eq;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const SUBSCRIPTIONS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Exported elsewhere</title></head>
  <body>
    <outline text="Daring Fireball" type="rss" xmlUrl="https://daringfireball.net/feeds/main" htmlUrl="https://daringfireball.net/"/>
    <outline text="Programming" title="Programming">
      <outline text="This Week in Rust" type="rss" xmlUrl="https://this-week-in-rust.org/rss.xml" htmlUrl="https://this-week-in-rust.org/"/>
      <outline text="Databases">
        <outline text="SQLite News" type="rss" xmlUrl="https://sqlite.org/news.rss"/>
      </outline>
    </outline>
    <outline text="Empty folder"/>
  </body>
</opml>"#;

async fn setup() -> (Database, i64) {
    let db = Database::open(":memory:").await.unwrap();
    let user_id = db.create_user("alice", true).await.unwrap();
    (db, user_id)
}

/// Folder path + feed address for every feed in the user's tree.
async fn membership(db: &Database, user_id: i64, tree: &FolderTree) -> BTreeSet<(String, String)> {
    let addresses: HashMap<i64, String> = db
        .subscribed_feeds(user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|feed| (feed.feed_id, feed.feed_address))
        .collect();

    let mut out = BTreeSet::new();
    let mut stack: Vec<(String, &FolderTree)> = vec![(String::new(), tree)];
    while let Some((path, level)) = stack.pop() {
        for node in level {
            match node {
                FolderNode::Feed(id) => {
                    out.insert((path.clone(), addresses[id].clone()));
                }
                FolderNode::Folder { name, children } => {
                    stack.push((format!("{}/{}", path, name), children));
                }
            }
        }
    }
    out
}

#[tokio::test]
async fn test_export_then_reimport_preserves_membership() {
    let (db, alice) = setup().await;
    let imported = OpmlImporter::new(db.clone(), alice)
        .try_processing(SUBSCRIPTIONS)
        .await
        .unwrap();
    let before = membership(&db, alice, &imported).await;
    assert_eq!(before.len(), 3);

    let exported = OpmlExporter::new(db.clone(), alice).process().await.unwrap();

    let bob = db.create_user("bob", false).await.unwrap();
    let reimported = OpmlImporter::new(db.clone(), bob)
        .try_processing(&exported)
        .await
        .unwrap();
    let after = membership(&db, bob, &reimported).await;

    assert_eq!(after, before);
    assert_eq!(reimported.folder_count(), imported.folder_count());
    // bob resolved to the same canonical feeds
    assert_eq!(db.count_feeds().await.unwrap(), 3);
}

#[tokio::test]
async fn test_importing_twice_is_idempotent() {
    let (db, alice) = setup().await;
    let importer = OpmlImporter::new(db.clone(), alice);

    let first = importer.try_processing(SUBSCRIPTIONS).await.unwrap();
    let first_subs: BTreeSet<i64> = db
        .subscriptions_for_user(alice)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.feed_id)
        .collect();

    let second = importer.try_processing(SUBSCRIPTIONS).await.unwrap();
    let second_subs: BTreeSet<i64> = db
        .subscriptions_for_user(alice)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.feed_id)
        .collect();

    assert_eq!(first, second);
    assert_eq!(first_subs, second_subs);
    assert_eq!(db.count_feeds().await.unwrap(), 3);
    assert_eq!(db.count_subscriptions(alice).await.unwrap(), 3);
}

#[tokio::test]
async fn test_equivalent_urls_resolve_to_one_feed() {
    let (db, alice) = setup().await;
    let bob = db.create_user("bob", false).await.unwrap();

    let variant_a = r#"<opml><body><outline text="X" xmlUrl="HTTP://Example.COM:80/feed#latest"/></body></opml>"#;
    let variant_b = r#"<opml><body><outline text="X" xmlUrl="feed://example.com/feed"/></body></opml>"#;

    let a = OpmlImporter::new(db.clone(), alice)
        .process(variant_a)
        .await
        .unwrap();
    let b = OpmlImporter::new(db.clone(), bob)
        .process(variant_b)
        .await
        .unwrap();

    assert_eq!(a.feed_ids(), b.feed_ids());
    assert_eq!(db.count_feeds().await.unwrap(), 1);
    assert!(db
        .feed_by_address("http://example.com/feed")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_overlong_address_excluded() {
    let (db, alice) = setup().await;
    let reporter = Arc::new(MemoryReporter::new());
    let long = format!("https://example.com/{}", "segment/".repeat(40));
    let opml = format!(
        r#"<opml><body>
            <outline text="Folder">
                <outline text="Long" xmlUrl="{long}"/>
                <outline text="Short" xmlUrl="https://short.example.com/rss"/>
            </outline>
        </body></opml>"#
    );

    let tree = OpmlImporter::new(db.clone(), alice)
        .with_limits(FeedLimits {
            max_address_len: 255,
            max_link_len: 1000,
        })
        .with_reporter(reporter.clone())
        .process(&opml)
        .await
        .unwrap();

    assert_eq!(tree.feed_ids().len(), 1);
    assert_eq!(db.count_subscriptions(alice).await.unwrap(), 1);
    assert!(reporter
        .events()
        .iter()
        .any(|event| matches!(event, ImportEvent::FeedSkipped { address, .. } if *address == long)));
}

#[tokio::test]
async fn test_opml_import_replaces_previous_tree() {
    let (db, alice) = setup().await;
    OpmlImporter::new(db.clone(), alice)
        .process(SUBSCRIPTIONS)
        .await
        .unwrap();

    let smaller = r#"<opml><body><outline text="Only" xmlUrl="https://only.example.com/rss"/></body></opml>"#;
    let tree = OpmlImporter::new(db.clone(), alice)
        .process(smaller)
        .await
        .unwrap();

    let stored = db.get_folders(alice).await.unwrap().unwrap();
    assert_eq!(stored.folders, tree);
    assert_eq!(db.count_subscriptions(alice).await.unwrap(), 1);
}

#[tokio::test]
async fn test_uploads_are_archived_newest_first() {
    let (db, alice) = setup().await;
    db.save_uploaded_opml(alice, "<opml>first</opml>").await.unwrap();
    db.save_uploaded_opml(alice, "<opml>second</opml>").await.unwrap();

    let uploads = db.uploaded_opml_for_user(alice).await.unwrap();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].opml_file, "<opml>second</opml>");
}
