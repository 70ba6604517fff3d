//! The user's folder layout: an ordered tree of feed references and named folders.
//!
//! Stored as compact JSON, one document per user. Feed references are bare
//! integers and a folder is a single-key object mapping its name to its
//! children:
//!
//! ```text
//! [12, 40, {"News": [7, {"Local": [9]}]}]
//! ```

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry in a [`FolderTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderNode {
    /// Reference to a canonical feed by id.
    Feed(i64),
    /// A named folder with its own ordered children.
    Folder { name: String, children: FolderTree },
}

/// Ordered sequence of folder nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderTree(Vec<FolderNode>);

impl FolderTree {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a feed reference unless this level already holds it.
    ///
    /// Returns `false` when the feed was already present.
    pub fn push_feed(&mut self, feed_id: i64) -> bool {
        if self.contains_feed(feed_id) {
            return false;
        }
        self.0.push(FolderNode::Feed(feed_id));
        true
    }

    pub fn push_folder(&mut self, name: impl Into<String>, children: FolderTree) {
        self.0.push(FolderNode::Folder {
            name: name.into(),
            children,
        });
    }

    /// Whether this level (not descendants) references the feed.
    pub fn contains_feed(&self, feed_id: i64) -> bool {
        self.0
            .iter()
            .any(|node| matches!(node, FolderNode::Feed(id) if *id == feed_id))
    }

    pub fn nodes(&self) -> &[FolderNode] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FolderNode> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every feed id in the tree, depth first, in document order.
    pub fn feed_ids(&self) -> Vec<i64> {
        let mut ids = Vec::new();
        self.collect_feed_ids(&mut ids);
        ids
    }

    fn collect_feed_ids(&self, out: &mut Vec<i64>) {
        for node in &self.0 {
            match node {
                FolderNode::Feed(id) => out.push(*id),
                FolderNode::Folder { children, .. } => children.collect_feed_ids(out),
            }
        }
    }

    /// Number of folders at every depth.
    pub fn folder_count(&self) -> usize {
        self.0
            .iter()
            .map(|node| match node {
                FolderNode::Feed(_) => 0,
                FolderNode::Folder { children, .. } => 1 + children.folder_count(),
            })
            .sum()
    }

    /// Find a folder at this level by name.
    pub fn folder(&self, name: &str) -> Option<&FolderTree> {
        self.0.iter().find_map(|node| match node {
            FolderNode::Folder {
                name: folder_name,
                children,
            } if folder_name == name => Some(children),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a FolderTree {
    type Item = &'a FolderNode;
    type IntoIter = std::slice::Iter<'a, FolderNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<FolderNode>> for FolderTree {
    fn from(nodes: Vec<FolderNode>) -> Self {
        Self(nodes)
    }
}

impl Serialize for FolderNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FolderNode::Feed(id) => serializer.serialize_i64(*id),
            FolderNode::Folder { name, children } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(name, children)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FolderNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeVisitor;

        impl<'de> Visitor<'de> for NodeVisitor {
            type Value = FolderNode;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "a feed id or a single-entry folder object")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(FolderNode::Feed(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                i64::try_from(v)
                    .map(FolderNode::Feed)
                    .map_err(|_| E::custom(format!("feed id {} out of range", v)))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let (name, children): (String, FolderTree) = map
                    .next_entry()?
                    .ok_or_else(|| <A::Error as de::Error>::invalid_length(0, &self))?;
                if map.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::custom("folder object must have exactly one entry"));
                }
                Ok(FolderNode::Folder { name, children })
            }
        }

        deserializer.deserialize_any(NodeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> FolderTree {
        let mut local = FolderTree::new();
        local.push_feed(9);
        let mut news = FolderTree::new();
        news.push_feed(7);
        news.push_folder("Local", local);
        let mut tree = FolderTree::new();
        tree.push_feed(12);
        tree.push_feed(40);
        tree.push_folder("News", news);
        tree
    }

    #[test]
    fn test_serializes_compact_form() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"[12,40,{"News":[7,{"Local":[9]}]}]"#);
    }

    #[test]
    fn test_deserializes_compact_form() {
        let tree: FolderTree =
            serde_json::from_str(r#"[12, 40, {"News": [7, {"Local": [9]}]}]"#).unwrap();
        assert_eq!(tree, sample());
    }

    #[test]
    fn test_rejects_multi_entry_folder() {
        let result: Result<FolderTree, _> = serde_json::from_str(r#"[{"A": [], "B": []}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_non_node_values() {
        assert!(serde_json::from_str::<FolderTree>(r#"["x"]"#).is_err());
        assert!(serde_json::from_str::<FolderTree>(r#"[{}]"#).is_err());
    }

    #[test]
    fn test_push_feed_dedups_per_level() {
        let mut tree = FolderTree::new();
        assert!(tree.push_feed(1));
        assert!(!tree.push_feed(1));
        assert_eq!(tree.len(), 1);

        // Same feed may appear in a different folder
        let mut inner = FolderTree::new();
        assert!(inner.push_feed(1));
        tree.push_folder("Other", inner);
        assert_eq!(tree.feed_ids(), vec![1, 1]);
    }

    #[test]
    fn test_feed_ids_and_folder_count() {
        let tree = sample();
        assert_eq!(tree.feed_ids(), vec![12, 40, 7, 9]);
        assert_eq!(tree.folder_count(), 2);
        assert_eq!(tree.folder("News").map(FolderTree::len), Some(2));
        assert!(tree.folder("Missing").is_none());
    }
}
