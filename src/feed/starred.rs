//! Starred-items stream returned by the reader service (JSON).

use serde::Deserialize;
use thiserror::Error;

use crate::storage::NewStarredStory;

/// Title used when neither the story nor its origin has one.
pub const UNTITLED: &str = "[Untitled]";

/// Marker of user-private labels, which never become story tags.
const USER_LABEL_MARKER: &str = "user/";

/// The stream envelope. Items stay undecoded so one malformed item cannot
/// sink the rest of the batch; see [`StarredItem::from_value`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StarredStream {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

impl StarredStream {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Best-effort title of an undecoded item, for reporting.
pub fn raw_item_title(value: &serde_json::Value) -> &str {
    value
        .get("title")
        .and_then(serde_json::Value::as_str)
        .or_else(|| {
            value
                .get("origin")
                .and_then(|origin| origin.get("title"))
                .and_then(serde_json::Value::as_str)
        })
        .unwrap_or(UNTITLED)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StarredItem {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Epoch seconds the item was last updated (used as the starred date).
    pub updated: Option<i64>,
    /// Epoch seconds the item was published.
    pub published: Option<i64>,
    pub author: Option<String>,
    #[serde(default)]
    pub alternate: Vec<ItemLink>,
    pub content: Option<ItemContent>,
    pub summary: Option<ItemContent>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub origin: ItemOrigin,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemLink {
    pub href: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemContent {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOrigin {
    pub stream_id: Option<String>,
    pub title: Option<String>,
    pub html_url: Option<String>,
}

/// A starred item lacked a field the stored story requires.
#[derive(Debug, Error)]
#[error("starred item is missing `{0}`")]
pub struct MissingField(pub &'static str);

impl StarredItem {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Title shown for the item: its own, else the origin feed's.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.origin.title.as_deref())
            .unwrap_or(UNTITLED)
    }

    /// Builds the stored story snapshot for `user_id`.
    pub fn to_story(
        &self,
        user_id: i64,
        story_feed_id: Option<i64>,
    ) -> Result<NewStarredStory, MissingField> {
        let starred_date = self.updated.ok_or(MissingField("updated"))?;
        let story_date = self.published.ok_or(MissingField("published"))?;
        let story_permalink = self
            .alternate
            .first()
            .map(|link| link.href.clone())
            .ok_or(MissingField("alternate"))?;
        let story_guid = self.id.clone().ok_or(MissingField("id"))?;
        let story_content = self
            .content
            .as_ref()
            .or(self.summary.as_ref())
            .and_then(|c| c.content.clone());

        Ok(NewStarredStory {
            user_id,
            starred_date,
            story_date,
            story_title: self.display_title().to_owned(),
            story_permalink,
            story_guid,
            story_content,
            story_author_name: self.author.clone(),
            story_feed_id,
            story_tags: self
                .categories
                .iter()
                .filter(|tag| !tag.contains(USER_LABEL_MARKER))
                .cloned()
                .collect(),
        })
    }
}
