//! Lenient parsing of the reader service's subscription list.
//!
//! The service answers with a loosely typed XML encoding of JSON:
//!
//! ```text
//! <object>
//!   <list name="subscriptions">
//!     <object>
//!       <string name="id">feed/http://example.com/rss</string>
//!       <string name="title">Example</string>
//!       <list name="categories">
//!         <object><string name="label">News</string></object>
//!       </list>
//!       <string name="htmlUrl">http://example.com/</string>
//!     </object>
//!   </list>
//! </object>
//! ```
//!
//! Responses are not always well formed, so the document is read into a small
//! element tree that tolerates mismatched and unclosed tags and stops quietly
//! at the first hard syntax error, keeping everything read up to that point.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Elements nested deeper than this end the parse, as if the document were
/// truncated there.
const MAX_ELEMENT_DEPTH: usize = 64;

/// One subscription entry from the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderItem {
    pub title: Option<String>,
    /// Feed address with the `feed/` stream prefix removed.
    pub feed_address: Option<String>,
    pub feed_link: Option<String>,
    /// Label of the first category, if any.
    pub category: Option<String>,
}

#[derive(Debug, Default)]
struct Element {
    tag: String,
    name_attr: Option<String>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn open(e: &BytesStart<'_>) -> Self {
        let name_attr = e
            .attributes()
            .flatten()
            .find(|attr| attr.key.as_ref() == b"name")
            .map(|attr| {
                attr.unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
            });
        Self {
            tag: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            name_attr,
            ..Self::default()
        }
    }

    fn children_tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// First child `<tag name="name">`.
    fn named_child(&self, tag: &str, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|c| c.tag == tag && c.name_attr.as_deref() == Some(name))
    }

    fn named_string(&self, name: &str) -> Option<String> {
        self.named_child("string", name)
            .map(|e| e.text.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    }
}

/// Read `xml` into an element tree under a synthetic document node.
fn parse_lenient(xml: &str) -> Element {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut stack: Vec<Element> = vec![Element::default()];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.len() > MAX_ELEMENT_DEPTH {
                    tracing::warn!(depth = stack.len(), "Subscription list nested too deeply, truncating");
                    break;
                }
                stack.push(Element::open(&e));
            }
            Ok(Event::Empty(e)) => {
                let element = Element::open(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                // Close up to the nearest open element with this tag; stray
                // end tags are dropped.
                if let Some(pos) = stack.iter().skip(1).rposition(|el| el.tag == tag) {
                    close_to(&mut stack, pos + 1);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    position = reader.buffer_position(),
                    "Subscription list is not well formed, keeping what was read"
                );
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    close_to(&mut stack, 1);
    stack.pop().unwrap_or_default()
}

/// Pop elements until the stack has `len` entries, attaching each to its parent.
fn close_to(stack: &mut Vec<Element>, len: usize) {
    while stack.len() > len {
        let Some(element) = stack.pop() else { break };
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
        }
    }
}

/// Extracts the subscription items found at `/object/list/object`.
///
/// Never fails: a broken document yields the items read before the damage.
pub fn parse_subscription_list(xml: &str) -> Vec<ReaderItem> {
    let document = parse_lenient(xml);

    document
        .children_tagged("object")
        .flat_map(|root| root.children_tagged("list"))
        .flat_map(|list| list.children_tagged("object"))
        .map(|item| {
            let feed_address = item.named_string("id").map(|id| {
                id.strip_prefix("feed/")
                    .map(str::to_owned)
                    .unwrap_or(id)
            });
            let category = item
                .named_child("list", "categories")
                .into_iter()
                .flat_map(|list| list.children_tagged("object"))
                .find_map(|category| category.named_string("label"));

            ReaderItem {
                title: item.named_string("title"),
                feed_address,
                feed_link: item.named_string("htmlUrl"),
                category,
            }
        })
        .collect()
}
