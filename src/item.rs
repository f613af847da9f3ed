//! The item shapes the engine's injected collaborator can hand back, and the
//! `StreamItem`/`Attribute` wrappers built on top of them.
//!
//! The core never speaks the platform's wire format directly (see the crate
//! root docs) — [`Item`] is the closed set of shapes a [`crate::source::ListingEndpoint`]
//! is expected to produce, carrying only the fields the engine itself reads.

use crate::listing::{AttributeKind, ListingName};

/// A submission (`t3_` fullname).
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub fullname: String,
    pub author: String,
    pub permalink: String,
    pub created_utc: f64,
    /// `None` means "not edited"; `Some` carries the edit's Unix timestamp.
    pub edited: Option<f64>,
    pub ban_note: Option<String>,
}

/// A comment (`t1_` fullname).
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: String,
    pub fullname: String,
    pub parent_id: String,
    pub author: String,
    pub permalink: String,
    pub created_utc: f64,
    pub edited: Option<f64>,
    pub ban_note: Option<String>,
}

/// A single moderator-log entry.
#[derive(Debug, Clone)]
pub struct ModLogEntry {
    pub id: String,
    pub created_utc: f64,
    pub action: String,
    pub target_fullname: Option<String>,
    pub target_permalink: Option<String>,
    pub target_author: Option<String>,
    pub details: Option<String>,
    pub description: Option<String>,
    pub mod_name: String,
}

/// A modmail conversation.
#[derive(Debug, Clone)]
pub struct ModmailConversation {
    pub id: String,
    pub created_utc: f64,
}

/// The closed set of shapes any listing this engine streams can produce.
#[derive(Debug, Clone)]
pub enum Item {
    Submission(Submission),
    Comment(Comment),
    ModLogEntry(ModLogEntry),
    ModmailConversation(ModmailConversation),
}

impl Item {
    /// The item's fullname, for the listings that have one (everything but
    /// the modlog and modmail).
    #[must_use]
    pub fn fullname(&self) -> Option<&str> {
        match self {
            Self::Submission(s) => Some(&s.fullname),
            Self::Comment(c) => Some(&c.fullname),
            Self::ModLogEntry(_) | Self::ModmailConversation(_) => None,
        }
    }

    /// The item's base id; every shape has one.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Submission(s) => &s.id,
            Self::Comment(c) => &c.id,
            Self::ModLogEntry(m) => &m.id,
            Self::ModmailConversation(m) => &m.id,
        }
    }

    #[must_use]
    pub fn created_utc(&self) -> f64 {
        match self {
            Self::Submission(s) => s.created_utc,
            Self::Comment(c) => c.created_utc,
            Self::ModLogEntry(m) => m.created_utc,
            Self::ModmailConversation(m) => m.created_utc,
        }
    }

    /// `None` if the item was never edited (or doesn't have an edit concept).
    #[must_use]
    pub fn edited(&self) -> Option<f64> {
        match self {
            Self::Submission(s) => s.edited,
            Self::Comment(c) => c.edited,
            Self::ModLogEntry(_) | Self::ModmailConversation(_) => None,
        }
    }

    #[must_use]
    pub fn ban_note(&self) -> Option<&str> {
        match self {
            Self::Submission(s) => s.ban_note.as_deref(),
            Self::Comment(c) => c.ban_note.as_deref(),
            Self::ModLogEntry(_) | Self::ModmailConversation(_) => None,
        }
    }
}

/// The dedup/cursor key extracted from an [`Item`] for a given listing.
///
/// `EditedFullname`'s second field is `None` when the edit timestamp hasn't
/// propagated yet (a falsy sentinel, as `spec.md` §3 puts it) rather than a
/// made-up zero, so a stale-but-present edit is never confused with "not
/// edited".
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Attribute {
    Fullname(String),
    Id(String),
    EditedFullname(String, Option<i64>),
}

impl Attribute {
    /// The value used as the `before` cursor when this attribute is chosen
    /// as the round's anchor point.
    #[must_use]
    pub fn cursor_value(&self) -> &str {
        match self {
            Self::Fullname(f) | Self::Id(f) | Self::EditedFullname(f, _) => f,
        }
    }
}

/// Extracts the listing's dedup/cursor attribute from an item, or `None` if
/// the item doesn't carry the field the listing needs (e.g. a fullname-based
/// listing handed an item with no fullname — shouldn't happen for a
/// well-behaved collaborator, but the engine doesn't panic over it).
#[must_use]
pub fn extract_attribute(listing: ListingName, item: &Item) -> Option<Attribute> {
    match listing.attribute_kind() {
        AttributeKind::Fullname => item.fullname().map(|f| Attribute::Fullname(f.to_owned())),
        AttributeKind::Id => Some(Attribute::Id(item.id().to_owned())),
        AttributeKind::EditedFullname => {
            let fullname = item.fullname()?;
            Some(Attribute::EditedFullname(
                fullname.to_owned(),
                item.edited().map(|e| e as i64),
            ))
        }
    }
}

/// What kind of item a [`StreamItem`] carries, computed structurally so a
/// consumer of heterogeneous listings (edited, spam, modqueue, ...) can
/// dispatch without re-checking the payload's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Submissions,
    Comments,
    /// Fallback for listings whose items aren't submissions or comments
    /// (the modlog, modmail).
    Listing(ListingName),
}

/// One item yielded by a [`crate::SubredditStream`] or [`crate::MultiStream`],
/// tagged with the listing it came from and its structural kind.
#[derive(Debug, Clone)]
pub struct StreamItem {
    pub stream: ListingName,
    pub item: Item,
    pub kind: ItemKind,
}

impl StreamItem {
    #[must_use]
    pub fn new(stream: ListingName, item: Item) -> Self {
        let kind = match &item {
            Item::Submission(_) => ItemKind::Submissions,
            Item::Comment(_) => ItemKind::Comments,
            Item::ModLogEntry(_) | Item::ModmailConversation(_) => ItemKind::Listing(stream),
        };
        Self { stream, item, kind }
    }
}

/// Whether a spam-listing item was actually removed as spam, rather than
/// merely removed (the spam listing surfaces every removal, spam or not).
///
/// Any item missing the `ban_note` field is treated as not-spam.
#[must_use]
pub fn is_actually_spam(item: &Item) -> bool {
    match item.ban_note() {
        Some(note) => note.contains("spam") && !note.contains("not"),
        None => false,
    }
}
