//! Names of the listings a [`crate::MultiStream`] can be built from, and the
//! per-listing attribute kind used for deduplication and cursor selection.

use std::fmt;

/// One of the listings the platform exposes for a subreddit.
///
/// See the listing table in the crate's external interface docs for the
/// `source`/`attribute` mapping each variant corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingName {
    Submissions,
    Comments,
    Hot,
    Rising,
    Top,
    Controversial,
    Unmoderated,
    Modqueue,
    Edited,
    Spam,
    Removed,
    Log,
    ModmailConversations,
}

/// The shape of the value used to deduplicate and to pick the next `before`
/// cursor for a given [`ListingName`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Deduplicate and anchor on the item's fullname (`t3_xxx`, `t1_xxx`, ...).
    Fullname,
    /// Deduplicate and anchor on a listing-local id (modlog, modmail).
    Id,
    /// Deduplicate on `(fullname, edited)` so repeated edits of one item are
    /// each captured once; anchor on the fullname half of the pair.
    EditedFullname,
}

impl ListingName {
    /// All listing names the engine knows how to stream, in the order they
    /// appear in the external interface table.
    pub const ALL: [Self; 13] = [
        Self::Submissions,
        Self::Comments,
        Self::Hot,
        Self::Rising,
        Self::Top,
        Self::Controversial,
        Self::Unmoderated,
        Self::Modqueue,
        Self::Edited,
        Self::Spam,
        Self::Removed,
        Self::Log,
        Self::ModmailConversations,
    ];

    /// The on-wire/on-disk name of this listing, used as both the cache file
    /// stem and a `tracing` field value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submissions => "submissions",
            Self::Comments => "comments",
            Self::Hot => "hot",
            Self::Rising => "rising",
            Self::Top => "top",
            Self::Controversial => "controversial",
            Self::Unmoderated => "unmoderated",
            Self::Modqueue => "modqueue",
            Self::Edited => "edited",
            Self::Spam => "spam",
            Self::Removed => "removed",
            Self::Log => "log",
            Self::ModmailConversations => "modmail_conversations",
        }
    }

    /// The attribute shape used for dedup and cursor selection on this
    /// listing.
    #[must_use]
    pub const fn attribute_kind(&self) -> AttributeKind {
        match self {
            Self::Edited => AttributeKind::EditedFullname,
            Self::Log | Self::ModmailConversations => AttributeKind::Id,
            _ => AttributeKind::Fullname,
        }
    }
}

impl fmt::Display for ListingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
