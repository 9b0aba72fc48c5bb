//! Page domain model.
//!
//! # Responsibility
//! - Define the document record that owns a tree of blocks.
//! - Provide defaults used by page creation and snapshot import.
//!
//! # Invariants
//! - `id` is stable and never reused for another page.
//! - `parent_id` nests pages and is independent of block hierarchy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a page.
pub type PageId = Uuid;

/// Title used when a caller supplies a blank one.
pub const DEFAULT_PAGE_TITLE: &str = "Untitled";

/// Icon assigned to newly created pages.
pub const DEFAULT_PAGE_ICON: &str = "📄";

/// Persisted document record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: PageId,
    pub title: String,
    pub icon: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
    #[serde(default)]
    pub is_favorite: bool,
    /// Enclosing page, if any.
    #[serde(default)]
    pub parent_id: Option<PageId>,
}

/// Partial page update. `None` fields are left unchanged.
///
/// `cover_image` and `parent_id` use a nested option so callers can clear
/// them with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagePatch {
    pub title: Option<String>,
    pub icon: Option<String>,
    pub cover_image: Option<Option<String>>,
    pub is_favorite: Option<bool>,
    pub parent_id: Option<Option<PageId>>,
}

impl PagePatch {
    /// Returns whether this patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.icon.is_none()
            && self.cover_image.is_none()
            && self.is_favorite.is_none()
            && self.parent_id.is_none()
    }
}

/// Trims a title and falls back to [`DEFAULT_PAGE_TITLE`] when blank.
pub fn normalize_page_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        DEFAULT_PAGE_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}
