//! Tag model.
//!
//! Tags belong to exactly one owner and are referenced from tasks by id.
//! Name uniqueness per owner is enforced by the tag store, not here.

use serde::{Deserialize, Serialize};

use crate::ids::{OwnerId, TagId};

/// A named, colored label attached to tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Unique tag identifier.
    pub id: TagId,
    /// Owner of this tag.
    pub owner_id: OwnerId,
    /// Display name, unique per owner.
    pub name: String,
    /// Optional display color (e.g. `#ff8800`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Whether tasks carrying this tag show up in the work view.
    #[serde(default)]
    pub visible_in_work_view: bool,
}

/// Caller input for creating or updating a tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDraft {
    /// Tag name.
    pub name: String,
    /// Optional display color.
    #[serde(default)]
    pub color: Option<String>,
    /// Work view visibility flag.
    #[serde(default)]
    pub visible_in_work_view: bool,
}

impl TagDraft {
    /// Creates a draft with the given name, no color, hidden from the work view.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the display color.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Marks the tag as visible in the work view.
    #[must_use]
    pub fn visible_in_work_view(mut self) -> Self {
        self.visible_in_work_view = true;
        self
    }
}
