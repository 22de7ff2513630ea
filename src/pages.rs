use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

use crate::binder;
use crate::blocks::{self, BlockPatch, ContentBlock};
use crate::error::{Result, WorkspaceError};
use crate::schema::{PropertyDef, PropertyMap, PropertyValue};
use crate::tags::TagStore;

pub const DEFAULT_PAGE_TITLE: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// Attached super tag ids. A set; order is cosmetic.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub is_template: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tags.iter().any(|t| t == tag_id)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Fields to merge into a page. `None` leaves a field unchanged.
///
/// A patch carrying `tags` should carry the reconciled `properties` too, so
/// both change together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PagePatch {
    pub title: Option<String>,
    pub content: Option<Vec<ContentBlock>>,
    pub tags: Option<Vec<String>>,
    pub properties: Option<PropertyMap>,
    pub icon: Option<String>,
    pub cover_image: Option<String>,
    pub is_template: Option<bool>,
}

/// The property editors a page shows, plus what is missing or left over.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyView {
    pub properties: Vec<PropertyDef>,
    pub missing_required: Vec<String>,
    pub orphaned: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PageStore {
    pages: Vec<Page>,
    default_title: String,
}

impl Default for PageStore {
    fn default() -> Self {
        Self::new()
    }
}

fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

impl PageStore {
    pub fn new() -> Self {
        Self::with_default_title(DEFAULT_PAGE_TITLE)
    }

    pub fn with_default_title(title: impl Into<String>) -> Self {
        Self {
            pages: Vec::new(),
            default_title: title.into(),
        }
    }

    pub fn create(&mut self, parent_id: Option<&str>) -> Page {
        let now = Utc::now();
        let page = Page {
            id: format!("page-{}", Uuid::new_v4()),
            title: self.default_title.clone(),
            content: Vec::new(),
            parent_id: parent_id.map(str::to_string),
            icon: None,
            cover_image: None,
            tags: Vec::new(),
            properties: PropertyMap::new(),
            is_template: false,
            created_at: now,
            updated_at: now,
        };
        info!("Created page {}", page.id);
        self.pages.push(page.clone());
        page
    }

    /// Add a fully formed page, replacing any page with the same id.
    pub(crate) fn insert(&mut self, page: Page) {
        match self.pages.iter_mut().find(|p| p.id == page.id) {
            Some(existing) => *existing = page,
            None => self.pages.push(page),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    fn page_mut(&mut self, id: &str) -> Result<&mut Page> {
        self.pages
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| WorkspaceError::PageNotFound(id.to_string()))
    }

    pub fn list(&self) -> &[Page] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn update(&mut self, id: &str, patch: PagePatch) -> Result<()> {
        let page = self.page_mut(id)?;
        if let Some(title) = patch.title {
            page.title = title;
        }
        if let Some(content) = patch.content {
            page.content = content;
        }
        if let Some(tags) = patch.tags {
            page.tags = dedup_ids(tags);
        }
        if let Some(properties) = patch.properties {
            page.properties = properties;
        }
        if let Some(icon) = patch.icon {
            page.icon = Some(icon);
        }
        if let Some(cover_image) = patch.cover_image {
            page.cover_image = Some(cover_image);
        }
        if let Some(is_template) = patch.is_template {
            page.is_template = is_template;
        }
        page.touch();
        Ok(())
    }

    /// Remove a page. Its children become root pages.
    pub fn delete(&mut self, id: &str) -> Result<Page> {
        let idx = self
            .pages
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| WorkspaceError::PageNotFound(id.to_string()))?;
        let removed = self.pages.remove(idx);

        let mut orphaned = 0;
        for page in self.pages.iter_mut() {
            if page.parent_id.as_deref() == Some(id) {
                page.parent_id = None;
                orphaned += 1;
            }
        }
        info!("Deleted page {} ({} child page(s) moved to root)", id, orphaned);
        Ok(removed)
    }

    // ---- Hierarchy ----

    /// The parent page, if it still exists.
    pub fn effective_parent(&self, page: &Page) -> Option<&Page> {
        page.parent_id.as_deref().and_then(|pid| self.get(pid))
    }

    pub fn roots(&self) -> Vec<&Page> {
        self.pages
            .iter()
            .filter(|p| self.effective_parent(p).is_none())
            .collect()
    }

    pub fn children(&self, parent_id: &str) -> Vec<&Page> {
        self.pages
            .iter()
            .filter(|p| p.parent_id.as_deref() == Some(parent_id))
            .collect()
    }

    /// Re-parent a page. A page can never become its own ancestor.
    pub fn move_page(&mut self, id: &str, new_parent: Option<&str>) -> Result<()> {
        if self.get(id).is_none() {
            return Err(WorkspaceError::PageNotFound(id.to_string()));
        }

        if let Some(parent_id) = new_parent {
            let mut cursor = Some(
                self.get(parent_id)
                    .ok_or_else(|| WorkspaceError::PageNotFound(parent_id.to_string()))?,
            );
            let mut visited = HashSet::new();
            while let Some(ancestor) = cursor {
                if ancestor.id == id {
                    return Err(WorkspaceError::Cycle(format!(
                        "'{}' is an ancestor of '{}'",
                        id, parent_id
                    )));
                }
                if !visited.insert(ancestor.id.as_str()) {
                    break;
                }
                cursor = self.effective_parent(ancestor);
            }
        }

        let page = self.page_mut(id)?;
        page.parent_id = new_parent.map(str::to_string);
        page.touch();
        Ok(())
    }

    // ---- Queries ----

    pub fn filter_by_title(&self, query: &str) -> Vec<&Page> {
        let needle = query.trim().to_lowercase();
        self.pages
            .iter()
            .filter(|p| p.title.to_lowercase().contains(&needle))
            .collect()
    }

    /// Up to `limit` pages, most recently updated first.
    pub fn recent(&self, limit: usize) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self.pages.iter().collect();
        pages.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        pages.truncate(limit);
        pages
    }

    // ---- Tags & Properties ----

    /// Attach a tag, then reconcile properties against the resulting tag set.
    pub fn attach_tag(&mut self, page_id: &str, tag_id: &str, tags: &TagStore) -> Result<()> {
        if tags.get(tag_id).is_none() {
            return Err(WorkspaceError::TagNotFound(tag_id.to_string()));
        }
        let page = self.page_mut(page_id)?;
        if page.has_tag(tag_id) {
            return Ok(());
        }

        let mut new_tags = page.tags.clone();
        new_tags.push(tag_id.to_string());
        let properties = binder::reconcile(&page.properties, &tags.resolve(&new_tags));

        page.tags = new_tags;
        page.properties = properties;
        page.touch();
        debug!("Attached tag {} to page {}", tag_id, page_id);
        Ok(())
    }

    /// Detach a tag. Stored values stay; detaching an absent tag does nothing.
    pub fn detach_tag(&mut self, page_id: &str, tag_id: &str, tags: &TagStore) -> Result<()> {
        let page = self.page_mut(page_id)?;
        if !page.has_tag(tag_id) {
            return Ok(());
        }

        let new_tags: Vec<String> = page.tags.iter().filter(|t| *t != tag_id).cloned().collect();
        let properties = binder::reconcile(&page.properties, &tags.resolve(&new_tags));

        page.tags = new_tags;
        page.properties = properties;
        page.touch();
        debug!("Detached tag {} from page {}", tag_id, page_id);
        Ok(())
    }

    pub fn set_property(&mut self, page_id: &str, name: &str, value: PropertyValue) -> Result<()> {
        let page = self.page_mut(page_id)?;
        page.properties.insert(name.to_string(), value);
        page.touch();
        Ok(())
    }

    /// Convert a raw editor input through the page's effective schema and store it.
    pub fn set_property_input(
        &mut self,
        page_id: &str,
        name: &str,
        raw: &JsonValue,
        tags: &TagStore,
    ) -> Result<PropertyValue> {
        let page = self
            .get(page_id)
            .ok_or_else(|| WorkspaceError::PageNotFound(page_id.to_string()))?;
        let active = tags.resolve(&page.tags);
        let def = binder::effective_schema(&active)
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| {
                WorkspaceError::InvalidValue(format!("Page has no property named '{}'", name))
            })?;

        let value = def.coerce(raw)?;
        self.set_property(page_id, name, value.clone())?;
        Ok(value)
    }

    pub fn property_view(&self, page_id: &str, tags: &TagStore) -> Result<PropertyView> {
        let page = self
            .get(page_id)
            .ok_or_else(|| WorkspaceError::PageNotFound(page_id.to_string()))?;
        let active = tags.resolve(&page.tags);
        Ok(PropertyView {
            properties: binder::effective_schema(&active).into_iter().cloned().collect(),
            missing_required: binder::missing_required(&page.properties, &active),
            orphaned: binder::orphaned_keys(&page.properties, &active),
        })
    }

    /// Drop stored values no attached tag defines. Returns the removed keys.
    pub fn purge_orphaned_properties(&mut self, page_id: &str, tags: &TagStore) -> Result<Vec<String>> {
        let orphaned = self.property_view(page_id, tags)?.orphaned;
        if orphaned.is_empty() {
            return Ok(orphaned);
        }

        let page = self.page_mut(page_id)?;
        for key in &orphaned {
            page.properties.remove(key);
        }
        page.touch();
        info!("Purged {} orphaned propert(ies) from page {}", orphaned.len(), page_id);
        Ok(orphaned)
    }

    /// Move stored values from `old` to `new` on pages carrying `tag_id`.
    ///
    /// Pages that already hold a value under `new` keep both keys untouched.
    /// When another attached tag still defines `old`, the value is copied and
    /// `old` stays. `tags` must already hold the renamed definition.
    pub fn rename_property_key(&mut self, tag_id: &str, old: &str, new: &str, tags: &TagStore) -> usize {
        let mut moved = 0;
        for page in self.pages.iter_mut().filter(|p| p.has_tag(tag_id)) {
            if page.properties.contains_key(new) {
                continue;
            }
            let still_defined = tags
                .resolve(&page.tags)
                .iter()
                .any(|t| t.properties.iter().any(|def| def.name == old));
            let value = if still_defined {
                page.properties.get(old).cloned()
            } else {
                page.properties.remove(old)
            };
            if let Some(value) = value {
                page.properties.insert(new.to_string(), value);
                page.touch();
                moved += 1;
            }
        }
        moved
    }

    /// Remove a tag id from every page. Property values are left alone.
    pub fn detach_everywhere(&mut self, tag_id: &str) -> usize {
        let mut detached = 0;
        for page in self.pages.iter_mut().filter(|p| p.has_tag(tag_id)) {
            page.tags.retain(|t| t != tag_id);
            page.touch();
            detached += 1;
        }
        detached
    }

    // ---- Blocks ----

    /// Insert a block after `after` (or at the end). Returns the new block's id.
    pub fn insert_block(
        &mut self,
        page_id: &str,
        after: Option<&str>,
        block: ContentBlock,
    ) -> Result<String> {
        let page = self.page_mut(page_id)?;
        let block_id = block.id.clone();
        page.content = blocks::insert_after(&page.content, after, block);
        page.touch();
        Ok(block_id)
    }

    pub fn update_block(&mut self, page_id: &str, block_id: &str, patch: &BlockPatch) -> Result<()> {
        let page = self.page_mut(page_id)?;
        if !page.content.iter().any(|b| b.id == block_id) {
            return Err(WorkspaceError::BlockNotFound(block_id.to_string()));
        }
        page.content = blocks::update(&page.content, block_id, patch);
        page.touch();
        Ok(())
    }

    pub fn remove_block(&mut self, page_id: &str, block_id: &str) -> Result<()> {
        let page = self.page_mut(page_id)?;
        page.content = blocks::remove(&page.content, block_id);
        page.touch();
        Ok(())
    }

    /// Replace a page's blocks with those parsed from editor markup.
    pub fn ingest_markup(&mut self, page_id: &str, markup: &str) -> Result<usize> {
        let page = self.page_mut(page_id)?;
        page.content = blocks::from_markup(markup);
        page.touch();
        Ok(page.content.len())
    }
}
