use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, WorkspaceError};
use crate::pages::PageStore;
use crate::schema::{PropertyDef, SuperTag, SuperTagInput, SuperTagPatch};

/// Registry of super tag definitions, in creation order.
#[derive(Debug, Clone, Default)]
pub struct TagStore {
    tags: Vec<SuperTag>,
}

/// A property whose display name changed while its id stayed the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRename {
    pub property_id: String,
    pub old_name: String,
    pub new_name: String,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tag. Input is not validated here.
    pub fn create(&mut self, input: SuperTagInput) -> SuperTag {
        let now = Utc::now();
        let tag = SuperTag {
            id: format!("tag-{}", Uuid::new_v4()),
            name: input.name,
            color: input.color,
            icon: input.icon,
            description: input.description,
            template: input.template,
            properties: input.properties,
            created_at: now,
            updated_at: now,
        };
        info!("Created super tag '{}' ({})", tag.name, tag.id);
        self.tags.push(tag.clone());
        tag
    }

    /// Add a fully formed tag, replacing any tag with the same id.
    pub(crate) fn insert(&mut self, tag: SuperTag) {
        match self.tags.iter_mut().find(|t| t.id == tag.id) {
            Some(existing) => *existing = tag,
            None => self.tags.push(tag),
        }
    }

    pub fn get(&self, id: &str) -> Option<&SuperTag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn list(&self) -> &[SuperTag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Live tags among `ids`, in registry order. Unknown ids are skipped.
    pub fn resolve(&self, ids: &[String]) -> Vec<&SuperTag> {
        self.tags.iter().filter(|t| ids.contains(&t.id)).collect()
    }

    /// Merge `patch` into the tag and migrate page values of renamed properties.
    pub fn update(
        &mut self,
        id: &str,
        patch: SuperTagPatch,
        pages: &mut PageStore,
    ) -> Result<Vec<PropertyRename>> {
        let tag = self
            .tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| WorkspaceError::TagNotFound(id.to_string()))?;

        let mut renames = Vec::new();
        if let Some(properties) = patch.properties {
            renames = detect_renames(&tag.properties, &properties);
            tag.properties = properties;
        }
        if let Some(name) = patch.name {
            tag.name = name;
        }
        if let Some(color) = patch.color {
            tag.color = color;
        }
        if let Some(icon) = patch.icon {
            tag.icon = icon;
        }
        if let Some(description) = patch.description {
            tag.description = description;
        }
        if let Some(template) = patch.template {
            tag.template = template;
        }
        tag.updated_at = Utc::now();
        debug!("Updated super tag {}", id);

        for rename in &renames {
            let moved = pages.rename_property_key(id, &rename.old_name, &rename.new_name, self);
            debug!(
                "Property {} renamed '{}' to '{}', migrated {} page(s)",
                rename.property_id, rename.old_name, rename.new_name, moved
            );
        }

        Ok(renames)
    }

    /// Remove the tag and detach it from every page. Page property values stay.
    pub fn delete(&mut self, id: &str, pages: &mut PageStore) -> Result<SuperTag> {
        let idx = self
            .tags
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| WorkspaceError::TagNotFound(id.to_string()))?;

        let removed = self.tags.remove(idx);
        let detached = pages.detach_everywhere(id);
        info!(
            "Deleted super tag '{}' ({}), detached from {} page(s)",
            removed.name, id, detached
        );
        Ok(removed)
    }
}

fn detect_renames(old: &[PropertyDef], new: &[PropertyDef]) -> Vec<PropertyRename> {
    new.iter()
        .filter_map(|def| {
            let previous = old.iter().find(|o| o.id == def.id)?;
            if previous.name == def.name {
                return None;
            }
            Some(PropertyRename {
                property_id: def.id.clone(),
                old_name: previous.name.clone(),
                new_name: def.name.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertyKind, PropertyValue};

    fn project_input() -> SuperTagInput {
        SuperTagInput::named("Project")
            .with_property(
                PropertyDef::new("prop-1", "Status", PropertyKind::Select)
                    .with_options(&["Planning", "Done"]),
            )
            .with_property(PropertyDef::new("prop-2", "Owner", PropertyKind::Text))
    }

    #[test]
    fn test_create_assigns_identity_and_timestamps() {
        let mut tags = TagStore::new();
        let a = tags.create(project_input());
        let b = tags.create(SuperTagInput::named(""));

        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("tag-"));
        assert_eq!(a.created_at, a.updated_at);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.list()[1].name, "");
    }

    #[test]
    fn test_update_merges_and_bumps_timestamp() {
        let mut tags = TagStore::new();
        let mut pages = PageStore::new();
        let tag = tags.create(project_input());

        let patch = SuperTagPatch {
            color: Some("#EF4444".to_string()),
            description: Some(Some("Tracked work".to_string())),
            ..Default::default()
        };
        tags.update(&tag.id, patch, &mut pages).unwrap();

        let updated = tags.get(&tag.id).unwrap();
        assert_eq!(updated.color, "#EF4444");
        assert_eq!(updated.name, "Project");
        assert_eq!(updated.description.as_deref(), Some("Tracked work"));
        assert!(updated.updated_at >= tag.updated_at);
        assert_eq!(updated.created_at, tag.created_at);

        let clear = SuperTagPatch {
            description: Some(None),
            ..Default::default()
        };
        tags.update(&tag.id, clear, &mut pages).unwrap();
        let cleared = tags.get(&tag.id).unwrap();
        assert!(cleared.description.is_none());
        assert_eq!(cleared.color, "#EF4444");
    }

    #[test]
    fn test_update_missing_tag_is_not_found() {
        let mut tags = TagStore::new();
        let mut pages = PageStore::new();
        let err = tags
            .update("tag-missing", SuperTagPatch::default(), &mut pages)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rename_migrates_page_values() {
        let mut tags = TagStore::new();
        let mut pages = PageStore::new();
        let tag = tags.create(project_input());
        let page = pages.create(None);
        pages.attach_tag(&page.id, &tag.id, &tags).unwrap();
        pages
            .set_property(&page.id, "Owner", PropertyValue::text("Alice"))
            .unwrap();

        let mut properties = tag.properties.clone();
        properties[1].name = "Lead".to_string();
        let renames = tags
            .update(
                &tag.id,
                SuperTagPatch {
                    properties: Some(properties),
                    ..Default::default()
                },
                &mut pages,
            )
            .unwrap();

        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].old_name, "Owner");
        let page = pages.get(&page.id).unwrap();
        assert_eq!(page.properties["Lead"], PropertyValue::text("Alice"));
        assert!(!page.properties.contains_key("Owner"));
    }

    #[test]
    fn test_rename_copies_value_still_defined_by_another_tag() {
        let mut tags = TagStore::new();
        let mut pages = PageStore::new();
        let a = tags.create(
            SuperTagInput::named("A").with_property(PropertyDef::new("a-1", "Status", PropertyKind::Text)),
        );
        let b = tags.create(
            SuperTagInput::named("B").with_property(PropertyDef::new("b-1", "Status", PropertyKind::Text)),
        );
        let page = pages.create(None);
        pages.attach_tag(&page.id, &a.id, &tags).unwrap();
        pages.attach_tag(&page.id, &b.id, &tags).unwrap();
        pages
            .set_property(&page.id, "Status", PropertyValue::text("Done"))
            .unwrap();

        let mut properties = a.properties.clone();
        properties[0].name = "State".to_string();
        tags.update(
            &a.id,
            SuperTagPatch {
                properties: Some(properties),
                ..Default::default()
            },
            &mut pages,
        )
        .unwrap();

        let stored = pages.get(&page.id).unwrap();
        assert_eq!(stored.properties["State"], PropertyValue::text("Done"));
        assert_eq!(stored.properties["Status"], PropertyValue::text("Done"));

        let view = pages.property_view(&page.id, &tags).unwrap();
        assert_eq!(view.properties.len(), 2);
        assert!(view.orphaned.is_empty());
    }

    #[test]
    fn test_delete_cascades_tag_but_keeps_values() {
        let mut tags = TagStore::new();
        let mut pages = PageStore::new();
        let tag = tags.create(project_input());
        let page = pages.create(None);
        pages.attach_tag(&page.id, &tag.id, &tags).unwrap();
        pages
            .set_property(&page.id, "Status", PropertyValue::text("Done"))
            .unwrap();

        let removed = tags.delete(&tag.id, &mut pages).unwrap();
        assert_eq!(removed.id, tag.id);
        assert!(tags.get(&tag.id).is_none());

        let page = pages.get(&page.id).unwrap();
        assert!(page.tags.is_empty());
        assert_eq!(page.properties["Status"], PropertyValue::text("Done"));

        assert!(tags.delete(&tag.id, &mut pages).unwrap_err().is_not_found());
    }

    #[test]
    fn test_resolve_uses_registry_order_and_skips_dangling() {
        let mut tags = TagStore::new();
        let a = tags.create(SuperTagInput::named("A"));
        let b = tags.create(SuperTagInput::named("B"));

        let ids = vec![b.id.clone(), "tag-gone".to_string(), a.id.clone()];
        let resolved: Vec<&str> = tags.resolve(&ids).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(resolved, vec!["A", "B"]);
    }
}
