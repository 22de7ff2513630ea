use anyhow::{Context, Result as AnyResult};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::info;

use crate::blocks::{new_block_id, ContentBlock};
use crate::error::{Result, WorkspaceError};
use crate::pages::{Page, PagePatch, PageStore};
use crate::schema::{PropertyDef, PropertyMap, PropertyValue, SuperTag, SuperTagPatch};
use crate::tags::{PropertyRename, TagStore};

const SAMPLE_WORKSPACE: &str = include_str!("sample_workspace.yaml");

/// One tag registry and one page store, passed explicitly to every operation
/// that needs both.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub tags: TagStore,
    pub pages: PageStore,
}

// ---- Sample Data ----

#[derive(Debug, Deserialize)]
struct SeedData {
    #[serde(default)]
    tags: Vec<SeedTag>,
    #[serde(default)]
    pages: Vec<SeedPage>,
}

#[derive(Debug, Deserialize)]
struct SeedTag {
    id: String,
    name: String,
    color: String,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    properties: Vec<PropertyDef>,
}

#[derive(Debug, Deserialize)]
struct SeedPage {
    id: String,
    title: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    properties: PropertyMap,
}

// ---- Template Variables ----

fn unresolved_variable() -> &'static Regex {
    static UNRESOLVED: OnceLock<Regex> = OnceLock::new();
    UNRESOLVED.get_or_init(|| Regex::new(r"\{\{[^}]+\}\}").expect("valid variable pattern"))
}

/// Substitute `{{date}}` and caller variables, then drop anything unresolved.
fn substitute_variables(template_str: &str, variables: &HashMap<String, String>) -> String {
    let mut result = template_str.to_string();

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    result = result.replace("{{date}}", &today);

    for (key, value) in variables {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }

    unresolved_variable().replace_all(&result, "").to_string()
}

fn substitute_value(value: &PropertyValue, variables: &HashMap<String, String>) -> PropertyValue {
    match value {
        PropertyValue::Text(s) => {
            let text = substitute_variables(s, variables);
            match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                Ok(date) => PropertyValue::Date(date),
                Err(_) => PropertyValue::Text(text),
            }
        }
        PropertyValue::Multi(items) => PropertyValue::Multi(
            items.iter().map(|s| substitute_variables(s, variables)).collect(),
        ),
        other => other.clone(),
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_title(title: impl Into<String>) -> Self {
        Self {
            tags: TagStore::new(),
            pages: PageStore::with_default_title(title),
        }
    }

    pub fn attach_tag(&mut self, page_id: &str, tag_id: &str) -> Result<()> {
        self.pages.attach_tag(page_id, tag_id, &self.tags)
    }

    pub fn detach_tag(&mut self, page_id: &str, tag_id: &str) -> Result<()> {
        self.pages.detach_tag(page_id, tag_id, &self.tags)
    }

    pub fn update_tag(&mut self, id: &str, patch: SuperTagPatch) -> Result<Vec<PropertyRename>> {
        self.tags.update(id, patch, &mut self.pages)
    }

    pub fn delete_tag(&mut self, id: &str) -> Result<SuperTag> {
        self.tags.delete(id, &mut self.pages)
    }

    /// Load the bundled sample tags and pages. Ids are kept; timestamps are now.
    pub fn seed_sample_data(&mut self) -> AnyResult<()> {
        let seed: SeedData =
            serde_yaml::from_str(SAMPLE_WORKSPACE).context("Failed to parse sample workspace")?;
        let now = Utc::now();

        for tag in seed.tags {
            self.tags.insert(SuperTag {
                id: tag.id,
                name: tag.name,
                color: tag.color,
                icon: tag.icon,
                description: tag.description,
                template: None,
                properties: tag.properties,
                created_at: now,
                updated_at: now,
            });
        }

        for page in seed.pages {
            self.pages.insert(Page {
                id: page.id,
                title: page.title,
                content: page.content,
                parent_id: None,
                icon: None,
                cover_image: None,
                tags: page.tags,
                properties: page.properties,
                is_template: false,
                created_at: now,
                updated_at: now,
            });
        }

        info!(
            "Seeded sample workspace: {} tag(s), {} page(s)",
            self.tags.len(),
            self.pages.len()
        );
        Ok(())
    }

    /// Create a page carrying `tag_id`, filled from the tag's template.
    ///
    /// `{{title}}`, `{{date}}` and any caller variable are substituted in block
    /// content and text property values.
    pub fn create_page_from_template(
        &mut self,
        tag_id: &str,
        parent_id: Option<&str>,
        variables: HashMap<String, String>,
    ) -> Result<Page> {
        let tag = self
            .tags
            .get(tag_id)
            .ok_or_else(|| WorkspaceError::TagNotFound(tag_id.to_string()))?;
        let template = tag.template.clone().unwrap_or_default();

        let page = self.pages.create(parent_id);
        let title = variables
            .get("title")
            .cloned()
            .unwrap_or_else(|| page.title.clone());
        let mut variables = variables;
        variables.insert("title".to_string(), title.clone());

        let content: Vec<ContentBlock> = template
            .blocks
            .iter()
            .map(|block| ContentBlock {
                id: new_block_id(),
                content: substitute_variables(&block.content, &variables),
                ..block.clone()
            })
            .collect();
        let properties: PropertyMap = template
            .properties
            .iter()
            .map(|(name, value)| (name.clone(), substitute_value(value, &variables)))
            .collect();

        self.pages.update(
            &page.id,
            PagePatch {
                title: Some(title),
                content: Some(content),
                properties: Some(properties),
                ..Default::default()
            },
        )?;
        self.pages.attach_tag(&page.id, tag_id, &self.tags)?;
        info!("Created page {} from template of tag {}", page.id, tag_id);

        self.pages
            .get(&page.id)
            .cloned()
            .ok_or_else(|| WorkspaceError::PageNotFound(page.id.clone()))
    }
}
