use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use crate::blocks::ContentBlock;
use crate::error::{Result, WorkspaceError};

/// Page property values keyed by property name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

// ---- Property Kinds ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Text,
    Number,
    Date,
    Select,
    MultiSelect,
    Checkbox,
    Url,
    Email,
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Text => "text",
            PropertyKind::Number => "number",
            PropertyKind::Date => "date",
            PropertyKind::Select => "select",
            PropertyKind::MultiSelect => "multi_select",
            PropertyKind::Checkbox => "checkbox",
            PropertyKind::Url => "url",
            PropertyKind::Email => "email",
        }
    }

    pub fn has_options(&self) -> bool {
        matches!(self, PropertyKind::Select | PropertyKind::MultiSelect)
    }

    /// Whether a stored value has the shape this kind expects.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match self {
            PropertyKind::Text | PropertyKind::Select | PropertyKind::Url | PropertyKind::Email => {
                value.as_text().is_some()
            }
            PropertyKind::Number => matches!(value, PropertyValue::Number(_)),
            PropertyKind::Date => matches!(value, PropertyValue::Date(_)),
            PropertyKind::MultiSelect => matches!(value, PropertyValue::Multi(_)),
            PropertyKind::Checkbox => matches!(value, PropertyValue::Checkbox(_)),
        }
    }
}

// ---- Property Values ----

/// A stored page property value.
///
/// Serialized as plain JSON. Variant order matters for deserialization: a
/// `YYYY-MM-DD` string becomes `Date`, any other string becomes `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Checkbox(bool),
    Number(#[serde(serialize_with = "serialize_number")] f64),
    Date(NaiveDate),
    Text(String),
    Multi(Vec<String>),
}

// Whole numbers go back out as JSON integers, so `3` stays `3`.
fn serialize_number<S: serde::Serializer>(n: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serializer.serialize_i64(*n as i64)
    } else {
        serializer.serialize_f64(*n)
    }
}

impl PropertyValue {
    pub fn text(s: impl Into<String>) -> Self {
        PropertyValue::Text(s.into())
    }

    /// String form for text-like kinds. Dates count, since a text field may hold one.
    pub fn as_text(&self) -> Option<String> {
        match self {
            PropertyValue::Text(s) => Some(s.clone()),
            PropertyValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }

    /// Flattened text used for search indexing.
    pub fn to_plain_string(&self) -> String {
        match self {
            PropertyValue::Checkbox(b) => b.to_string(),
            PropertyValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            PropertyValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::Multi(items) => items.join(", "),
        }
    }
}

// ---- Schema Types ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    /// For select/multi_select: allowed options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<PropertyValue>,
}

impl PropertyDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            options: None,
            required: false,
            default_value: None,
        }
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = Some(options.iter().map(|o| o.to_string()).collect());
        self
    }

    pub fn with_default(mut self, value: PropertyValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Allowed choices. Missing options are an empty choice set.
    pub fn choices(&self) -> &[String] {
        self.options.as_deref().unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkspaceError::InvalidSchema(format!(
                "Property '{}' must have a name",
                self.id
            )));
        }
        if self.kind.has_options() && self.choices().is_empty() {
            return Err(WorkspaceError::InvalidSchema(format!(
                "Property '{}' of type {} must have options defined",
                self.name,
                self.kind.as_str()
            )));
        }
        if let Some(ref default) = self.default_value {
            if !self.kind.accepts(default) {
                return Err(WorkspaceError::InvalidSchema(format!(
                    "Default value of property '{}' does not match type {}",
                    self.name,
                    self.kind.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Convert a raw editor input into a typed value for this property.
    pub fn coerce(&self, raw: &JsonValue) -> Result<PropertyValue> {
        let invalid = |detail: &str| {
            WorkspaceError::InvalidValue(format!(
                "'{}' expects {}: {}",
                self.name,
                self.kind.as_str(),
                detail
            ))
        };

        match self.kind {
            PropertyKind::Text => raw
                .as_str()
                .map(PropertyValue::text)
                .ok_or_else(|| invalid("not a string")),
            PropertyKind::Number => match raw {
                JsonValue::Number(n) => n
                    .as_f64()
                    .map(PropertyValue::Number)
                    .ok_or_else(|| invalid("out of range")),
                JsonValue::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(PropertyValue::Number)
                    .map_err(|_| invalid(s)),
                _ => Err(invalid("not a number")),
            },
            PropertyKind::Date => {
                let s = raw.as_str().ok_or_else(|| invalid("not a string"))?;
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(PropertyValue::Date)
                    .map_err(|_| invalid(s))
            }
            PropertyKind::Checkbox => match raw {
                JsonValue::Bool(b) => Ok(PropertyValue::Checkbox(*b)),
                JsonValue::String(s) if s == "true" => Ok(PropertyValue::Checkbox(true)),
                JsonValue::String(s) if s == "false" => Ok(PropertyValue::Checkbox(false)),
                _ => Err(invalid("not a boolean")),
            },
            PropertyKind::Select => {
                let s = raw.as_str().ok_or_else(|| invalid("not a string"))?;
                if self.choices().iter().any(|o| o == s) {
                    Ok(PropertyValue::text(s))
                } else {
                    Err(invalid(&format!("'{}' is not an option", s)))
                }
            }
            PropertyKind::MultiSelect => {
                let picked: Vec<String> = match raw {
                    JsonValue::String(s) => vec![s.clone()],
                    JsonValue::Array(items) => items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| invalid("not a list of strings"))?,
                    _ => return Err(invalid("not a list of strings")),
                };
                if let Some(bad) = picked.iter().find(|p| !self.choices().contains(*p)) {
                    return Err(invalid(&format!("'{}' is not an option", bad)));
                }
                Ok(PropertyValue::Multi(picked))
            }
            PropertyKind::Url => {
                let s = raw.as_str().ok_or_else(|| invalid("not a string"))?;
                url::Url::parse(s.trim()).map_err(|e| invalid(&e.to_string()))?;
                Ok(PropertyValue::text(s.trim()))
            }
            PropertyKind::Email => {
                let s = raw.as_str().ok_or_else(|| invalid("not a string"))?;
                if email_pattern().is_match(s.trim()) {
                    Ok(PropertyValue::text(s.trim()))
                } else {
                    Err(invalid(s))
                }
            }
        }
    }
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern")
    })
}

/// Blocks and property values a new page starts from when created through a tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageTemplate {
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperTag {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PageTemplate>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SuperTag {
    pub fn validate(&self) -> Result<()> {
        validate_tag_fields(&self.name, &self.properties)
    }
}

/// Client-supplied fields for a new tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuperTagInput {
    pub name: String,
    pub color: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub template: Option<PageTemplate>,
    pub properties: Vec<PropertyDef>,
}

impl Default for SuperTagInput {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: "#3B82F6".to_string(),
            icon: Some("tag".to_string()),
            description: None,
            template: None,
            properties: Vec::new(),
        }
    }
}

impl SuperTagInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, def: PropertyDef) -> Self {
        self.properties.push(def);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_tag_fields(&self.name, &self.properties)
    }
}

/// Fields to merge into an existing tag. `None` leaves a field unchanged.
///
/// The optional fields take `Some(None)` (JSON `null`) to clear them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuperTagPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    #[serde(deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub icon: Option<Option<String>>,
    #[serde(deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub template: Option<Option<PageTemplate>>,
    pub properties: Option<Vec<PropertyDef>>,
}

// A present key is `Some`, even when its value is `null`.
fn clearable<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn validate_tag_fields(name: &str, properties: &[PropertyDef]) -> Result<()> {
    if name.trim().is_empty() {
        return Err(WorkspaceError::InvalidSchema("Tag name must not be empty".to_string()));
    }

    let mut seen_ids = HashSet::new();
    for prop in properties {
        if !seen_ids.insert(prop.id.as_str()) {
            return Err(WorkspaceError::InvalidSchema(format!(
                "Duplicate property ID: '{}'",
                prop.id
            )));
        }
        prop.validate()?;
    }
    Ok(())
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_kind_roundtrip() {
        let kinds = [
            PropertyKind::Text,
            PropertyKind::Number,
            PropertyKind::Date,
            PropertyKind::Select,
            PropertyKind::MultiSelect,
            PropertyKind::Checkbox,
            PropertyKind::Url,
            PropertyKind::Email,
        ];
        for kind in kinds {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, json!(kind.as_str()));
        }
        assert!(serde_json::from_value::<PropertyKind>(json!("relation")).is_err());
    }

    #[test]
    fn test_property_value_wire_shapes() {
        let parsed: PropertyMap = serde_json::from_value(json!({
            "Done": false,
            "Points": 3,
            "Due Date": "2024-03-31",
            "Owner": "Alice",
            "Labels": ["bug", "docs"],
        }))
        .unwrap();

        assert_eq!(parsed["Done"], PropertyValue::Checkbox(false));
        assert_eq!(parsed["Points"], PropertyValue::Number(3.0));
        assert_eq!(
            parsed["Due Date"],
            PropertyValue::Date(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
        );
        assert_eq!(parsed["Owner"], PropertyValue::text("Alice"));
        assert_eq!(
            parsed["Labels"],
            PropertyValue::Multi(vec!["bug".into(), "docs".into()])
        );
        assert_eq!(serde_json::to_value(&parsed["Due Date"]).unwrap(), json!("2024-03-31"));
        assert_eq!(
            serde_json::to_value(&parsed).unwrap()["Points"],
            json!(3)
        );
        assert_eq!(serde_json::to_value(PropertyValue::Number(4.5)).unwrap(), json!(4.5));
    }

    #[test]
    fn test_tag_patch_distinguishes_null_from_absent() {
        let patch: SuperTagPatch =
            serde_json::from_value(json!({ "icon": null, "description": "Tracked" })).unwrap();
        assert_eq!(patch.icon, Some(None));
        assert_eq!(patch.description, Some(Some("Tracked".to_string())));
        assert_eq!(patch.template, None);
        assert_eq!(patch.name, None);
    }

    #[test]
    fn test_text_kinds_accept_date_looking_strings() {
        let date = PropertyValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!(PropertyKind::Text.accepts(&date));
        assert!(PropertyKind::Date.accepts(&date));
        assert!(!PropertyKind::Number.accepts(&date));
        assert!(!PropertyKind::Checkbox.accepts(&PropertyValue::text("yes")));
    }

    #[test]
    fn test_validation_select_without_options() {
        let def = PropertyDef::new("p1", "Status", PropertyKind::Select);
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("must have options"));

        let def = def.with_options(&["Planning", "Done"]);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validation_default_must_match_type() {
        let def = PropertyDef::new("p1", "Done", PropertyKind::Checkbox)
            .with_default(PropertyValue::text("no"));
        assert!(def.validate().is_err());

        let def = PropertyDef::new("p1", "Done", PropertyKind::Checkbox)
            .with_default(PropertyValue::Checkbox(false));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validation_duplicate_property_id() {
        let input = SuperTagInput::named("Project")
            .with_property(PropertyDef::new("x", "A", PropertyKind::Text))
            .with_property(PropertyDef::new("x", "B", PropertyKind::Number));
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate property ID"));
    }

    #[test]
    fn test_validation_empty_tag_name() {
        assert!(SuperTagInput::named("   ").validate().is_err());
    }

    #[test]
    fn test_coerce_inputs() {
        let number = PropertyDef::new("n", "Points", PropertyKind::Number);
        assert_eq!(number.coerce(&json!("4.5")).unwrap(), PropertyValue::Number(4.5));
        assert_eq!(number.coerce(&json!(2)).unwrap(), PropertyValue::Number(2.0));
        assert!(number.coerce(&json!("lots")).is_err());

        let date = PropertyDef::new("d", "Due", PropertyKind::Date);
        assert!(matches!(date.coerce(&json!("2024-03-31")).unwrap(), PropertyValue::Date(_)));
        assert!(date.coerce(&json!("31/03/2024")).is_err());

        let check = PropertyDef::new("c", "Done", PropertyKind::Checkbox);
        assert_eq!(check.coerce(&json!("true")).unwrap(), PropertyValue::Checkbox(true));

        let link = PropertyDef::new("u", "Link", PropertyKind::Url);
        assert!(link.coerce(&json!("https://example.com/a")).is_ok());
        assert!(link.coerce(&json!("not a url")).is_err());

        let mail = PropertyDef::new("e", "Contact", PropertyKind::Email);
        assert!(mail.coerce(&json!("alice@example.com")).is_ok());
        assert!(mail.coerce(&json!("alice")).is_err());
    }

    #[test]
    fn test_coerce_select_against_options() {
        let status = PropertyDef::new("s", "Status", PropertyKind::Select)
            .with_options(&["Planning", "Done"]);
        assert_eq!(status.coerce(&json!("Done")).unwrap(), PropertyValue::text("Done"));
        assert!(status.coerce(&json!("Shipped")).is_err());

        let labels = PropertyDef::new("l", "Labels", PropertyKind::MultiSelect)
            .with_options(&["bug", "docs"]);
        assert_eq!(
            labels.coerce(&json!(["bug", "docs"])).unwrap(),
            PropertyValue::Multi(vec!["bug".into(), "docs".into()])
        );
        assert_eq!(
            labels.coerce(&json!("bug")).unwrap(),
            PropertyValue::Multi(vec!["bug".into()])
        );

        // Missing options are an empty choice set, not a crash.
        let broken = PropertyDef::new("b", "Broken", PropertyKind::Select);
        assert!(broken.coerce(&json!("anything")).is_err());
    }

    #[test]
    fn test_parse_tag_with_template() {
        let tag: SuperTag = serde_json::from_value(json!({
            "id": "tag-1",
            "name": "Meeting",
            "color": "#10B981",
            "icon": "hash",
            "template": {
                "blocks": [{ "id": "b1", "type": "heading2", "content": "Agenda" }],
                "properties": { "Meeting Type": "Standup" }
            },
            "properties": [
                { "id": "prop-5", "name": "Date", "type": "date", "required": true },
                { "id": "prop-7", "name": "Meeting Type", "type": "select", "options": ["Standup", "Review"] }
            ],
            "createdAt": "2024-01-15T09:00:00Z",
            "updatedAt": "2024-01-15T09:00:00Z"
        }))
        .unwrap();

        assert!(tag.validate().is_ok());
        assert!(tag.properties[0].required);
        assert_eq!(tag.properties[1].choices().len(), 2);
        assert_eq!(tag.template.as_ref().unwrap().blocks.len(), 1);
    }
}
