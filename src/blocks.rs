use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

// ---- Block Types ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedList,
    NumberedList,
    Todo,
    Quote,
    Code,
    Divider,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub content: String,
    /// Only `checked` (todo blocks) is recognized.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonValue>,
    /// Declared for nesting, never materialized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentBlock>,
}

impl ContentBlock {
    pub fn new(kind: BlockKind, content: impl Into<String>) -> Self {
        Self {
            id: new_block_id(),
            kind,
            content: content.into(),
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn todo(content: impl Into<String>, checked: bool) -> Self {
        let mut block = Self::new(BlockKind::Todo, content);
        block.set_checked(checked);
        block
    }

    pub fn is_checked(&self) -> bool {
        self.properties
            .get("checked")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn set_checked(&mut self, checked: bool) {
        self.properties.insert("checked".to_string(), JsonValue::Bool(checked));
    }
}

/// Fields to replace on an existing block. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockPatch {
    #[serde(rename = "type")]
    pub kind: Option<BlockKind>,
    pub content: Option<String>,
    pub properties: Option<BTreeMap<String, JsonValue>>,
}

pub fn new_block_id() -> String {
    format!("block-{}", Uuid::new_v4())
}

// ---- Sequence Operations ----

/// Insert `block` right after the block with id `after`, or at the end.
///
/// An `after` id that matches nothing also appends.
pub fn insert_after(
    blocks: &[ContentBlock],
    after: Option<&str>,
    block: ContentBlock,
) -> Vec<ContentBlock> {
    let mut result = blocks.to_vec();
    let position = after.and_then(|id| result.iter().position(|b| b.id == id));

    match (after, position) {
        (_, Some(idx)) => result.insert(idx + 1, block),
        (Some(id), None) => {
            debug!("Block '{}' not found, appending '{}' instead", id, block.id);
            result.push(block);
        }
        (None, None) => result.push(block),
    }
    result
}

/// Replace the patched fields of the matching block. Other blocks and order are untouched.
pub fn update(blocks: &[ContentBlock], block_id: &str, patch: &BlockPatch) -> Vec<ContentBlock> {
    blocks
        .iter()
        .map(|b| {
            if b.id != block_id {
                return b.clone();
            }
            let mut updated = b.clone();
            if let Some(kind) = patch.kind {
                updated.kind = kind;
            }
            if let Some(ref content) = patch.content {
                updated.content = content.clone();
            }
            if let Some(ref properties) = patch.properties {
                updated.properties = properties.clone();
            }
            updated
        })
        .collect()
}

pub fn remove(blocks: &[ContentBlock], block_id: &str) -> Vec<ContentBlock> {
    blocks.iter().filter(|b| b.id != block_id).cloned().collect()
}

/// Block contents joined by newlines, for indexing and previews.
pub fn plain_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter(|b| !b.content.is_empty())
        .map(|b| b.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---- Editor Markup ----

fn fragment(block: &ContentBlock) -> String {
    let c = &block.content;
    match block.kind {
        BlockKind::Paragraph => format!("<p>{}</p>", c),
        BlockKind::Heading1 => format!("<h1>{}</h1>", c),
        BlockKind::Heading2 => format!("<h2>{}</h2>", c),
        BlockKind::Heading3 => format!("<h3>{}</h3>", c),
        BlockKind::BulletedList => format!("<ul><li>{}</li></ul>", c),
        BlockKind::NumberedList => format!("<ol><li>{}</li></ol>", c),
        BlockKind::Todo => {
            let checked = if block.is_checked() { "checked" } else { "" };
            format!(
                "<div data-type=\"taskItem\" data-checked=\"{}\">{}</div>",
                checked, c
            )
        }
        BlockKind::Quote => format!("<blockquote>{}</blockquote>", c),
        BlockKind::Code => format!("<pre><code>{}</code></pre>", c),
        BlockKind::Divider => "<hr>".to_string(),
        BlockKind::Image => format!("<img src=\"{}\">", escape_attr(c)),
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn unescape_attr(value: &str) -> String {
    value.replace("&quot;", "\"").replace("&amp;", "&")
}

/// Render blocks into the editor's markup, one fragment per block.
pub fn to_markup(blocks: &[ContentBlock]) -> String {
    blocks.iter().map(fragment).collect()
}

struct FragmentPattern {
    kind: BlockKind,
    pattern: Regex,
}

fn fragment_patterns() -> &'static [FragmentPattern] {
    static PATTERNS: OnceLock<Vec<FragmentPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (BlockKind::Paragraph, r"^<p>(?P<content>.*?)</p>"),
            (BlockKind::Heading1, r"^<h1>(?P<content>.*?)</h1>"),
            (BlockKind::Heading2, r"^<h2>(?P<content>.*?)</h2>"),
            (BlockKind::Heading3, r"^<h3>(?P<content>.*?)</h3>"),
            (BlockKind::BulletedList, r"^<ul><li>(?P<content>.*?)</li></ul>"),
            (BlockKind::NumberedList, r"^<ol><li>(?P<content>.*?)</li></ol>"),
            (
                BlockKind::Todo,
                r#"^<div data-type="taskItem" data-checked="(?P<checked>checked)?">(?P<content>.*?)</div>"#,
            ),
            (BlockKind::Quote, r"^<blockquote>(?P<content>.*?)</blockquote>"),
            (BlockKind::Code, r"^<pre><code>(?P<content>.*?)</code></pre>"),
            (BlockKind::Divider, r"^<hr\s*/?>"),
            (BlockKind::Image, r#"^<img src="(?P<content>[^"]*)"\s*/?>"#),
        ]
        .into_iter()
        .map(|(kind, src)| FragmentPattern {
            kind,
            pattern: Regex::new(&format!("(?s){}", src)).expect("valid fragment pattern"),
        })
        .collect()
    })
}

fn parse_fragment(rest: &str) -> Option<(ContentBlock, usize)> {
    fragment_patterns().iter().find_map(|f| {
        let caps = f.pattern.captures(rest)?;
        let content = caps.name("content").map(|m| m.as_str()).unwrap_or("");
        let mut block = match f.kind {
            BlockKind::Image => ContentBlock::new(f.kind, unescape_attr(content)),
            _ => ContentBlock::new(f.kind, content),
        };
        if f.kind == BlockKind::Todo {
            block.set_checked(caps.name("checked").is_some());
        }
        Some((block, caps.get(0)?.end()))
    })
}

/// Rebuild blocks from editor markup.
///
/// Recognizes the fragments `to_markup` produces. Markup that cannot be fully
/// decomposed collapses into a single paragraph holding the raw markup.
pub fn from_markup(markup: &str) -> Vec<ContentBlock> {
    let mut rest = markup.trim_start();
    let mut blocks = Vec::new();

    while !rest.is_empty() {
        let Some((block, len)) = parse_fragment(rest) else {
            debug!("Unrecognized editor markup, collapsing to one paragraph");
            return vec![ContentBlock::new(BlockKind::Paragraph, markup)];
        };
        blocks.push(block);
        rest = rest[len..].trim_start();
    }

    blocks
}

// ---- Tests ----
