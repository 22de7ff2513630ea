use serde::Serialize;

use crate::blocks::BlockKind;

/// One entry of the editor's slash-command menu.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlashCommand {
    pub title: &'static str,
    pub description: &'static str,
    pub search_terms: &'static [&'static str],
    /// Block type the command turns the current line into.
    pub block: BlockKind,
}

impl SlashCommand {
    pub fn matches(&self, query: &str) -> bool {
        let search = query.trim().to_lowercase();
        if search.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&search)
            || self.description.to_lowercase().contains(&search)
            || self
                .search_terms
                .iter()
                .any(|term| term.to_lowercase().contains(&search))
    }
}

const COMMANDS: &[SlashCommand] = &[
    SlashCommand {
        title: "Text",
        description: "Just start typing with plain text.",
        search_terms: &["p", "paragraph"],
        block: BlockKind::Paragraph,
    },
    SlashCommand {
        title: "Heading 1",
        description: "Big section heading.",
        search_terms: &["title", "big", "large"],
        block: BlockKind::Heading1,
    },
    SlashCommand {
        title: "Heading 2",
        description: "Medium section heading.",
        search_terms: &["subtitle", "medium"],
        block: BlockKind::Heading2,
    },
    SlashCommand {
        title: "Heading 3",
        description: "Small section heading.",
        search_terms: &["subtitle", "small"],
        block: BlockKind::Heading3,
    },
    SlashCommand {
        title: "Bullet List",
        description: "Create a simple bullet list.",
        search_terms: &["unordered", "point"],
        block: BlockKind::BulletedList,
    },
    SlashCommand {
        title: "Numbered List",
        description: "Create a list with numbering.",
        search_terms: &["ordered"],
        block: BlockKind::NumberedList,
    },
    SlashCommand {
        title: "Quote",
        description: "Capture a quote.",
        search_terms: &["blockquote"],
        block: BlockKind::Quote,
    },
    SlashCommand {
        title: "Code",
        description: "Capture a code snippet.",
        search_terms: &["codeblock"],
        block: BlockKind::Code,
    },
];

/// Commands matching `query`, in menu order. An empty query matches everything.
pub fn filter(query: &str) -> Vec<&'static SlashCommand> {
    COMMANDS.iter().filter(|c| c.matches(query)).collect()
}
