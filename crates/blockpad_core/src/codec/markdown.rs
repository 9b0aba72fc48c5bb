//! Line-oriented markdown codec.
//!
//! # Responsibility
//! - Classify markdown lines into typed blocks by leading prefix.
//! - Render typed blocks back to markdown with the inverse prefix.
//!
//! # Invariants
//! - Parsing never fails; unrecognized lines become `text` blocks.
//! - Parsing infers no nesting; every parsed block is a flat sibling.
//! - Rendering joins blocks with `\n` and emits no trailing newline.
//! - The mapping is lossy: inline formatting and indentation are dropped.

use crate::model::block::{Block, BlockProperties, BlockType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static NUMBERED_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\. ").expect("valid numbered prefix regex"));

const CODE_FENCE: &str = "```";

/// Property set on todo blocks.
pub const CHECKED_PROPERTY: &str = "checked";
/// Property holding the source number of a numbered item.
pub const NUMBER_PROPERTY: &str = "number";
/// Property holding a code block's fence info string.
pub const LANGUAGE_PROPERTY: &str = "language";
/// Property holding a bullet's list marker when it is not `-`.
pub const MARKER_PROPERTY: &str = "marker";

const STAR_MARKER: &str = "*";

/// Block produced by parsing, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    pub kind: BlockType,
    pub content: String,
    pub properties: BlockProperties,
}

impl ParsedBlock {
    fn new(kind: BlockType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            properties: BlockProperties::new(),
        }
    }

    fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

/// Parses markdown text into flat typed blocks.
///
/// Lines are trimmed and blank lines skipped, except inside fenced code
/// where lines are kept verbatim up to the closing fence or end of input.
pub fn parse_markdown(text: &str) -> Vec<ParsedBlock> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(info) = trimmed.strip_prefix(CODE_FENCE) {
            let mut body = Vec::new();
            for code_line in lines.by_ref() {
                if code_line.trim_start().starts_with(CODE_FENCE) {
                    break;
                }
                body.push(code_line);
            }
            let mut block = ParsedBlock::new(BlockType::Code, body.join("\n"));
            let language = info.trim();
            if !language.is_empty() {
                block = block.with_property(LANGUAGE_PROPERTY, Value::from(language));
            }
            blocks.push(block);
            continue;
        }

        blocks.push(parse_line(trimmed));
    }

    blocks
}

/// Classifies one trimmed, non-blank, non-fence line.
fn parse_line(line: &str) -> ParsedBlock {
    if let Some(rest) = line.strip_prefix("# ") {
        return ParsedBlock::new(BlockType::H1, rest);
    }
    if let Some(rest) = line.strip_prefix("## ") {
        return ParsedBlock::new(BlockType::H2, rest);
    }
    if let Some(rest) = line.strip_prefix("### ") {
        return ParsedBlock::new(BlockType::H3, rest);
    }
    if let Some(rest) = line.strip_prefix("- [ ] ") {
        return ParsedBlock::new(BlockType::Todo, rest)
            .with_property(CHECKED_PROPERTY, Value::Bool(false));
    }
    if let Some(rest) = line.strip_prefix("- [x] ") {
        return ParsedBlock::new(BlockType::Todo, rest)
            .with_property(CHECKED_PROPERTY, Value::Bool(true));
    }
    if let Some(rest) = line.strip_prefix("- ") {
        return ParsedBlock::new(BlockType::Bullet, rest);
    }
    if let Some(rest) = line.strip_prefix("* ") {
        return ParsedBlock::new(BlockType::Bullet, rest)
            .with_property(MARKER_PROPERTY, Value::from(STAR_MARKER));
    }
    if let Some(captures) = NUMBERED_PREFIX_RE.captures(line) {
        let prefix_len = captures.get(0).map_or(0, |m| m.end());
        let mut block = ParsedBlock::new(BlockType::Numbered, &line[prefix_len..]);
        if let Some(number) = captures.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) {
            block = block.with_property(NUMBER_PROPERTY, Value::from(number));
        }
        return block;
    }
    if let Some(rest) = line.strip_prefix("> ") {
        return ParsedBlock::new(BlockType::Quote, rest);
    }
    ParsedBlock::new(BlockType::Text, line)
}

/// Renders blocks in the given order, one markdown line (or fenced region)
/// per block.
pub fn render_markdown(blocks: &[Block]) -> String {
    let mut lines = Vec::with_capacity(blocks.len());
    let mut ordinal: u64 = 0;

    for block in blocks {
        if block.kind == BlockType::Numbered {
            ordinal += 1;
        } else {
            ordinal = 0;
        }

        let line = match block.kind {
            BlockType::H1 => format!("# {}", block.content),
            BlockType::H2 => format!("## {}", block.content),
            BlockType::H3 => format!("### {}", block.content),
            BlockType::Todo if block.flag(CHECKED_PROPERTY) => format!("- [x] {}", block.content),
            BlockType::Todo => format!("- [ ] {}", block.content),
            BlockType::Bullet => {
                let marker = block
                    .properties
                    .get(MARKER_PROPERTY)
                    .and_then(Value::as_str)
                    .filter(|marker| *marker == STAR_MARKER)
                    .unwrap_or("-");
                format!("{marker} {}", block.content)
            }
            BlockType::Numbered => {
                let number = block
                    .properties
                    .get(NUMBER_PROPERTY)
                    .and_then(Value::as_u64)
                    .unwrap_or(ordinal);
                format!("{number}. {}", block.content)
            }
            BlockType::Quote => format!("> {}", block.content),
            BlockType::Code => render_code(block),
            BlockType::Text | BlockType::Toggle => block.content.clone(),
        };
        lines.push(line);
    }

    lines.join("\n")
}

fn render_code(block: &Block) -> String {
    let language = block
        .properties
        .get(LANGUAGE_PROPERTY)
        .and_then(Value::as_str)
        .unwrap_or("");
    if block.content.is_empty() {
        format!("{CODE_FENCE}{language}\n{CODE_FENCE}")
    } else {
        format!("{CODE_FENCE}{language}\n{}\n{CODE_FENCE}", block.content)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse_markdown, render_markdown, ParsedBlock, CHECKED_PROPERTY, LANGUAGE_PROPERTY,
        MARKER_PROPERTY,
    };
    use crate::model::block::{Block, BlockType};
    use serde_json::Value;
    use uuid::Uuid;

    fn kinds(blocks: &[ParsedBlock]) -> Vec<BlockType> {
        blocks.iter().map(|block| block.kind).collect()
    }

    fn stored(parsed: Vec<ParsedBlock>) -> Vec<Block> {
        parsed
            .into_iter()
            .enumerate()
            .map(|(index, parsed)| Block {
                id: Uuid::new_v4(),
                page_id: Uuid::nil(),
                kind: parsed.kind,
                content: parsed.content,
                properties: parsed.properties,
                parent_id: None,
                child_ids: Vec::new(),
                position: index as i64,
                created_at: 0,
                updated_at: 0,
            })
            .collect()
    }

    #[test]
    fn prefixes_map_to_block_types() {
        let parsed = parse_markdown(
            "# a\n## b\n### c\n- [ ] d\n- [x] e\n- f\n* g\n12. h\n> i\nplain",
        );
        assert_eq!(
            kinds(&parsed),
            vec![
                BlockType::H1,
                BlockType::H2,
                BlockType::H3,
                BlockType::Todo,
                BlockType::Todo,
                BlockType::Bullet,
                BlockType::Bullet,
                BlockType::Numbered,
                BlockType::Quote,
                BlockType::Text,
            ]
        );
        let contents: Vec<&str> = parsed.iter().map(|b| b.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["a", "b", "c", "d", "e", "f", "g", "h", "i", "plain"]
        );
        assert_eq!(parsed[4].properties.get(CHECKED_PROPERTY), Some(&Value::Bool(true)));
    }

    #[test]
    fn lines_are_trimmed_and_blank_lines_skipped() {
        let parsed = parse_markdown("\n   - indented\n\n\t\ntail  \n");
        assert_eq!(kinds(&parsed), vec![BlockType::Bullet, BlockType::Text]);
        assert_eq!(parsed[0].content, "indented");
        assert_eq!(parsed[1].content, "tail");
    }

    #[test]
    fn hash_without_space_is_text() {
        let parsed = parse_markdown("#tag\n1.5 litres");
        assert_eq!(kinds(&parsed), vec![BlockType::Text, BlockType::Text]);
    }

    #[test]
    fn fenced_code_keeps_lines_verbatim() {
        let parsed = parse_markdown("```rust\nfn main() {\n    run();\n}\n```\nafter");
        assert_eq!(kinds(&parsed), vec![BlockType::Code, BlockType::Text]);
        assert_eq!(parsed[0].content, "fn main() {\n    run();\n}");
        assert_eq!(
            parsed[0].properties.get(LANGUAGE_PROPERTY),
            Some(&Value::from("rust"))
        );
    }

    #[test]
    fn unclosed_fence_runs_to_end_of_input() {
        let parsed = parse_markdown("```\nline one\n\nline three");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].content, "line one\n\nline three");
    }

    #[test]
    fn render_uses_inverse_prefixes() {
        let blocks = stored(parse_markdown("# Title\nSome text\n- item one\n- [x] done\n> quoted"));
        assert_eq!(
            render_markdown(&blocks),
            "# Title\nSome text\n- item one\n- [x] done\n> quoted"
        );
    }

    #[test]
    fn star_bullets_keep_their_marker() {
        let parsed = parse_markdown("* starred\n- dashed");
        assert_eq!(parsed[0].properties.get(MARKER_PROPERTY), Some(&Value::from("*")));
        assert!(parsed[1].properties.get(MARKER_PROPERTY).is_none());

        let mut blocks = stored(parsed);
        assert_eq!(render_markdown(&blocks), "* starred\n- dashed");

        blocks[0].properties.insert(MARKER_PROPERTY.to_string(), Value::from("+"));
        assert_eq!(render_markdown(&blocks), "- starred\n- dashed");
    }

    #[test]
    fn numbered_items_keep_source_numbers_or_count() {
        let mut blocks = stored(parse_markdown("3. third\n4. fourth"));
        assert_eq!(render_markdown(&blocks), "3. third\n4. fourth");

        for block in &mut blocks {
            block.properties.clear();
        }
        assert_eq!(render_markdown(&blocks), "1. third\n2. fourth");
    }

    #[test]
    fn code_and_toggle_render() {
        let mut blocks = stored(parse_markdown("```sh\nls -la\n```\nplain"));
        blocks[1].kind = BlockType::Toggle;
        assert_eq!(render_markdown(&blocks), "```sh\nls -la\n```\nplain");
    }

    #[test]
    fn render_then_parse_is_stable() {
        let source = "# Title\n- [ ] task\n* star\n2. step\n```\n```\n> q";
        let first = render_markdown(&stored(parse_markdown(source)));
        let second = render_markdown(&stored(parse_markdown(&first)));
        assert_eq!(first, source);
        assert_eq!(first, second);
    }
}
