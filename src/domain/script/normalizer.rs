use super::model::{Block, BlockKind, NormalizedText, RawContent};

/// Fixed, ordered substitution table mapping non-speakable tokens to
/// pronounceable words. Matched against whole tokens only and applied in a
/// single pass, so no substituted output is ever re-substituted.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("&&", "and"),
    ("||", "or"),
    ("&", "and"),
    ("%", "percent"),
    ("+", "plus"),
    ("=", "equals"),
    ("->", "leads to"),
    ("=>", "implies"),
    ("<", "less than"),
    (">", "greater than"),
    ("~", "roughly"),
    ("@", "at"),
    ("e.g.", "for example"),
    ("i.e.", "that is"),
    ("etc.", "and so on"),
    ("vs.", "versus"),
    ("vs", "versus"),
    ("--", ","),
    ("\u{2013}", ","),
    ("\u{2014}", ","),
];

/// Normalize raw prose into speakable blocks.
///
/// Never fails: empty or whitespace-only input yields an empty result, which
/// the orchestrator reports upstream as "no content".
pub fn normalize(content: &RawContent) -> NormalizedText {
    let mut blocks = Vec::new();

    for raw_block in split_blocks(&content.text) {
        let kind = classify_block(&raw_block);
        let text = match kind {
            // Table rows keep their cell text; the baseline scripter decides
            // how to narrate them.
            BlockKind::Table => normalize_table(&raw_block),
            BlockKind::Heading => normalize_prose(strip_heading_markers(&raw_block).as_str()),
            BlockKind::Prose => normalize_prose(&raw_block),
        };

        if !text.is_empty() {
            blocks.push(Block { text, kind });
        }
    }

    tracing::debug!(
        block_count = blocks.len(),
        input_length = content.text.len(),
        "Text normalized"
    );

    NormalizedText { blocks }
}

/// Split on blank lines into paragraph-level blocks.
fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                blocks.push(current.clone());
            }
            current.clear();
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }

    blocks
}

fn classify_block(block: &str) -> BlockKind {
    let lines: Vec<&str> = block.lines().collect();

    let table_lines = lines
        .iter()
        .filter(|l| l.contains('|') || l.contains('\t'))
        .count();
    if !lines.is_empty() && table_lines * 2 >= lines.len() {
        return BlockKind::Table;
    }

    if lines.len() == 1 && lines[0].trim_start().starts_with('#') {
        return BlockKind::Heading;
    }

    BlockKind::Prose
}

fn strip_heading_markers(block: &str) -> String {
    block.trim_start().trim_start_matches('#').trim().to_string()
}

fn normalize_prose(block: &str) -> String {
    let without_bullets: Vec<String> = block.lines().map(strip_bullet).collect();
    let joined = without_bullets.join(" ");

    // Emphasis markers carry no pronunciation; drop them before token
    // substitution so `**word**` becomes a plain token.
    let emphasis = regex::Regex::new(r"[*_`]+").unwrap();
    let plain = emphasis.replace_all(&joined, "");

    let substituted = substitute_tokens(&plain);

    let whitespace = regex::Regex::new(r"\s+").unwrap();
    whitespace.replace_all(&substituted, " ").trim().to_string()
}

fn normalize_table(block: &str) -> String {
    // Keep rows separated so the scripter can count them; cells become
    // comma-separated speakable fragments.
    block
        .lines()
        .map(|line| {
            let cells: Vec<String> = line
                .split(['|', '\t'])
                .map(|c| substitute_tokens(c.trim()))
                .filter(|c| !c.is_empty() && !c.chars().all(|ch| ch == '-' || ch == ':'))
                .collect();
            cells.join(", ")
        })
        .filter(|row| !row.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_bullet(line: &str) -> String {
    let trimmed = line.trim_start();
    for prefix in ["- ", "* ", "\u{2022} "] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    // Numbered list markers like "1." or "2)".
    let numbered = regex::Regex::new(r"^\d+[.)]\s+").unwrap();
    numbered.replace(trimmed, "").to_string()
}

/// Single-pass whole-token substitution; first table entry wins.
fn substitute_tokens(text: &str) -> String {
    text.split_whitespace()
        .map(|token| {
            SUBSTITUTIONS
                .iter()
                .find(|(symbol, _)| *symbol == token)
                .map(|(_, replacement)| *replacement)
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize_text(text: &str) -> NormalizedText {
        normalize(&RawContent::new(text, "test"))
    }

    #[test]
    fn test_empty_input_yields_empty_result() {
        let result = normalize_text("");
        assert!(result.is_empty());
        assert_eq!(result.blocks.len(), 0);

        let whitespace_only = normalize_text("  \n\n   \n");
        assert!(whitespace_only.is_empty());
    }

    #[test]
    fn test_no_source_symbols_survive() {
        let input = "Cost & time = effort + focus. Latency < 5 -> good. ~ 10 % gain.";
        let result = normalize_text(input);
        let output = result.to_plain_text();

        for (symbol, _) in SUBSTITUTIONS {
            for token in output.split_whitespace() {
                assert_ne!(
                    token, *symbol,
                    "substitution source {:?} survived in output {:?}",
                    symbol, output
                );
            }
        }
        assert!(output.contains("and"));
        assert!(output.contains("percent"));
        assert!(output.contains("leads to"));
    }

    #[test]
    fn test_substitution_applies_once() {
        // "and" is a replacement value; a literal "and" token must pass
        // through untouched rather than being re-substituted.
        let result = normalize_text("salt and pepper & vinegar");
        assert_eq!(result.to_plain_text(), "salt and pepper and vinegar");
    }

    #[test]
    fn test_substitution_is_whole_token_only() {
        // "&" embedded in a token (e.g. "AT&T") is not a whole token and is
        // left alone.
        let result = normalize_text("AT&T ships hardware");
        assert_eq!(result.to_plain_text(), "AT&T ships hardware");
    }

    #[test]
    fn test_emphasis_markers_removed() {
        let result = normalize_text("This is **really** _important_ and `code`.");
        let output = result.to_plain_text();
        assert!(!output.contains('*'));
        assert!(!output.contains('_'));
        assert!(!output.contains('`'));
        assert!(output.contains("really"));
        assert!(output.contains("important"));
    }

    #[test]
    fn test_bullets_stripped() {
        let input = "- first item\n* second item\n1. third item";
        let result = normalize_text(input);
        let output = result.to_plain_text();
        assert!(!output.contains("- "));
        assert!(!output.contains("* "));
        assert!(output.contains("first item"));
        assert!(output.contains("third item"));
    }

    #[test]
    fn test_heading_detected_and_stripped() {
        let result = normalize_text("## Key Rotation\n\nRotate keys often.");
        assert_eq!(result.blocks.len(), 2);
        assert_eq!(result.blocks[0].kind, BlockKind::Heading);
        assert_eq!(result.blocks[0].text, "Key Rotation");
        assert_eq!(result.blocks[1].kind, BlockKind::Prose);
    }

    #[test]
    fn test_table_region_flagged() {
        let input = "| Tier | Limit |\n|------|-------|\n| Free | 20 |\n| Pro | 200 |";
        let result = normalize_text(input);
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].kind, BlockKind::Table);
        // Separator row dropped, data rows kept.
        assert_eq!(result.blocks[0].text.lines().count(), 3);
        assert!(result.blocks[0].text.contains("Tier, Limit"));
    }

    #[test]
    fn test_whitespace_normalized() {
        let result = normalize_text("Too    many     spaces\nacross\nlines");
        assert_eq!(result.to_plain_text(), "Too many spaces across lines");
    }

    #[test]
    fn test_paragraphs_preserved_in_order() {
        let result = normalize_text("First paragraph.\n\nSecond paragraph.\n\nThird.");
        let texts: Vec<&str> = result.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["First paragraph.", "Second paragraph.", "Third."]
        );
    }
}
