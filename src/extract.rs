//! Normalizes free-form model output into a single SQL statement
//!
//! Preference order:
//! 1. contents of the first fenced block tagged `sql`
//! 2. contents of the first fenced block of any kind
//! 3. the whole text
//!
//! The chosen text is then cut at the first `;` and trimmed. A fence opens
//! with three backticks. The language hint is one word: the whole opening
//! line when it holds a single token, or a leading `sql` followed by
//! whitespace. Anything else on the opening line is part of the contents. A
//! fence without a closing delimiter is not a block.

const FENCE: &str = "```";

/// A delimiter-bounded region of the input
#[derive(Debug, PartialEq)]
struct FencedBlock<'a> {
    info: &'a str,
    contents: &'a str,
}

impl FencedBlock<'_> {
    fn is_sql(&self) -> bool {
        self.info.trim().eq_ignore_ascii_case("sql")
    }
}

/// Iterates complete fenced blocks left to right
struct FencedBlocks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for FencedBlocks<'a> {
    type Item = FencedBlock<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let open = self.rest.find(FENCE)?;
        let body_start = &self.rest[open + FENCE.len()..];
        let close = body_start.find(FENCE)?;
        let body = &body_start[..close];
        self.rest = &body_start[close + FENCE.len()..];

        Some(split_info(body))
    }
}

fn is_single_token(text: &str) -> bool {
    !text.is_empty() && !text.contains(char::is_whitespace)
}

/// Separate a one-word language hint from the block body
fn split_info(body: &str) -> FencedBlock<'_> {
    if let Some((first_line, rest)) = body.split_once('\n') {
        let hint = first_line.trim();
        if is_single_token(hint) {
            return FencedBlock {
                info: hint,
                contents: rest,
            };
        }
    }

    if let Some((token, rest)) = body.split_once(char::is_whitespace) {
        if token.eq_ignore_ascii_case("sql") {
            return FencedBlock {
                info: token,
                contents: rest,
            };
        }
    }

    FencedBlock {
        info: "",
        contents: body,
    }
}

fn fenced_blocks(text: &str) -> FencedBlocks<'_> {
    FencedBlocks { rest: text }
}

/// Extract one clean SQL statement from raw model output. Never fails.
pub fn extract_sql(raw: &str) -> String {
    let selected = fenced_blocks(raw)
        .find(FencedBlock::is_sql)
        .or_else(|| fenced_blocks(raw).next())
        .map(|block| block.contents)
        .unwrap_or(raw)
        .trim();

    let statement = match selected.split_once(';') {
        Some((head, _)) => head,
        None => selected,
    };

    statement.trim().to_string()
}
