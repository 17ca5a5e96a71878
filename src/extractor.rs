//! Isolating the program from a free-form model response.
//!
//! Extraction is an ordered decision table ([`RULES`]); the first rule that
//! yields a program wins:
//!
//! 1. exactly one fenced block: take it,
//! 2. several fenced blocks, some tagged `python`: the longest tagged one,
//! 3. several fenced blocks, none tagged `python`: the longest one,
//! 4. no fences at all and no prose: the whole response (low confidence).
//!
//! Nothing here executes or validates the code.

use crate::error::{LlmexecError, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Fence labels accepted as the target language.
const TARGET_TAGS: &[&str] = &["python", "python3", "py"];

static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(`{3,})\s*([^`\s]*)[^`]*$").expect("opening fence pattern is valid")
});

static TRIPLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)""".*?"""|'''.*?'''"#).expect("triple quote pattern is valid")
});

/// Double-quoted strings, and single-quoted strings whose opening quote
/// (after an optional `r`/`b`/`f`/`u` prefix) does not follow a word
/// character, so the apostrophes in "can't" and "it's" are not string quotes.
/// Group 1 keeps the character before the quote.
static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|(^|[^\w'])[rRbBfFuU]{0,2}'(?:[^'\\]|\\.)*'"#)
        .expect("string literal pattern is valid")
});

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z]{2,}[.!?]+(\s|$)").expect("sentence end pattern is valid")
});

/// Which row of the decision table produced a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    SingleBlock,
    TaggedBlock,
    LongestBlock,
    BareCode,
}

/// The program isolated from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedProgram {
    pub source: String,
    /// True when recovered from a fenced block (high confidence).
    pub fenced: bool,
    pub rule: ExtractionRule,
}

/// A fenced code block found in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    pub tag: Option<String>,
    pub content: String,
    /// False when the response ended before the closing fence.
    pub closed: bool,
}

impl FencedBlock {
    fn is_target_language(&self) -> bool {
        self.tag
            .as_deref()
            .is_some_and(|tag| TARGET_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag)))
    }

    fn len(&self) -> usize {
        self.content.trim().chars().count()
    }
}

/// Scan result shared by every rule.
#[derive(Debug)]
pub struct Candidates<'a> {
    pub response: &'a str,
    /// Blocks with non-blank content, in order of appearance.
    pub blocks: Vec<FencedBlock>,
    /// Whether any fence marker appeared, even around an empty block.
    pub saw_fence: bool,
}

pub type Rule = fn(&Candidates<'_>) -> Option<ExtractedProgram>;

/// The decision table, in priority order.
pub const RULES: &[(ExtractionRule, Rule)] = &[
    (ExtractionRule::SingleBlock, single_block),
    (ExtractionRule::TaggedBlock, tagged_block),
    (ExtractionRule::LongestBlock, longest_block),
    (ExtractionRule::BareCode, bare_code),
];

/// Extract the program from a model response.
///
/// # Errors
///
/// Returns [`LlmexecError::NoCodeFound`] when no rule yields non-blank text.
pub fn extract_program(response: &str) -> Result<ExtractedProgram> {
    let candidates = scan(response);
    debug!(
        "Found {} fenced block(s) in response ({} bytes)",
        candidates.blocks.len(),
        response.len()
    );

    for (rule, apply) in RULES {
        if let Some(program) = apply(&candidates) {
            if program.source.trim().is_empty() {
                continue;
            }
            debug!("Extracted {} bytes using rule {:?}", program.source.len(), rule);
            return Ok(program);
        }
    }

    Err(LlmexecError::NoCodeFound)
}

/// Find every triple-backtick fenced block.
///
/// A closing fence is a line of only backticks at least as long as the
/// opening run. An unterminated block runs to the end of the response.
pub fn scan(response: &str) -> Candidates<'_> {
    let mut blocks = Vec::new();
    let mut saw_fence = false;
    let mut lines = response.lines();

    while let Some(line) = lines.next() {
        let Some(caps) = OPENING_FENCE.captures(line) else {
            continue;
        };
        saw_fence = true;

        let indent = caps.get(1).map_or("", |m| m.as_str());
        let fence_len = caps.get(2).map_or(3, |m| m.as_str().len());
        let tag = caps
            .get(3)
            .map(|m| m.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let mut body: Vec<&str> = Vec::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            let trimmed = inner.trim();
            if trimmed.len() >= fence_len && trimmed.chars().all(|c| c == '`') {
                closed = true;
                break;
            }
            body.push(inner.strip_prefix(indent).unwrap_or(inner));
        }

        let content = body.join("\n");
        if !content.trim().is_empty() {
            blocks.push(FencedBlock { tag, content, closed });
        }
    }

    Candidates {
        response,
        blocks,
        saw_fence,
    }
}

fn program(block: &FencedBlock, rule: ExtractionRule) -> ExtractedProgram {
    if !block.closed {
        warn!(
            "Code block is missing its closing fence; using everything up to the end of the response"
        );
    }
    ExtractedProgram {
        source: block.content.clone(),
        fenced: true,
        rule,
    }
}

/// First block with the greatest length; ties keep the earlier block.
fn longest<'b>(blocks: impl Iterator<Item = &'b FencedBlock>) -> Option<&'b FencedBlock> {
    blocks.fold(None::<&'b FencedBlock>, |best, block| match best {
        Some(b) if b.len() >= block.len() => Some(b),
        _ => Some(block),
    })
}

fn single_block(c: &Candidates<'_>) -> Option<ExtractedProgram> {
    match c.blocks.as_slice() {
        [only] => Some(program(only, ExtractionRule::SingleBlock)),
        _ => None,
    }
}

fn tagged_block(c: &Candidates<'_>) -> Option<ExtractedProgram> {
    if c.blocks.len() < 2 {
        return None;
    }
    longest(c.blocks.iter().filter(|b| b.is_target_language()))
        .map(|b| program(b, ExtractionRule::TaggedBlock))
}

fn longest_block(c: &Candidates<'_>) -> Option<ExtractedProgram> {
    if c.blocks.len() < 2 {
        return None;
    }
    longest(c.blocks.iter()).map(|b| program(b, ExtractionRule::LongestBlock))
}

fn bare_code(c: &Candidates<'_>) -> Option<ExtractedProgram> {
    if c.saw_fence || looks_like_prose(c.response) {
        return None;
    }
    let source = c
        .response
        .trim_start_matches(['\n', '\r'])
        .trim_end()
        .to_string();
    Some(ExtractedProgram {
        source,
        fenced: false,
        rule: ExtractionRule::BareCode,
    })
}

/// True when a sentence ends outside of string literals and comments.
pub fn looks_like_prose(text: &str) -> bool {
    let without_docstrings = TRIPLE_QUOTED.replace_all(text, "\"\"");

    without_docstrings.lines().any(|line| {
        let code = STRING_LITERAL.replace_all(line, "${1}\"\"");
        let code = match code.find('#') {
            Some(comment) => &code[..comment],
            None => &code[..],
        };
        SENTENCE_END.is_match(code)
    })
}
