use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::sentinels::STOP_SENTINELS;

pub const SAFETY_NOTE: &str =
    "# Note: this code evaluates dynamic input with eval/exec; never pass it untrusted data.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeOptions {
    pub safety_notes: bool,
}

fn control_token_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"<\|[A-Za-z0-9_]+\|>").expect("control token regex must compile")
    })
}

fn def_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(")
            .expect("def regex must compile")
    })
}

fn main_guard_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r#"^if\s+__name__\s*==\s*['"]__main__['"]\s*:"#)
            .expect("main guard regex must compile")
    })
}

fn import_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^(?:import\s+\S|from\s+\S+\s+import\s+\S)").expect("import regex must compile")
    })
}

fn dynamic_eval_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"\b(?:eval|exec)\s*\(").expect("dynamic eval regex must compile")
    })
}

/// Cleans a raw buffer into the final artifact.
///
/// Passes run in a fixed order: control tokens, whole-artifact code fence,
/// duplicate blocks and imports, unterminated triple-quoted strings, blank
/// line runs, surrounding whitespace, then the optional safety note.
pub fn sanitize(raw: &str, options: SanitizeOptions) -> String {
    let text = strip_control_tokens(raw);
    let text = unwrap_code_fence(&text);
    let text = dedupe_blocks(&text);
    let text = balance_triple_quotes(&text);
    let text = collapse_blank_lines(&text);
    let text = text.trim().to_string();
    if options.safety_notes && dynamic_eval_regex().is_match(&text) {
        return format!("{SAFETY_NOTE}\n{text}");
    }
    text
}

/// `<s>` and `</s>` are also HTML, so they only count as sequence markers at
/// the edges of the artifact.
const SEQUENCE_START: &str = "<s>";
const SEQUENCE_END: &str = "</s>";

pub fn strip_control_tokens(text: &str) -> String {
    let text = text
        .trim_start()
        .strip_prefix(SEQUENCE_START)
        .unwrap_or(text);
    let text = text.trim_end().strip_suffix(SEQUENCE_END).unwrap_or(text);
    let mut out = control_token_regex().replace_all(text, "").into_owned();
    for sentinel in STOP_SENTINELS
        .iter()
        .filter(|sentinel| **sentinel != SEQUENCE_END)
    {
        if out.contains(sentinel) {
            out = out.replace(sentinel, "");
        }
    }
    out
}

/// Removes a markdown fence wrapping the whole artifact. A missing closing
/// fence is tolerated.
pub fn unwrap_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text.to_string();
    };
    let Some((info, body)) = rest.split_once('\n') else {
        return text.to_string();
    };
    if info.contains('`') || info.trim().contains(' ') {
        return text.to_string();
    }
    let body = body.trim_end();
    let body = match body.strip_suffix("```") {
        Some(inner) if !inner.contains("```") => inner,
        Some(_) => return text.to_string(),
        None if body.contains("```") => return text.to_string(),
        None => body,
    };
    body.trim_end().to_string()
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BlockKey {
    Def(String),
    MainGuard,
}

fn block_key(line: &str) -> Option<BlockKey> {
    if indentation(line) != 0 {
        return None;
    }
    if let Some(captures) = def_regex().captures(line) {
        return captures.get(1).map(|name| BlockKey::Def(name.as_str().to_string()));
    }
    main_guard_regex().is_match(line).then_some(BlockKey::MainGuard)
}

/// Exclusive end of the block opened at `start`: following lines that are
/// blank or indented deeper, without trailing blank lines.
fn block_end(lines: &[&str], start: usize) -> usize {
    let indent = indentation(lines[start]);
    let mut end = start + 1;
    let mut last_content = start;
    while end < lines.len() {
        let line = lines[end];
        if line.trim().is_empty() {
            end += 1;
            continue;
        }
        if indentation(line) <= indent {
            break;
        }
        last_content = end;
        end += 1;
    }
    last_content + 1
}

/// Drops repeated top-level `def` blocks, `__main__` guards and import lines.
/// The first occurrence wins.
pub fn dedupe_blocks(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut seen_blocks = HashSet::new();
    let mut seen_imports = HashSet::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        if let Some(key) = block_key(line) {
            let end = block_end(&lines, index);
            if seen_blocks.insert(key) {
                out.extend_from_slice(&lines[index..end]);
            } else {
                tracing::debug!(line, "dropping duplicate block");
            }
            index = end;
            continue;
        }
        if indentation(line) == 0 && import_regex().is_match(line) {
            if !seen_imports.insert(line.trim_end()) {
                index += 1;
                continue;
            }
        }
        out.push(line);
        index += 1;
    }

    out.join("\n")
}

/// Closes an unterminated `"""` or `'''` literal at the end of the text.
pub fn balance_triple_quotes(text: &str) -> String {
    let mut out = text.to_string();
    for delimiter in ["\"\"\"", "'''"] {
        if out.matches(delimiter).count() % 2 == 1 {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(delimiter);
        }
    }
    out
}

/// Collapses runs of blank lines into a single blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.split('\n') {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(if blank { "" } else { line.trim_end() });
        previous_blank = blank;
    }
    out.join("\n")
}
