use std::sync::OnceLock;

use regex::Regex;

/// Prompts at or under this length are treated as simple requests.
pub const SIMPLE_PROMPT_MAX_CHARS: usize = 40;
pub const EXCESSIVE_CONTENT_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptClass {
    Simple,
    Elaborate,
}

/// Controls when a stream for a simple prompt may end before the backend
/// finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyTerminationPolicy {
    pub enabled: bool,
    /// Raw buffer size, in characters, past which elaborate output is trimmed.
    pub excessive_content_limit: usize,
    /// When false, oversized elaborate output is left alone.
    pub trim_excessive: bool,
}

impl Default for EarlyTerminationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            excessive_content_limit: EXCESSIVE_CONTENT_LIMIT,
            trim_excessive: true,
        }
    }
}

impl EarlyTerminationPolicy {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Raw buffer replacement chosen by an early-termination rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub rule: &'static str,
    pub keep: String,
}

struct TerminationRule {
    name: &'static str,
    check: fn(&str, &EarlyTerminationPolicy) -> Option<String>,
}

const RULES: &[TerminationRule] = &[
    TerminationRule {
        name: "completed_output_statement",
        check: completed_output_statement,
    },
    TerminationRule {
        name: "completed_simple_assignment",
        check: completed_simple_assignment,
    },
    TerminationRule {
        name: "excessive_content",
        check: excessive_content,
    },
];

fn output_keyword_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)\b(print|output|display|show|echo|say|log)\b")
            .expect("output keyword regex must compile")
    })
}

fn output_call_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^\s*(print|println!|console\.log|System\.out\.println|puts|echo|fmt\.Println)\s*\(")
            .expect("output call regex must compile")
    })
}

fn assignment_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^\s*(?:let |const |var )?[A-Za-z_][A-Za-z0-9_]*\s*(?::\s*[A-Za-z_][\w\[\], ]*)?=[^=].*$")
            .expect("assignment regex must compile")
    })
}

fn prose_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^[A-Z][a-z']*(?: [^=(){}\[\]]*)?[.:!]$").expect("prose regex must compile")
    })
}

/// Short prompts and prompts asking for output are simple.
pub fn classify_prompt(prompt: &str) -> PromptClass {
    let prompt = prompt.trim();
    if prompt.chars().count() <= SIMPLE_PROMPT_MAX_CHARS || output_keyword_regex().is_match(prompt)
    {
        PromptClass::Simple
    } else {
        PromptClass::Elaborate
    }
}

/// Evaluates the rule table against the raw buffer. The first rule that
/// fires decides the new buffer content.
pub fn check_early_termination(
    raw: &str,
    policy: &EarlyTerminationPolicy,
) -> Option<Termination> {
    if !policy.enabled {
        return None;
    }
    RULES.iter().find_map(|rule| {
        (rule.check)(raw, policy).map(|keep| Termination {
            rule: rule.name,
            keep,
        })
    })
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

pub(crate) fn is_prose(line: &str) -> bool {
    prose_regex().is_match(line.trim())
}

fn is_elaborate_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.contains("\"\"\"")
        || trimmed.contains("'''")
        || trimmed.starts_with("def ")
        || trimmed.starts_with("class ")
        || is_prose(line)
}

/// Parentheses balance outside string literals; `None` when a literal is
/// still open.
fn paren_depth(line: &str) -> Option<i32> {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in line.chars() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    quote.is_none().then_some(depth)
}

fn is_complete_output_call(line: &str) -> bool {
    let trimmed = line.trim_end().trim_end_matches(';');
    output_call_regex().is_match(trimmed)
        && trimmed.ends_with(')')
        && paren_depth(trimmed) == Some(0)
}

fn is_simple_assignment(line: &str) -> bool {
    let trimmed = line.trim_end().trim_end_matches(';');
    assignment_regex().is_match(trimmed)
        && !trimmed.trim_end().ends_with(['(', '[', '{', ',', '\\', '+'])
        && paren_depth(trimmed) == Some(0)
}

/// Code lines of `raw`, skipping leading prose and fences.
fn code_lines(raw: &str) -> Vec<&str> {
    raw.split('\n')
        .filter(|line| !line.trim().is_empty() && !is_fence(line) && !is_prose(line))
        .collect()
}

fn is_indented(line: &str) -> bool {
    line.starts_with([' ', '\t'])
}

fn opens_block(line: &str) -> bool {
    line.trim_end().ends_with([':', '{'])
}

/// Only a top-level output call ends the stream; one inside a block waits
/// for the rest of the body.
fn completed_output_statement(raw: &str, _policy: &EarlyTerminationPolicy) -> Option<String> {
    let lines = code_lines(raw);
    let end = lines.iter().position(|line| is_complete_output_call(line))?;
    if lines[..=end]
        .iter()
        .any(|line| is_indented(line) || opens_block(line))
    {
        return None;
    }
    let kept: Vec<&str> = lines[..=end]
        .iter()
        .map(|line| line.trim_end())
        .collect();
    Some(kept.join("\n"))
}

/// An assignment counts as complete once a blank line or an elaborate marker
/// follows it.
fn completed_simple_assignment(raw: &str, _policy: &EarlyTerminationPolicy) -> Option<String> {
    let lines: Vec<&str> = raw
        .split('\n')
        .skip_while(|line| line.trim().is_empty() || is_fence(line) || is_prose(line))
        .collect();
    let first = lines.first()?;
    if !is_simple_assignment(first) || lines.len() < 2 {
        return None;
    }
    let following = lines[1];
    let terminated = following.trim().is_empty() && lines.len() > 2
        || is_fence(following)
        || is_elaborate_marker(following);
    terminated.then(|| first.trim_end().to_string())
}

fn excessive_content(raw: &str, policy: &EarlyTerminationPolicy) -> Option<String> {
    if !policy.trim_excessive || raw.chars().count() <= policy.excessive_content_limit {
        return None;
    }
    let lines: Vec<&str> = raw.split('\n').collect();
    if !lines.iter().any(|line| is_elaborate_marker(line)) {
        return None;
    }
    lines
        .iter()
        .find(|line| {
            !is_indented(line) && (is_complete_output_call(line) || is_simple_assignment(line))
        })
        .map(|line| line.trim().to_string())
}
