use std::sync::OnceLock;

use gen_contract::Intent;
use regex::Regex;

/// Longest prompt, in words, that still counts as a one-line output request.
const SIMPLE_OUTPUT_MAX_WORDS: usize = 8;

/// One rewrite rule; the first rule whose predicate matches wins.
struct OptimizeRule {
    name: &'static str,
    applies: fn(&str, Intent) -> bool,
    rewrite: fn(&str, Intent) -> String,
}

const RULES: &[OptimizeRule] = &[
    OptimizeRule {
        name: "single_output_statement",
        applies: is_simple_output_request,
        rewrite: single_output_statement,
    },
    OptimizeRule {
        name: "strip_filler",
        applies: mentions_variable_or_function,
        rewrite: strip_filler,
    },
];

fn output_verb_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)^\s*(print|output|display|show|echo|say)\b\s*(.*)$")
            .expect("output verb regex must compile")
    })
}

fn variable_or_function_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)\b(variables?|functions?)\b").expect("subject regex must compile")
    })
}

fn filler_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(
            r"(?i)\b(please|kindly|can you|could you|would you|i want you to|i would like you to|i want|i need|for me|just|simply|basically|actually)\b[,]?",
        )
        .expect("filler regex must compile")
    })
}

fn whitespace_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex must compile"))
}

fn is_simple_output_request(prompt: &str, intent: Intent) -> bool {
    matches!(intent, Intent::Generate | Intent::Complete)
        && prompt.split_whitespace().count() <= SIMPLE_OUTPUT_MAX_WORDS
        && !prompt.contains('\n')
        && output_verb_regex().is_match(prompt)
}

fn single_output_statement(prompt: &str, _intent: Intent) -> String {
    let subject = output_verb_regex()
        .captures(prompt)
        .and_then(|captures| captures.get(2))
        .map(|subject| subject.as_str().trim())
        .filter(|subject| !subject.is_empty())
        .unwrap_or(prompt.trim());
    format!(
        "Write a single print statement that outputs {subject}. \
         Respond with only that one line of code and nothing else."
    )
}

fn mentions_variable_or_function(prompt: &str, _intent: Intent) -> bool {
    variable_or_function_regex().is_match(prompt)
}

fn strip_filler(prompt: &str, _intent: Intent) -> String {
    let stripped = filler_regex().replace_all(prompt, " ");
    let collapsed = whitespace_regex().replace_all(stripped.trim(), " ");
    let collapsed = collapsed.trim().trim_start_matches([',', '.', ' ']);
    if collapsed.is_empty() {
        return prompt.trim().to_string();
    }
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn intent_template(prompt: &str, intent: Intent) -> String {
    let prompt = prompt.trim();
    match intent {
        Intent::Generate => format!("Write code for the following request:\n{prompt}"),
        Intent::Complete => format!("Complete the following code:\n{prompt}"),
        Intent::Explain => format!("Explain what the following code does:\n{prompt}"),
        Intent::Fix => format!("Find and fix the bugs in the following code:\n{prompt}"),
        Intent::Optimize => {
            format!("Optimize the following code for performance and readability:\n{prompt}")
        }
        Intent::Test => format!("Write unit tests for the following code:\n{prompt}"),
        Intent::Document => format!("Write documentation for the following code:\n{prompt}"),
    }
}

/// Rewrites a raw prompt before dispatch. Never fails; a prompt no rule
/// matches is wrapped in the intent's instruction template.
pub fn optimize_prompt(raw_prompt: &str, intent: Intent) -> String {
    for rule in RULES {
        if (rule.applies)(raw_prompt, intent) {
            tracing::debug!(rule = rule.name, intent = intent.as_str(), "prompt rewritten");
            return (rule.rewrite)(raw_prompt, intent);
        }
    }
    intent_template(raw_prompt, intent)
}
