/// Stop sentinels in evaluation order. When two sentinels match at the same
/// position the earlier entry wins.
pub const STOP_SENTINELS: &[&str] = &[
    "<|endoftext|>",
    "<|im_end|>",
    "<|eot_id|>",
    "<|end|>",
    "<|EOT|>",
    "</s>",
    "[END]",
];

fn longest_sentinel() -> usize {
    STOP_SENTINELS
        .iter()
        .map(|sentinel| sentinel.len())
        .max()
        .unwrap_or(0)
}

/// Where a stop sentinel was found relative to the buffered and incoming text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopMatch {
    pub sentinel: &'static str,
    /// Bytes of the existing raw buffer to keep.
    pub raw_keep: usize,
    /// Bytes of the incoming text to append.
    pub text_keep: usize,
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Searches `text` for a stop sentinel, including one that started at the
/// end of `raw` and finishes in `text`.
pub fn find_stop(raw: &str, text: &str) -> Option<StopMatch> {
    let window = longest_sentinel().saturating_sub(1).min(raw.len());
    let tail_start = raw.len() - window;
    let tail_start = if raw.is_char_boundary(tail_start) {
        tail_start
    } else {
        // Widen to the previous boundary; the tail only needs to be long enough.
        floor_char_boundary(raw, tail_start)
    };
    let tail = &raw[tail_start..];

    let mut combined = String::with_capacity(tail.len() + text.len());
    combined.push_str(tail);
    combined.push_str(text);

    let (position, sentinel) = STOP_SENTINELS
        .iter()
        .filter_map(|sentinel| combined.find(sentinel).map(|position| (position, *sentinel)))
        .min_by_key(|(position, _)| *position)?;

    // A match that ends inside the tail was already in `raw`; never expected,
    // but treat it like a straddle.
    if position < tail.len() {
        Some(StopMatch {
            sentinel,
            raw_keep: tail_start + position,
            text_keep: 0,
        })
    } else {
        Some(StopMatch {
            sentinel,
            raw_keep: raw.len(),
            text_keep: position - tail.len(),
        })
    }
}

/// Length in bytes of the longest suffix of `text` that could be the start
/// of a stop sentinel.
pub fn partial_sentinel_suffix(text: &str) -> usize {
    STOP_SENTINELS
        .iter()
        .flat_map(|sentinel| {
            let sentinel: &'static str = sentinel;
            (1..sentinel.len()).map(move |len| &sentinel[..len])
        })
        .filter(|prefix| text.ends_with(prefix))
        .map(str::len)
        .max()
        .unwrap_or(0)
}
