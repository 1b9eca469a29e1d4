use gen_contract::{Intent, SamplingProfile};

const fn profile(
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    include_comments: bool,
    include_docstring: bool,
    include_type_hints: bool,
) -> SamplingProfile {
    SamplingProfile {
        temperature,
        top_p,
        max_tokens,
        include_comments,
        include_docstring,
        include_type_hints,
    }
}

const PROFILE_TABLE: [(Intent, SamplingProfile); 7] = [
    (Intent::Generate, profile(0.2, 0.95, 1024, true, true, true)),
    (Intent::Complete, profile(0.1, 0.9, 256, false, false, false)),
    (Intent::Explain, profile(0.5, 0.95, 1536, false, false, false)),
    (Intent::Fix, profile(0.1, 0.9, 1024, true, false, true)),
    (Intent::Optimize, profile(0.2, 0.9, 1024, true, false, true)),
    (Intent::Test, profile(0.2, 0.95, 1536, false, true, true)),
    (Intent::Document, profile(0.3, 0.95, 1024, true, true, true)),
];

/// Sampling profile for `intent`.
pub fn resolve_profile(intent: Intent) -> SamplingProfile {
    PROFILE_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == intent)
        .map(|(_, profile)| *profile)
        .unwrap_or(PROFILE_TABLE[0].1)
}

/// Sampling profile for an intent name; unknown names use the generate profile.
pub fn resolve_profile_by_name(name: &str) -> (Intent, SamplingProfile) {
    let intent = Intent::from_name(name);
    (intent, resolve_profile(intent))
}
