use std::sync::{Arc, Mutex};
use std::time::Duration;

use gen_contract::{
    ExplanationDetail, PersonalizationProfile, RemoteSetting, SettingsSource, SharedClock,
    SkillLevel, TimedValue, DEFAULT_PROJECT_CONTEXT,
};

use crate::lock_unpoisoned;

/// How long a resolved profile is reused before settings are fetched again.
pub const PERSONALIZATION_TTL: Duration = Duration::from_secs(5 * 60);

const SKILL_LEVEL_KEYS: [&str; 3] = ["skill_level", "skillLevel", "user_skill_level"];
const EXPLANATION_KEYS: [&str; 4] = [
    "explanation_style",
    "explanationStyle",
    "explanation_detail",
    "explanationDetail",
];
const PROJECT_CONTEXT_KEYS: [&str; 2] = ["project_context", "projectContext"];

/// Locally configured personalization, used when remote settings are unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalPersonalization {
    pub skill_level: Option<String>,
    pub explanation_detail: Option<String>,
    pub project_context: Option<String>,
}

impl LocalPersonalization {
    /// Local values mapped onto the profile; anything unset or unrecognised
    /// keeps its built-in default.
    pub fn to_profile(&self) -> PersonalizationProfile {
        let defaults = PersonalizationProfile::default();
        PersonalizationProfile {
            skill_level: self
                .skill_level
                .as_deref()
                .and_then(SkillLevel::parse)
                .unwrap_or(defaults.skill_level),
            explanation_detail: self
                .explanation_detail
                .as_deref()
                .and_then(ExplanationDetail::parse)
                .unwrap_or(defaults.explanation_detail),
            project_context: self
                .project_context
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
                .unwrap_or(defaults.project_context),
        }
    }
}

fn setting_text<'a>(settings: &'a [RemoteSetting], keys: &[&str]) -> Option<&'a str> {
    settings
        .iter()
        .find(|setting| keys.contains(&setting.key.as_str()))
        .and_then(RemoteSetting::as_text)
}

/// Maps remote settings onto a profile.
///
/// A known key with an unrecognised value maps to the built-in default; a
/// key the remote does not send keeps the local fallback.
pub fn profile_from_settings(
    settings: &[RemoteSetting],
    local: &PersonalizationProfile,
) -> PersonalizationProfile {
    let skill_level = match setting_text(settings, &SKILL_LEVEL_KEYS) {
        Some(value) => SkillLevel::parse(value).unwrap_or_default(),
        None => local.skill_level,
    };
    let explanation_detail = match setting_text(settings, &EXPLANATION_KEYS) {
        Some(value) => ExplanationDetail::parse(value).unwrap_or_default(),
        None => local.explanation_detail,
    };
    let project_context = setting_text(settings, &PROJECT_CONTEXT_KEYS)
        .map(ToString::to_string)
        .unwrap_or_else(|| {
            if local.project_context.trim().is_empty() {
                DEFAULT_PROJECT_CONTEXT.to_string()
            } else {
                local.project_context.clone()
            }
        });

    PersonalizationProfile {
        skill_level,
        explanation_detail,
        project_context,
    }
}

/// Resolves the personalization profile, caching the result per instance.
pub struct PersonalizationResolver {
    source: Option<Arc<dyn SettingsSource>>,
    local: LocalPersonalization,
    clock: SharedClock,
    ttl: Duration,
    cache: Mutex<Option<TimedValue<PersonalizationProfile>>>,
}

impl PersonalizationResolver {
    pub fn new(
        source: Option<Arc<dyn SettingsSource>>,
        local: LocalPersonalization,
        clock: SharedClock,
    ) -> Self {
        Self {
            source,
            local,
            clock,
            ttl: PERSONALIZATION_TTL,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cached(&self) -> Option<PersonalizationProfile> {
        let now = self.clock.now();
        lock_unpoisoned(&self.cache)
            .as_ref()
            .and_then(|cached| cached.fresh(now, self.ttl))
            .cloned()
    }

    pub async fn resolve(&self) -> PersonalizationProfile {
        if let Some(profile) = self.cached() {
            return profile;
        }

        let local = self.local.to_profile();
        let profile = match &self.source {
            Some(source) => match source.fetch_settings().await {
                Ok(settings) => {
                    tracing::debug!(count = settings.len(), "personalization read from remote settings");
                    profile_from_settings(&settings, &local)
                }
                Err(error) => {
                    tracing::warn!(%error, "remote settings unavailable; using local personalization");
                    local
                }
            },
            None => local,
        };

        *lock_unpoisoned(&self.cache) = Some(TimedValue::new(profile.clone(), self.clock.now()));
        profile
    }
}

impl std::fmt::Debug for PersonalizationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonalizationResolver")
            .field("has_source", &self.source.is_some())
            .field("local", &self.local)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use gen_contract::{ExplanationDetail, PersonalizationProfile, RemoteSetting, SkillLevel};
    use serde_json::json;

    use super::{profile_from_settings, LocalPersonalization};

    fn setting(key: &str, value: serde_json::Value) -> RemoteSetting {
        RemoteSetting {
            key: key.to_string(),
            value,
            value_type: Some("string".to_string()),
        }
    }

    #[test]
    fn remote_keys_map_onto_profile() {
        let settings = vec![
            setting("skillLevel", json!("Expert")),
            setting("explanation_style", json!("concise")),
            setting("unknown_key", json!("ignored")),
        ];
        let profile = profile_from_settings(&settings, &PersonalizationProfile::default());
        assert_eq!(profile.skill_level, SkillLevel::Expert);
        assert_eq!(profile.explanation_detail, ExplanationDetail::Brief);
        assert_eq!(profile.project_context, "general purpose");
    }

    #[test]
    fn unknown_remote_values_map_to_defaults_not_local() {
        let local = LocalPersonalization {
            skill_level: Some("beginner".to_string()),
            ..LocalPersonalization::default()
        }
        .to_profile();
        let settings = vec![setting("skill_level", json!("wizard"))];

        let profile = profile_from_settings(&settings, &local);
        assert_eq!(profile.skill_level, SkillLevel::Intermediate);
    }

    #[test]
    fn missing_remote_keys_keep_local_values() {
        let local = LocalPersonalization {
            skill_level: Some("advanced".to_string()),
            explanation_detail: Some("educational".to_string()),
            project_context: Some("web backend".to_string()),
        }
        .to_profile();

        let profile = profile_from_settings(&[], &local);
        assert_eq!(profile, local);
    }

    #[test]
    fn local_values_fall_back_to_defaults() {
        let profile = LocalPersonalization {
            skill_level: Some("wizard".to_string()),
            explanation_detail: None,
            project_context: Some("   ".to_string()),
        }
        .to_profile();
        assert_eq!(profile, PersonalizationProfile::default());
    }
}
