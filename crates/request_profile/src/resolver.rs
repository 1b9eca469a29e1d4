use std::sync::Arc;
use std::time::Duration;

use gen_contract::{
    GenerationRequest, Intent, PersonalizationProfile, SamplingProfile, SettingsSource,
    SharedClock,
};

use crate::optimizer::optimize_prompt;
use crate::personalization::{LocalPersonalization, PersonalizationResolver, PERSONALIZATION_TTL};
use crate::profiles::resolve_profile;
use crate::validation::{validate_prompt, PromptValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub local: LocalPersonalization,
    pub personalization_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            local: LocalPersonalization::default(),
            personalization_ttl: PERSONALIZATION_TTL,
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub fn with_local(mut self, local: LocalPersonalization) -> Self {
        self.local = local;
        self
    }

    #[must_use]
    pub fn with_personalization_ttl(mut self, ttl: Duration) -> Self {
        self.personalization_ttl = ttl;
        self
    }
}

/// Builds generation requests from raw prompts.
#[derive(Debug)]
pub struct RequestProfileResolver {
    personalization: PersonalizationResolver,
}

impl RequestProfileResolver {
    pub fn new(
        config: ResolverConfig,
        settings: Option<Arc<dyn SettingsSource>>,
        clock: SharedClock,
    ) -> Self {
        let personalization = PersonalizationResolver::new(settings, config.local, clock)
            .with_ttl(config.personalization_ttl);
        Self { personalization }
    }

    pub fn resolve_profile(&self, intent: Intent) -> SamplingProfile {
        resolve_profile(intent)
    }

    pub fn optimize_prompt(&self, raw_prompt: &str, intent: Intent) -> String {
        optimize_prompt(raw_prompt, intent)
    }

    pub async fn resolve_personalization(&self) -> PersonalizationProfile {
        self.personalization.resolve().await
    }

    /// Validates and optimizes `raw_prompt`, then attaches the intent's
    /// sampling profile and the current personalization.
    pub async fn build_request(
        &self,
        raw_prompt: &str,
        context: Option<&str>,
        intent: Intent,
    ) -> Result<GenerationRequest, PromptValidationError> {
        let prompt = validate_prompt(raw_prompt)?;
        let optimized = self.optimize_prompt(prompt, intent);
        self.assemble(optimized, context, intent).await
    }

    /// Like [`Self::build_request`] but sends the prompt verbatim.
    pub async fn build_verbatim_request(
        &self,
        prompt: &str,
        context: Option<&str>,
        intent: Intent,
    ) -> Result<GenerationRequest, PromptValidationError> {
        let prompt = validate_prompt(prompt)?.to_string();
        self.assemble(prompt, context, intent).await
    }

    async fn assemble(
        &self,
        prompt: String,
        context: Option<&str>,
        intent: Intent,
    ) -> Result<GenerationRequest, PromptValidationError> {
        let personalization = self.resolve_personalization().await;
        Ok(GenerationRequest {
            prompt,
            context: context
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string),
            intent,
            sampling: self.resolve_profile(intent),
            personalization,
        })
    }
}
