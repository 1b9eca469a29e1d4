//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use gen_api::GenApiConfig;
use request_profile::{LocalPersonalization, ResolverConfig};
use stream_assembler::{AssemblerConfig, EarlyTerminationPolicy};

use history_store::HistoryConfig;

pub const LOG_ENV_VAR: &str = "CODEGEN_LOG";

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub history_dir: Option<PathBuf>,
    pub history_capacity: Option<usize>,
    pub skill_level: Option<String>,
    pub explanation_detail: Option<String>,
    pub project_context: Option<String>,
    pub disable_early_termination: bool,
    pub safety_notes: bool,
    pub timeout_secs: Option<u64>,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_string_opt("CODEGEN_BASE_URL"),
            access_token: env_string_opt("CODEGEN_ACCESS_TOKEN"),
            history_dir: env_string_opt("CODEGEN_HISTORY_DIR").map(PathBuf::from),
            history_capacity: env_parse_opt("CODEGEN_HISTORY_CAPACITY"),
            skill_level: env_string_opt("CODEGEN_SKILL_LEVEL"),
            explanation_detail: env_string_opt("CODEGEN_EXPLANATION_DETAIL"),
            project_context: env_string_opt("CODEGEN_PROJECT_CONTEXT"),
            disable_early_termination: env_flag("CODEGEN_DISABLE_EARLY_TERMINATION"),
            safety_notes: env_flag("CODEGEN_SAFETY_NOTES"),
            timeout_secs: env_parse_opt("CODEGEN_TIMEOUT_SECS"),
            log_filter: env_string_opt(LOG_ENV_VAR),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn api_config(&self) -> GenApiConfig {
        let mut config = match &self.base_url {
            Some(base_url) => GenApiConfig::new(base_url.clone()),
            None => GenApiConfig::default(),
        };
        if let Some(token) = &self.access_token {
            config = config.with_access_token(token.clone());
        }
        if let Some(seconds) = self.timeout_secs.filter(|seconds| *seconds > 0) {
            config = config.with_request_timeout(Duration::from_secs(seconds));
        }
        config
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        let policy = if self.disable_early_termination {
            EarlyTerminationPolicy::disabled()
        } else {
            EarlyTerminationPolicy::default()
        };
        AssemblerConfig::default()
            .with_early_termination(policy)
            .with_safety_notes(self.safety_notes)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default().with_local(LocalPersonalization {
            skill_level: self.skill_level.clone(),
            explanation_detail: self.explanation_detail.clone(),
            project_context: self.project_context.clone(),
        })
    }

    pub fn history_config(&self) -> HistoryConfig {
        match self.history_capacity {
            Some(capacity) => HistoryConfig::default().with_capacity(capacity),
            None => HistoryConfig::default(),
        }
    }

    /// Directory holding `.codegen/history.json`: the configured directory,
    /// else `$HOME`, else the working directory.
    pub fn history_root(&self) -> PathBuf {
        self.history_dir
            .clone()
            .or_else(|| env::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_parse_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = env_string_opt(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring unparseable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EnvConfig;
    use std::env;
    use std::path::Path;
    use std::sync::{Mutex, OnceLock};

    const KEYS: [&str; 11] = [
        "CODEGEN_BASE_URL",
        "CODEGEN_ACCESS_TOKEN",
        "CODEGEN_HISTORY_DIR",
        "CODEGEN_HISTORY_CAPACITY",
        "CODEGEN_SKILL_LEVEL",
        "CODEGEN_EXPLANATION_DETAIL",
        "CODEGEN_PROJECT_CONTEXT",
        "CODEGEN_DISABLE_EARLY_TERMINATION",
        "CODEGEN_SAFETY_NOTES",
        "CODEGEN_TIMEOUT_SECS",
        "CODEGEN_LOG",
    ];

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_all() -> Vec<EnvGuard> {
        KEYS.iter().map(|key| set_env_guard(key, None)).collect()
    }

    #[test]
    fn env_defaults_are_unset() {
        let _lock = env_lock();
        let _guards = clear_all();

        let config = EnvConfig::from_env();
        assert!(config.base_url.is_none());
        assert!(!config.has_credential());
        assert!(config.history_capacity.is_none());
        assert!(!config.disable_early_termination);
        assert!(!config.safety_notes);
        assert!(config.log_filter.is_none());
        assert_eq!(config.history_config().capacity, 50);
        assert!(config.assembler_config().early_termination.enabled);
    }

    #[test]
    fn env_values_are_read_and_mapped() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("CODEGEN_BASE_URL", Some("http://localhost:8000/api"));
        let _g2 = set_env_guard("CODEGEN_ACCESS_TOKEN", Some("secret"));
        let _g3 = set_env_guard("CODEGEN_HISTORY_DIR", Some("/tmp/codegen-home"));
        let _g4 = set_env_guard("CODEGEN_HISTORY_CAPACITY", Some("10"));
        let _g5 = set_env_guard("CODEGEN_DISABLE_EARLY_TERMINATION", Some("1"));
        let _g6 = set_env_guard("CODEGEN_SAFETY_NOTES", Some("1"));
        let _g7 = set_env_guard("CODEGEN_SKILL_LEVEL", Some("beginner"));
        let _g8 = set_env_guard("CODEGEN_LOG", Some("debug"));

        let config = EnvConfig::from_env();
        assert!(config.has_credential());
        assert_eq!(config.api_config().base_url, "http://localhost:8000/api");
        assert_eq!(config.history_root(), Path::new("/tmp/codegen-home"));
        assert_eq!(config.history_config().capacity, 10);
        assert!(!config.assembler_config().early_termination.enabled);
        assert!(config.assembler_config().sanitize.safety_notes);
        assert_eq!(
            config.resolver_config().local.skill_level.as_deref(),
            Some("beginner")
        );
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn unparseable_numbers_and_blank_values_are_ignored() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("CODEGEN_HISTORY_CAPACITY", Some("lots"));
        let _g2 = set_env_guard("CODEGEN_ACCESS_TOKEN", Some("  "));

        let config = EnvConfig::from_env();
        assert!(config.history_capacity.is_none());
        assert!(!config.has_credential());
    }
}
