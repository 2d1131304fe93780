//! Provider registry and selection.
//!
//! Selection order: the user's own key, then the configured default provider,
//! then the first enabled and keyed provider in registry order.

use std::collections::HashMap;

use serde::Serialize;

use super::LlmError;

text_enum! {
    ProviderKind {
        DeepSeek => "deepseek",
        Doubao => "doubao",
        Qwen => "qwen",
    }
}

pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    pub default_base_url: &'static str,
    pub default_model: &'static str,
    pub default_embedding_model: &'static str,
}

/// Static registry. Order is the fallback order.
pub const PROVIDERS: [ProviderSpec; 3] = [
    ProviderSpec {
        kind: ProviderKind::DeepSeek,
        display_name: "DeepSeek",
        default_base_url: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
        default_embedding_model: "deepseek-embedding",
    },
    ProviderSpec {
        kind: ProviderKind::Doubao,
        display_name: "Doubao",
        default_base_url: "https://ark.cn-beijing.volces.com/api/v3",
        default_model: "doubao-seed-1-6-lite-251015",
        default_embedding_model: "doubao-embedding-text-240715",
    },
    ProviderSpec {
        kind: ProviderKind::Qwen,
        display_name: "Qwen",
        default_base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        default_model: "qwen3-next-80b-a3b-instruct",
        default_embedding_model: "text-embedding-v3",
    },
];

impl ProviderKind {
    pub fn spec(self) -> &'static ProviderSpec {
        match self {
            ProviderKind::DeepSeek => &PROVIDERS[0],
            ProviderKind::Doubao => &PROVIDERS[1],
            ProviderKind::Qwen => &PROVIDERS[2],
        }
    }

    /// System-setting key for one field of this provider, e.g. `llm.qwen.api_key`.
    pub fn setting_key(self, field: &str) -> String {
        format!("llm.{}.{}", self.as_str(), field)
    }
}

/// Platform-level settings for one provider, with the API key already decrypted.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub embedding_model: Option<String>,
    pub enabled: bool,
}

impl ProviderSettings {
    /// Builds the settings for `kind` from a flat `key → plaintext value` map.
    pub fn from_map(kind: ProviderKind, values: &HashMap<String, String>) -> Self {
        let get = |field: &str| {
            values
                .get(&kind.setting_key(field))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            api_key: get("api_key"),
            base_url: get("base_url"),
            model_name: get("model_name"),
            embedding_model: get("embedding_model"),
            enabled: enabled_flag(get("enabled").as_deref()),
        }
    }

    fn is_keyed(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// A missing flag means enabled. Otherwise only `true` (any case) enables.
pub fn enabled_flag(raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(value) => value.trim().eq_ignore_ascii_case("true"),
    }
}

#[derive(Debug, Clone)]
pub struct UserProviderConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSource {
    User,
    Default,
    Fallback,
}

/// Everything needed to call one provider.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub kind: ProviderKind,
    pub source: ProviderSource,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
}

impl ResolvedProvider {
    pub fn chat_url(&self) -> String {
        endpoint_url(&self.base_url, "/chat/completions")
    }

    pub fn embeddings_url(&self) -> String {
        endpoint_url(&self.base_url, "/embeddings")
    }
}

/// Appends `suffix` unless the base already ends in an endpoint path.
pub fn endpoint_url(base_url: &str, suffix: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with(suffix) {
        return base.to_string();
    }
    let root = base
        .strip_suffix("/chat/completions")
        .or_else(|| base.strip_suffix("/embeddings"))
        .unwrap_or(base);
    format!("{root}{suffix}")
}

pub fn select_provider(
    user: Option<&UserProviderConfig>,
    default: ProviderKind,
    settings: &HashMap<ProviderKind, ProviderSettings>,
) -> Result<ResolvedProvider, LlmError> {
    let settings_for = |kind: ProviderKind| settings.get(&kind).cloned().unwrap_or(ProviderSettings {
        enabled: true,
        ..ProviderSettings::default()
    });

    if let Some(user) = user.filter(|u| !u.api_key.trim().is_empty()) {
        let platform = settings_for(user.provider);
        if platform.enabled {
            let spec = user.provider.spec();
            return Ok(ResolvedProvider {
                kind: user.provider,
                source: ProviderSource::User,
                api_key: user.api_key.trim().to_string(),
                base_url: user
                    .base_url
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .or(platform.base_url)
                    .unwrap_or_else(|| spec.default_base_url.to_string()),
                model: user
                    .model_name
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .or(platform.model_name)
                    .unwrap_or_else(|| spec.default_model.to_string()),
                embedding_model: platform
                    .embedding_model
                    .unwrap_or_else(|| spec.default_embedding_model.to_string()),
            });
        }
        tracing::debug!(
            "User provider {} is disabled by the platform, falling back",
            user.provider
        );
    }

    let candidates = std::iter::once((default, ProviderSource::Default)).chain(
        PROVIDERS
            .iter()
            .map(|p| p.kind)
            .filter(|kind| *kind != default)
            .map(|kind| (kind, ProviderSource::Fallback)),
    );

    for (kind, source) in candidates {
        let platform = settings_for(kind);
        if !platform.enabled || !platform.is_keyed() {
            continue;
        }
        let spec = kind.spec();
        return Ok(ResolvedProvider {
            kind,
            source,
            api_key: platform.api_key.unwrap_or_default(),
            base_url: platform
                .base_url
                .unwrap_or_else(|| spec.default_base_url.to_string()),
            model: platform
                .model_name
                .unwrap_or_else(|| spec.default_model.to_string()),
            embedding_model: platform
                .embedding_model
                .unwrap_or_else(|| spec.default_embedding_model.to_string()),
        });
    }

    Err(LlmError::NoProviderAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(key: &str) -> ProviderSettings {
        ProviderSettings {
            api_key: Some(key.to_string()),
            enabled: true,
            ..ProviderSettings::default()
        }
    }

    fn user(provider: ProviderKind, key: &str) -> UserProviderConfig {
        UserProviderConfig {
            provider,
            api_key: key.to_string(),
            base_url: None,
            model_name: Some("my-model".to_string()),
        }
    }

    #[test]
    fn user_key_wins_over_platform_default() {
        let settings = HashMap::from([(ProviderKind::DeepSeek, keyed("platform"))]);
        let resolved =
            select_provider(Some(&user(ProviderKind::Qwen, "mine")), ProviderKind::DeepSeek, &settings)
                .unwrap();
        assert_eq!(resolved.kind, ProviderKind::Qwen);
        assert_eq!(resolved.source, ProviderSource::User);
        assert_eq!(resolved.api_key, "mine");
        assert_eq!(resolved.model, "my-model");
        assert_eq!(
            resolved.chat_url(),
            "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
    }

    #[test]
    fn disabled_user_provider_falls_back_to_default() {
        let mut disabled = keyed("unused");
        disabled.enabled = false;
        let settings = HashMap::from([
            (ProviderKind::Qwen, disabled),
            (ProviderKind::DeepSeek, keyed("platform")),
        ]);
        let resolved =
            select_provider(Some(&user(ProviderKind::Qwen, "mine")), ProviderKind::DeepSeek, &settings)
                .unwrap();
        assert_eq!(resolved.kind, ProviderKind::DeepSeek);
        assert_eq!(resolved.source, ProviderSource::Default);
        assert_eq!(resolved.api_key, "platform");
    }

    #[test]
    fn blank_user_key_is_ignored() {
        let settings = HashMap::from([(ProviderKind::DeepSeek, keyed("platform"))]);
        let resolved =
            select_provider(Some(&user(ProviderKind::Qwen, "   ")), ProviderKind::DeepSeek, &settings)
                .unwrap();
        assert_eq!(resolved.source, ProviderSource::Default);
    }

    #[test]
    fn unkeyed_default_falls_through_registry_order() {
        let settings = HashMap::from([
            (ProviderKind::Doubao, keyed("doubao-key")),
            (ProviderKind::Qwen, keyed("qwen-key")),
        ]);
        let resolved = select_provider(None, ProviderKind::DeepSeek, &settings).unwrap();
        assert_eq!(resolved.kind, ProviderKind::Doubao);
        assert_eq!(resolved.source, ProviderSource::Fallback);
        assert_eq!(resolved.model, "doubao-seed-1-6-lite-251015");
    }

    #[test]
    fn default_provider_is_tried_before_registry_order() {
        let settings = HashMap::from([
            (ProviderKind::DeepSeek, keyed("ds")),
            (ProviderKind::Qwen, keyed("qw")),
        ]);
        let resolved = select_provider(None, ProviderKind::Qwen, &settings).unwrap();
        assert_eq!(resolved.kind, ProviderKind::Qwen);
        assert_eq!(resolved.source, ProviderSource::Default);
    }

    #[test]
    fn disabled_providers_are_skipped() {
        let mut off = keyed("ds");
        off.enabled = false;
        let settings = HashMap::from([
            (ProviderKind::DeepSeek, off),
            (ProviderKind::Qwen, keyed("qw")),
        ]);
        let resolved = select_provider(None, ProviderKind::DeepSeek, &settings).unwrap();
        assert_eq!(resolved.kind, ProviderKind::Qwen);
    }

    #[test]
    fn nothing_keyed_is_no_provider_available() {
        let err = select_provider(None, ProviderKind::DeepSeek, &HashMap::new()).unwrap_err();
        assert!(matches!(err, LlmError::NoProviderAvailable));
    }

    #[test]
    fn enabled_flag_defaults_to_true() {
        assert!(enabled_flag(None));
        assert!(enabled_flag(Some("TRUE")));
        assert!(!enabled_flag(Some("false")));
        assert!(!enabled_flag(Some("yes")));
    }

    #[test]
    fn settings_are_read_from_flat_keys() {
        let values = HashMap::from([
            ("llm.qwen.api_key".to_string(), "sk-1".to_string()),
            ("llm.qwen.enabled".to_string(), "False".to_string()),
            ("llm.qwen.model_name".to_string(), "  ".to_string()),
        ]);
        let settings = ProviderSettings::from_map(ProviderKind::Qwen, &values);
        assert_eq!(settings.api_key.as_deref(), Some("sk-1"));
        assert!(!settings.enabled);
        assert!(settings.model_name.is_none());
    }

    #[test]
    fn endpoint_url_does_not_double_append() {
        assert_eq!(
            endpoint_url("https://x/api/v3/chat/completions", "/chat/completions"),
            "https://x/api/v3/chat/completions"
        );
        assert_eq!(
            endpoint_url("https://x/api/v3/chat/completions", "/embeddings"),
            "https://x/api/v3/embeddings"
        );
        assert_eq!(
            endpoint_url("https://api.deepseek.com/v1/", "/chat/completions"),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }
}
