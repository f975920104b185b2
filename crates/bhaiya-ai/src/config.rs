use std::env;
use std::path::PathBuf;

use bhaiya_model::GenerationProfile;

const DATA_DIR_NAME: &str = ".bhaiya-ai";

/// Settings read from the environment at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub data_dir: PathBuf,
    pub profile: GenerationProfile,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = var("BHAIYA_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| {
                var("HOME").map(|home| PathBuf::from(home).join(DATA_DIR_NAME))
            })
            .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME));
        let profile = match var("BHAIYA_PROFILE") {
            Some(name) => {
                GenerationProfile::from_name(&name).unwrap_or_else(|| {
                    warn!("unknown profile {name:?}, using the default one");
                    GenerationProfile::Default
                })
            }
            None => GenerationProfile::Default,
        };

        Self {
            api_key: var("GEMINI_API_KEY"),
            model: var("GEMINI_MODEL"),
            base_url: var("GEMINI_BASE_URL"),
            data_dir,
            profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.api_key, None);
        assert_eq!(config.model, None);
        assert_eq!(config.data_dir, PathBuf::from(".bhaiya-ai"));
        assert_eq!(config.profile, GenerationProfile::Default);

        let config =
            config_from(&[("HOME", "/home/dev"), ("GEMINI_API_KEY", " ")]);
        assert_eq!(config.api_key, None);
        assert_eq!(config.data_dir, PathBuf::from("/home/dev/.bhaiya-ai"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HOME", "/home/dev"),
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_MODEL", "gemini-1.5-flash"),
            ("BHAIYA_DATA_DIR", "/tmp/chats"),
            ("BHAIYA_PROFILE", "Creative"),
        ]);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.model.as_deref(), Some("gemini-1.5-flash"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/chats"));
        assert_eq!(config.profile, GenerationProfile::Creative);

        let config = config_from(&[("BHAIYA_PROFILE", "wild")]);
        assert_eq!(config.profile, GenerationProfile::Default);
    }
}
