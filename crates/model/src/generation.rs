use serde::{Deserialize, Serialize};

/// Sampling controls applied to one request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Controls how creative the response is.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Top-k sampling parameter.
    pub top_k: u32,
    /// Upper bound of the response length, in tokens.
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    #[inline]
    fn default() -> Self {
        GenerationProfile::Default.config()
    }
}

/// A named bundle of [`GenerationConfig`] values.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProfile {
    /// Balanced answers for everyday chatting.
    #[default]
    Default,
    /// Looser sampling and longer answers.
    Creative,
    /// Focused, short answers.
    Precise,
}

impl GenerationProfile {
    /// Returns the sampling controls of this profile.
    pub fn config(self) -> GenerationConfig {
        match self {
            GenerationProfile::Default => GenerationConfig {
                temperature: 0.8,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            GenerationProfile::Creative => GenerationConfig {
                temperature: 0.9,
                top_p: 0.95,
                top_k: 50,
                max_output_tokens: 1500,
            },
            GenerationProfile::Precise => GenerationConfig {
                temperature: 0.3,
                top_p: 0.8,
                top_k: 30,
                max_output_tokens: 800,
            },
        }
    }

    /// Parses a profile name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Default, Self::Creative, Self::Precise]
            .into_iter()
            .find(|profile| profile.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Returns the name of this profile.
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            GenerationProfile::Default => "default",
            GenerationProfile::Creative => "creative",
            GenerationProfile::Precise => "precise",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names() {
        assert_eq!(
            GenerationProfile::from_name("Creative"),
            Some(GenerationProfile::Creative)
        );
        assert_eq!(
            GenerationProfile::from_name(" precise "),
            Some(GenerationProfile::Precise)
        );
        assert_eq!(GenerationProfile::from_name("wild"), None);
    }

    #[test]
    fn test_default_config() {
        let config = GenerationConfig::default();
        assert_eq!(config.top_k, 40);
        assert_eq!(config.max_output_tokens, 1024);
        assert!(
            GenerationProfile::Precise.config().temperature
                < config.temperature
        );
    }
}
