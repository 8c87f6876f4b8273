//! Pricing resolution for (provider, model) pairs
//!
//! An operator-supplied JSON override list is consulted first, then a
//! built-in ordered rule table whose last rule matches every model.
//! Nothing is cached: the override source is re-read on every call so
//! prices can change without a restart.

use super::types::{BillingProvider, ModelPricing, PricePerThousandTokens};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::warn;

/// Environment variable holding the override list by default
pub const DEFAULT_PRICING_OVERRIDE_ENV: &str = "AI_PRICING_JSON";

/// One entry of the override list
///
/// `provider` narrows the entry to one billing provider. `modelPattern` is a
/// case-insensitive regular expression; `model` is an exact case-insensitive
/// name. With neither, the entry matches every model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingOverride {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_pattern: Option<String>,
    pub input_per1k: f64,
    pub output_per1k: f64,
}

impl PricingOverride {
    fn matches(&self, provider: BillingProvider, model: &str) -> bool {
        if let Some(wanted) = self.provider.as_deref().filter(|p| !p.is_empty()) {
            if !wanted.eq_ignore_ascii_case(provider.as_str()) {
                return false;
            }
        }

        if let Some(pattern) = self.model_pattern.as_deref().filter(|p| !p.is_empty()) {
            return match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => re.is_match(model),
                Err(error) => {
                    warn!(pattern, %error, "Ignoring pricing override with invalid pattern");
                    false
                }
            };
        }

        match self.model.as_deref().filter(|m| !m.is_empty()) {
            Some(exact) => exact.eq_ignore_ascii_case(model),
            None => true,
        }
    }

    fn pricing(&self) -> ModelPricing {
        ModelPricing::new(
            PricePerThousandTokens::from_f64(self.input_per1k),
            PricePerThousandTokens::from_f64(self.output_per1k),
        )
    }
}

/// Where override entries come from
#[derive(Debug, Clone)]
pub enum OverrideSource {
    /// No overrides
    None,
    /// JSON read from this environment variable on every resolution
    Env(String),
    /// Fixed JSON text
    Static(String),
}

impl OverrideSource {
    fn load(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Env(var) => std::env::var(var).ok(),
            Self::Static(json) => Some(json.clone()),
        }
        .filter(|json| !json.trim().is_empty())
    }
}

struct PricingRule {
    provider: BillingProvider,
    pattern: Regex,
    input: &'static str,
    output: &'static str,
}

fn rule(provider: BillingProvider, pattern: &str, input: &'static str, output: &'static str) -> PricingRule {
    PricingRule {
        provider,
        pattern: RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("built-in pricing patterns are valid"),
        input,
        output,
    }
}

static BUILTIN_RULES: LazyLock<Vec<PricingRule>> = LazyLock::new(|| {
    vec![
        rule(BillingProvider::OpenAi, r"^gpt-4", "0.03", "0.06"),
        rule(BillingProvider::OpenAi, r"^gpt-3\.5", "0.0015", "0.002"),
        rule(BillingProvider::DeepSeek, r"^deepseek-chat", "0.001", "0.002"),
        rule(BillingProvider::DeepSeek, r"^deepseek-coder", "0.001", "0.002"),
        rule(BillingProvider::Gemini, r"^gemini-pro", "0.001", "0.002"),
        rule(BillingProvider::Other, r".*", "0.002", "0.004"),
    ]
});

impl PricingRule {
    fn applies(&self, provider: BillingProvider, model: &str) -> bool {
        (self.provider == provider || self.provider == BillingProvider::Other)
            && self.pattern.is_match(model)
    }

    fn pricing(&self) -> ModelPricing {
        let parse = |dollars| {
            PricePerThousandTokens::from_usd_dollars_per_1k(dollars)
                .unwrap_or_else(|_| PricePerThousandTokens::zero())
        };
        ModelPricing::new(parse(self.input), parse(self.output))
    }
}

/// Resolves per-1000-token prices
#[derive(Debug, Clone)]
pub struct PricingResolver {
    overrides: OverrideSource,
}

impl Default for PricingResolver {
    fn default() -> Self {
        Self::new(OverrideSource::Env(DEFAULT_PRICING_OVERRIDE_ENV.to_string()))
    }
}

impl PricingResolver {
    pub fn new(overrides: OverrideSource) -> Self {
        Self { overrides }
    }

    pub fn resolve(&self, provider: BillingProvider, model: &str) -> ModelPricing {
        if let Some(pricing) = self.resolve_override(provider, model) {
            return pricing;
        }

        BUILTIN_RULES
            .iter()
            .find(|rule| rule.applies(provider, model))
            .map(PricingRule::pricing)
            .unwrap_or_else(|| {
                // The last rule matches everything
                ModelPricing::new(PricePerThousandTokens::zero(), PricePerThousandTokens::zero())
            })
    }

    fn resolve_override(&self, provider: BillingProvider, model: &str) -> Option<ModelPricing> {
        let json = self.overrides.load()?;
        let entries: Vec<PricingOverride> = match serde_json::from_str(&json) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(%error, "Failed to parse pricing override list; using built-in prices");
                return None;
            }
        };

        entries
            .iter()
            .find(|entry| entry.matches(provider, model))
            .map(PricingOverride::pricing)
    }
}
