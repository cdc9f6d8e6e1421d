use std::collections::BTreeMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};

static EMBEDDED_CATALOG: &str = include_str!("../../catalog.json");

/// Immutable service catalog, loaded once at startup and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub services: BTreeMap<String, ServiceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub name: String,
    pub base_prices: BTreeMap<String, f64>,
    pub durations: BTreeMap<String, f64>,
    #[serde(default)]
    pub length_options: Vec<String>,
    /// Pins the duration regardless of variant or options.
    #[serde(default)]
    pub fixed_duration: Option<f64>,
    #[serde(default)]
    pub options: BTreeMap<String, OptionSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub depends_on: Option<OptionDependency>,
    pub choices: Vec<OptionChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDependency {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChoice {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub price: f64,
}

impl Catalog {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let catalog: Catalog = serde_json::from_str(s).context("failed to parse catalog")?;
        for (id, entry) in &catalog.services {
            entry
                .validate()
                .with_context(|| format!("invalid catalog entry: {id}"))?;
        }
        Ok(catalog)
    }

    pub fn embedded() -> anyhow::Result<Self> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read catalog file: {path}"))?;
                Self::from_json(&raw)
            }
            None => Self::embedded(),
        }
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceEntry> {
        self.services.get(service_id)
    }
}

impl ServiceEntry {
    /// Services with zero or one length option use their sole price/duration.
    pub fn has_variants(&self) -> bool {
        self.length_options.len() > 1
    }

    pub fn choice(&self, option_key: &str, value: &str) -> Option<&OptionChoice> {
        self.options
            .get(option_key)?
            .choices
            .iter()
            .find(|c| c.value == value)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.base_prices.is_empty() || self.durations.is_empty() {
            anyhow::bail!("missing base price or duration");
        }
        if self.durations.values().any(|d| !(d.is_finite() && *d > 0.0)) {
            anyhow::bail!("durations must be positive");
        }
        if self.fixed_duration.is_some_and(|d| !(d.is_finite() && d > 0.0)) {
            anyhow::bail!("fixed duration must be positive");
        }
        if self.has_variants() {
            for variant in &self.length_options {
                if !self.base_prices.contains_key(variant) || !self.durations.contains_key(variant)
                {
                    anyhow::bail!("length option without price or duration: {variant}");
                }
            }
        }
        for (key, option) in &self.options {
            if option.choices.is_empty() {
                anyhow::bail!("option without choices: {key}");
            }
            if let Some(dep) = &option.depends_on {
                if !self.options.contains_key(&dep.key) {
                    anyhow::bail!("option {key} depends on unknown option {}", dep.key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_parses() {
        let catalog = Catalog::embedded().unwrap();
        let cornrows = catalog.get("cornrows").unwrap();
        assert_eq!(cornrows.fixed_duration, Some(1.0));
        let box_braids = catalog.get("box-braids").unwrap();
        assert!(box_braids.has_variants());
        assert_eq!(box_braids.base_prices["midback"], 250.0);
        assert_eq!(box_braids.choice("style-variation", "knotless").unwrap().price, 30.0);
    }

    #[test]
    fn test_rejects_variant_without_price() {
        let json = r#"{"services":{"x":{"name":"X","basePrices":{"short":10},"durations":{"short":1,"long":2},"lengthOptions":["short","long"]}}}"#;
        assert!(Catalog::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let json = r#"{"services":{"x":{"name":"X","basePrices":{"standard":10},"durations":{"standard":0}}}}"#;
        assert!(Catalog::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(Catalog::from_json("not json").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Catalog::load(Some("/nonexistent/catalog.json")).is_err());
    }
}
