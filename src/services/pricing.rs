use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::booking::{round_cents, EXPLICIT_OPTIONAL_KEYS, NOT_SELECTED};
use crate::models::{Catalog, ServiceEntry};

pub const DEPOSIT_RATE: f64 = 0.10;

/// A customer's service selection.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub service_id: &'a str,
    pub hair_length: Option<&'a str>,
    pub options: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub base_price: f64,
    pub options_price: f64,
    pub total_price: f64,
    pub deposit_amount: f64,
    /// Required options without a valid selection.
    pub missing_required: Vec<String>,
}

impl Quote {
    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }

    pub fn deposit_cents(&self) -> i64 {
        (self.deposit_amount * 100.0).round() as i64
    }
}

/// Appointment length in hours; 0 means the selection is incomplete.
pub fn resolve_duration(catalog: &Catalog, selection: Selection) -> f64 {
    let Some(entry) = catalog.get(selection.service_id) else {
        return 0.0;
    };
    if let Some(fixed) = entry.fixed_duration {
        return fixed;
    }
    variant_value(entry, &entry.durations, selection.hair_length)
}

pub fn resolve_price(catalog: &Catalog, selection: Selection) -> Quote {
    let Some(entry) = catalog.get(selection.service_id) else {
        return Quote {
            base_price: 0.0,
            options_price: 0.0,
            total_price: 0.0,
            deposit_amount: 0.0,
            missing_required: vec![],
        };
    };

    let base_price = variant_value(entry, &entry.base_prices, selection.hair_length);
    let options_price: f64 = selection
        .options
        .iter()
        .filter_map(|(key, value)| entry.choice(key, value))
        .map(|choice| choice.price)
        .sum();
    let total_price = base_price + options_price;

    let mut missing_required = missing_required_options(entry, selection.options);
    if entry.has_variants() && base_price == 0.0 {
        missing_required.insert(0, "hairLength".to_string());
    }

    Quote {
        base_price,
        options_price,
        total_price,
        deposit_amount: deposit_for(total_price),
        missing_required,
    }
}

pub fn deposit_for(total_price: f64) -> f64 {
    round_cents(total_price * DEPOSIT_RATE)
}

/// Fills absent wash/detangle keys with an explicit `not-selected` value,
/// for services that offer them.
pub fn normalize_options(
    catalog: &Catalog,
    service_id: &str,
    options: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut normalized: BTreeMap<String, String> = options
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if let Some(entry) = catalog.get(service_id) {
        for key in EXPLICIT_OPTIONAL_KEYS {
            if entry.options.contains_key(key) {
                normalized
                    .entry(key.to_string())
                    .or_insert_with(|| NOT_SELECTED.to_string());
            }
        }
    }
    normalized
}

fn variant_value(entry: &ServiceEntry, values: &BTreeMap<String, f64>, variant: Option<&str>) -> f64 {
    if !entry.has_variants() {
        return values.values().next().copied().unwrap_or(0.0);
    }
    variant
        .and_then(|v| values.get(v))
        .copied()
        .unwrap_or(0.0)
}

fn missing_required_options(entry: &ServiceEntry, options: &BTreeMap<String, String>) -> Vec<String> {
    entry
        .options
        .iter()
        .filter(|(_, option)| option.required)
        .filter(|(_, option)| match &option.depends_on {
            Some(dep) => options.get(&dep.key) == Some(&dep.value),
            None => true,
        })
        .filter(|(key, _)| {
            options
                .get(*key)
                .map_or(true, |value| entry.choice(key, value).is_none())
        })
        .map(|(key, _)| key.clone())
        .collect()
}
