//! Feature providers and the scope-composed feature builder.
//!
//! Each provider declares the scopes it needs and only runs when the grant
//! covers all of them. A provider error drops that provider's features and
//! nothing else.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::warn;

use crate::scope::SignalCategory;
use crate::signals::RawSignals;

pub type FeatureMap = BTreeMap<String, f64>;

/// Substrings that mark an SMS as finance-related.
const FIN_KEYWORDS: [&str; 4] = ["loan", "repay", "pay", "debt"];

#[derive(Debug, Error)]
#[error("feature provider {provider} failed: {message}")]
pub struct FeatureError {
    pub provider: &'static str,
    pub message: String,
}

pub trait FeatureProvider: Send + Sync {
    fn name(&self) -> &'static str;
    /// Scopes that must all be granted before `compute` runs.
    fn required_scopes(&self) -> &'static [SignalCategory];
    fn compute(&self, raw: &RawSignals) -> Result<FeatureMap, FeatureError>;
}

fn ratio(matching: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matching as f64 / total as f64
    }
}

pub struct SmsFeatures;

impl FeatureProvider for SmsFeatures {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn required_scopes(&self) -> &'static [SignalCategory] {
        &[SignalCategory::Sms]
    }

    fn compute(&self, raw: &RawSignals) -> Result<FeatureMap, FeatureError> {
        let total = raw.sms.len();
        let fin = raw
            .sms
            .iter()
            .filter(|m| {
                let text = m.text.to_lowercase();
                FIN_KEYWORDS.iter().any(|k| text.contains(k))
            })
            .count();
        let mut out = FeatureMap::new();
        out.insert("sms_count".to_string(), total as f64);
        out.insert("sms_fin_ratio".to_string(), ratio(fin, total));
        Ok(out)
    }
}

pub struct ContactsFeatures;

impl FeatureProvider for ContactsFeatures {
    fn name(&self) -> &'static str {
        "contacts"
    }

    fn required_scopes(&self) -> &'static [SignalCategory] {
        &[SignalCategory::Contacts]
    }

    fn compute(&self, raw: &RawSignals) -> Result<FeatureMap, FeatureError> {
        let mut out = FeatureMap::new();
        out.insert("contacts_count".to_string(), raw.contacts.len() as f64);
        Ok(out)
    }
}

pub struct EmailFeatures;

impl FeatureProvider for EmailFeatures {
    fn name(&self) -> &'static str {
        "email"
    }

    fn required_scopes(&self) -> &'static [SignalCategory] {
        &[SignalCategory::Email]
    }

    fn compute(&self, raw: &RawSignals) -> Result<FeatureMap, FeatureError> {
        let total = raw.emails.len();
        let overdue = raw.emails.iter().filter(|e| e.overdue_notice).count();
        let mut out = FeatureMap::new();
        out.insert("email_overdue_ratio".to_string(), ratio(overdue, total));
        Ok(out)
    }
}

pub struct EcomFeatures;

impl FeatureProvider for EcomFeatures {
    fn name(&self) -> &'static str {
        "ecom"
    }

    fn required_scopes(&self) -> &'static [SignalCategory] {
        &[SignalCategory::Ecom]
    }

    fn compute(&self, raw: &RawSignals) -> Result<FeatureMap, FeatureError> {
        let total = raw.ecom.len();
        let fashion = raw
            .ecom
            .iter()
            .filter(|e| e.category.to_lowercase().contains("fashion"))
            .count();
        let mut out = FeatureMap::new();
        out.insert(
            "ecom_cat_fashion_ratio".to_string(),
            ratio(fashion, total),
        );
        Ok(out)
    }
}

pub struct WebFeatures;

impl FeatureProvider for WebFeatures {
    fn name(&self) -> &'static str {
        "web"
    }

    fn required_scopes(&self) -> &'static [SignalCategory] {
        &[SignalCategory::Web]
    }

    fn compute(&self, raw: &RawSignals) -> Result<FeatureMap, FeatureError> {
        let mut out = FeatureMap::new();
        out.insert("web_visits".to_string(), raw.web.len() as f64);
        Ok(out)
    }
}

/// Fixed registry of providers, applied in declaration order.
pub struct FeatureBuilder {
    providers: Vec<Box<dyn FeatureProvider>>,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureBuilder {
    pub fn new() -> Self {
        Self {
            providers: vec![
                Box::new(SmsFeatures),
                Box::new(ContactsFeatures),
                Box::new(EmailFeatures),
                Box::new(EcomFeatures),
                Box::new(WebFeatures),
            ],
        }
    }

    /// Run every provider whose required scopes are all granted and merge
    /// their features. Failing providers are skipped with a warning.
    pub fn build(&self, raw: &RawSignals, permitted: &BTreeSet<SignalCategory>) -> FeatureMap {
        let mut out = FeatureMap::new();
        for provider in &self.providers {
            if !provider
                .required_scopes()
                .iter()
                .all(|s| permitted.contains(s))
            {
                continue;
            }
            match provider.compute(raw) {
                Ok(part) => out.extend(part),
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "feature provider failed, skipping");
                }
            }
        }
        out
    }
}
