//! Scope parsing and the fail-closed gate in front of feature extraction.
//!
//! Size limits are checked before scope membership so an oversized request is
//! reported as oversized even when it is also out of scope.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signals::RawSignals;

/// Closed set of signal categories the gate understands. Unknown scope tags
/// never grant anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalCategory {
    Sms,
    Contacts,
    Email,
    Ecom,
    Web,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 5] = [
        SignalCategory::Sms,
        SignalCategory::Contacts,
        SignalCategory::Email,
        SignalCategory::Ecom,
        SignalCategory::Web,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::Sms => "sms",
            SignalCategory::Contacts => "contacts",
            SignalCategory::Email => "email",
            SignalCategory::Ecom => "ecom",
            SignalCategory::Web => "web",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "sms" => Some(SignalCategory::Sms),
            "contacts" => Some(SignalCategory::Contacts),
            "email" => Some(SignalCategory::Email),
            "ecom" => Some(SignalCategory::Ecom),
            "web" => Some(SignalCategory::Web),
            _ => None,
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a comma-separated scope string into categories. Blank fragments and
/// unknown tags are dropped, so a malformed scope shrinks instead of growing.
pub fn parse_scope(scope: &str) -> BTreeSet<SignalCategory> {
    scope
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(SignalCategory::parse)
        .collect()
}

/// Categories with at least one element in the raw payload.
pub fn present_categories(raw: &RawSignals) -> BTreeSet<SignalCategory> {
    SignalCategory::ALL
        .iter()
        .copied()
        .filter(|c| category_len(raw, *c) > 0)
        .collect()
}

/// Element count of one category's list.
pub fn category_len(raw: &RawSignals, category: SignalCategory) -> usize {
    match category {
        SignalCategory::Sms => raw.sms.len(),
        SignalCategory::Contacts => raw.contacts.len(),
        SignalCategory::Email => raw.emails.len(),
        SignalCategory::Ecom => raw.ecom.len(),
        SignalCategory::Web => raw.web.len(),
    }
}

/// Per-category element caps for inbound raw payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    pub sms: usize,
    pub contacts: usize,
    pub emails: usize,
    pub ecom: usize,
    pub web: usize,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            sms: 2000,
            contacts: 5000,
            emails: 2000,
            ecom: 5000,
            web: 5000,
        }
    }
}

impl SizeLimits {
    pub fn max(&self, category: SignalCategory) -> usize {
        match category {
            SignalCategory::Sms => self.sms,
            SignalCategory::Contacts => self.contacts,
            SignalCategory::Email => self.emails,
            SignalCategory::Ecom => self.ecom,
            SignalCategory::Web => self.web,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("{category} list too large: {count} elements (max {max})")]
    PayloadTooLarge {
        category: SignalCategory,
        count: usize,
        max: usize,
    },
    #[error(
        "raw signals outside granted scope: {} (allowed: {})",
        format_categories(.disallowed),
        format_categories(.permitted)
    )]
    ScopeViolation {
        disallowed: BTreeSet<SignalCategory>,
        permitted: BTreeSet<SignalCategory>,
    },
}

pub(crate) fn format_categories(set: &BTreeSet<SignalCategory>) -> String {
    if set.is_empty() {
        return "none".to_string();
    }
    set.iter()
        .map(SignalCategory::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Admit a raw payload only when every list fits its cap and every non-empty
/// category is covered by the permitted scope.
pub fn enforce(
    raw: &RawSignals,
    permitted: &BTreeSet<SignalCategory>,
    limits: &SizeLimits,
) -> Result<(), GateError> {
    for category in SignalCategory::ALL {
        let count = category_len(raw, category);
        let max = limits.max(category);
        if count > max {
            return Err(GateError::PayloadTooLarge {
                category,
                count,
                max,
            });
        }
    }
    let present = present_categories(raw);
    let disallowed: BTreeSet<SignalCategory> =
        present.difference(permitted).copied().collect();
    if !disallowed.is_empty() {
        return Err(GateError::ScopeViolation {
            disallowed,
            permitted: permitted.clone(),
        });
    }
    Ok(())
}
