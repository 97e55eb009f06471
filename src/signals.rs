//! Raw behavioral signal payloads, grouped by category. These arrive in
//! scoring requests, pass through the scope gate, and are never persisted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSignals {
    pub sms: Vec<SmsMessage>,
    pub contacts: Vec<Contact>,
    pub emails: Vec<Email>,
    pub ecom: Vec<EcomEvent>,
    pub web: Vec<WebEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmsMessage {
    pub text: String,
    /// Epoch milliseconds, when the client provides one.
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Email {
    pub subject: String,
    pub overdue_notice: bool,
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EcomEvent {
    pub category: String,
    pub amount: Option<f64>,
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebEvent {
    pub url: String,
    pub ts: Option<i64>,
}
