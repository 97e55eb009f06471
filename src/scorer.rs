//! HTTP client for the external scoring model.
//!
//! Scoring failures are their own error class so a model outage is reported
//! as a gateway problem, never as a consent decision.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeatureMap;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("scorer base URL not configured")]
    NotConfigured,
    #[error("scorer transport error: {0}")]
    Transport(String),
    #[error("scorer API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("scorer returned an undecodable payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ScorerError {
    fn from(err: reqwest::Error) -> Self {
        ScorerError::Transport(err.to_string())
    }
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    features: &'a FeatureMap,
}

/// Raw scorer response. Everything is optional so one missing field does not
/// turn a scorable response into a decode failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVerdict {
    pd: Option<f64>,
    score: Option<f64>,
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    top_features: Vec<ShapItem>,
}

/// One feature attribution entry passed through from the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShapItem {
    pub feature: String,
    pub value: f64,
    pub shap: f64,
    pub abs_shap: f64,
    pub direction: String,
}

/// Normalized scoring verdict. `pd` and `score` are mandatory; a missing
/// decision falls back to fixed score cutoffs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreVerdict {
    pub pd: f64,
    pub score: f64,
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub top_features: Vec<ShapItem>,
}

/// Decision cutoffs used when the model omits its own decision. Scores are on
/// the 0..1 scale the model reports.
pub fn fallback_decision(score: f64) -> &'static str {
    if score >= 0.5 {
        "APPROVE"
    } else if score >= 0.35 {
        "REVIEW"
    } else {
        "REJECT"
    }
}

fn normalize(wire: WireVerdict) -> Result<ScoreVerdict, ScorerError> {
    let (Some(pd), Some(score)) = (wire.pd, wire.score) else {
        return Err(ScorerError::Decode(
            "scorer response missing pd or score".to_string(),
        ));
    };
    let decision = match wire.decision {
        Some(d) if !d.trim().is_empty() => d.trim().to_uppercase(),
        _ => fallback_decision(score).to_string(),
    };
    Ok(ScoreVerdict {
        pd,
        score,
        decision,
        threshold: wire.threshold,
        top_features: wire.top_features,
    })
}

pub struct ScorerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ScorerClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ScorerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST the feature map to the model's `/score` endpoint.
    pub async fn score(&self, features: &FeatureMap) -> Result<ScoreVerdict, ScorerError> {
        let url = format!("{}/score", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&ScoreRequest { features })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ScorerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let wire: WireVerdict = resp
            .json()
            .await
            .map_err(|e| ScorerError::Decode(e.to_string()))?;
        normalize(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_decision_cutoffs() {
        assert_eq!(fallback_decision(0.9), "APPROVE");
        assert_eq!(fallback_decision(0.5), "APPROVE");
        assert_eq!(fallback_decision(0.49), "REVIEW");
        assert_eq!(fallback_decision(0.35), "REVIEW");
        assert_eq!(fallback_decision(0.2), "REJECT");
    }

    #[test]
    fn normalize_requires_pd_and_score() {
        let wire: WireVerdict = serde_json::from_str(r#"{"decision":"APPROVE"}"#).unwrap();
        assert!(matches!(normalize(wire), Err(ScorerError::Decode(_))));
        let wire: WireVerdict = serde_json::from_str(r#"{"pd":0.2}"#).unwrap();
        assert!(matches!(normalize(wire), Err(ScorerError::Decode(_))));
    }

    #[test]
    fn normalize_fills_missing_decision() {
        let wire: WireVerdict = serde_json::from_str(r#"{"pd":0.1,"score":0.9}"#).unwrap();
        let verdict = normalize(wire).unwrap();
        assert_eq!(verdict.decision, "APPROVE");
        assert_eq!(verdict.pd, 0.1);
        assert!(verdict.top_features.is_empty());
    }

    #[test]
    fn normalize_keeps_model_decision_uppercased() {
        let wire: WireVerdict =
            serde_json::from_str(r#"{"pd":0.6,"score":0.4,"decision":"review"}"#).unwrap();
        let verdict = normalize(wire).unwrap();
        assert_eq!(verdict.decision, "REVIEW");
    }

    #[test]
    fn shap_items_pass_through() {
        let wire: WireVerdict = serde_json::from_str(
            r#"{"pd":0.3,"score":0.7,"topFeatures":[{"feature":"sms_fin_ratio","value":0.5,"shap":-0.2,"absShap":0.2,"direction":"up"}]}"#,
        )
        .unwrap();
        let verdict = normalize(wire).unwrap();
        assert_eq!(verdict.top_features.len(), 1);
        assert_eq!(verdict.top_features[0].feature, "sms_fin_ratio");
        assert_eq!(verdict.top_features[0].abs_shap, 0.2);
    }

    #[test]
    fn client_normalizes_base_url() {
        let client =
            ScorerClient::new("http://localhost:8000/".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url, "http://localhost:8000");
    }
}
