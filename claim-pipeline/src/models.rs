use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ClaimError, Result};

/// Structured fields read off an uploaded invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    #[serde(deserialize_with = "amount_as_text")]
    pub invoice_total: String,
    pub treatment_type: String,
    /// Whatever else the extractor recognised (patient, provider, dates ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl InvoiceData {
    pub fn new(invoice_total: impl Into<String>, treatment_type: impl Into<String>) -> Self {
        Self {
            invoice_total: invoice_total.into(),
            treatment_type: treatment_type.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Parses the JSON object an extractor produced and checks the required fields.
    pub fn from_model_output(output: &str) -> Result<Self> {
        let invoice: InvoiceData = serde_json::from_str(json_body(output))
            .map_err(|e| ClaimError::Extraction(format!("unreadable invoice fields: {e}")))?;
        invoice.validate()?;
        Ok(invoice)
    }

    pub fn validate(&self) -> Result<()> {
        if self.invoice_total.trim().is_empty() {
            return Err(ClaimError::Extraction("invoice_total is empty".to_string()));
        }
        if self.treatment_type.trim().is_empty() {
            return Err(ClaimError::Extraction("treatment_type is empty".to_string()));
        }
        Ok(())
    }
}

fn amount_as_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Amount::deserialize(deserializer)? {
        Amount::Text(text) => text,
        Amount::Number(number) => number.to_string(),
    })
}

/// Strips an optional Markdown code fence around a JSON payload.
pub fn json_body(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Answer from the policy knowledge base about the cashback for a treatment.
/// No format is guaranteed; it may be empty or a refusal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicySection(String);

impl PolicySection {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PolicySection {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for PolicySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invoice total and treatment type, kept apart so the decision prompt can
/// bind them separately, plus their space-joined text form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimDetails {
    invoice_total: String,
    treatment_type: String,
    text: String,
}

impl ClaimDetails {
    pub fn from_invoice(invoice: &InvoiceData) -> Self {
        Self {
            text: format!("{} {}", invoice.invoice_total, invoice.treatment_type),
            invoice_total: invoice.invoice_total.clone(),
            treatment_type: invoice.treatment_type.clone(),
        }
    }

    pub fn invoice_total(&self) -> &str {
        &self.invoice_total
    }

    pub fn treatment_type(&self) -> &str {
        &self.treatment_type
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for ClaimDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    Approved,
    PartiallyApproved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDecision {
    pub decision: ClaimOutcome,
    pub reason: String,
    #[serde(default)]
    pub approved_amount: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashbackAmount {
    pub cashback_amount: String,
    #[serde(default)]
    pub treatment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub message: String,
}

/// Everything one pipeline run has produced so far.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimFile {
    pub id: String,
    pub invoice_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub invoice: Option<InvoiceData>,
    pub policy_section: Option<PolicySection>,
    pub claim_details: Option<ClaimDetails>,
    pub claim_decision: Option<ClaimDecision>,
    pub cashback: Option<CashbackAmount>,
}

impl ClaimFile {
    pub fn new(id: impl Into<String>, invoice_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            invoice_path: invoice_path.into(),
            started_at: Utc::now(),
            invoice: None,
            policy_section: None,
            claim_details: None,
            claim_decision: None,
            cashback: None,
        }
    }
}

/// A finished run: the final response and every intermediate artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimRun {
    pub id: String,
    pub invoice_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub invoice: InvoiceData,
    pub policy_section: PolicySection,
    pub claim_details: ClaimDetails,
    pub claim_decision: ClaimDecision,
    pub cashback: CashbackAmount,
    pub final_response: FinalResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_details_join_with_single_space() {
        let details = ClaimDetails::from_invoice(&InvoiceData::new("120", "dental"));
        assert_eq!(details.text(), "120 dental");
        assert_eq!(details.to_string(), "120 dental");

        let details = ClaimDetails::from_invoice(&InvoiceData::new("1 200.50", "root canal"));
        assert_eq!(details.text(), "1 200.50 root canal");
        assert_eq!(details.invoice_total(), "1 200.50");
        assert_eq!(details.treatment_type(), "root canal");
    }

    #[test]
    fn invoice_accepts_numeric_total_and_keeps_extra_fields() {
        let invoice = InvoiceData::from_model_output(
            r#"{"invoice_total": 120.5, "treatment_type": "optical", "patient_name": "A. Patel"}"#,
        )
        .unwrap();
        assert_eq!(invoice.invoice_total, "120.5");
        assert_eq!(invoice.treatment_type, "optical");
        assert_eq!(invoice.extra["patient_name"], "A. Patel");
    }

    #[test]
    fn invoice_parses_fenced_output() {
        let output = "```json\n{\"invoice_total\": \"$80\", \"treatment_type\": \"dental\"}\n```";
        let invoice = InvoiceData::from_model_output(output).unwrap();
        assert_eq!(invoice.invoice_total, "$80");
    }

    #[test]
    fn invoice_without_required_fields_is_an_extraction_error() {
        let missing = InvoiceData::from_model_output(r#"{"invoice_total": "120"}"#);
        assert!(matches!(missing, Err(ClaimError::Extraction(_))));

        let blank = InvoiceData::from_model_output(
            r#"{"invoice_total": "120", "treatment_type": "   "}"#,
        );
        assert!(matches!(blank, Err(ClaimError::Extraction(_))));

        let prose = InvoiceData::from_model_output("I could not read this invoice.");
        assert!(matches!(prose, Err(ClaimError::Extraction(_))));
    }

    #[test]
    fn json_body_leaves_plain_payloads_alone() {
        assert_eq!(json_body("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(json_body("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }
}
