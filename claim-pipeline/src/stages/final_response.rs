use std::sync::Arc;

use crate::models::{ClaimDecision, FinalResponse, InvoiceData};
use crate::template::{Bindings, PromptTemplate, bindings};

use super::{LanguageModel, PromptStage, StageOutput};

const FINAL_RESPONSE_PROMPT: &str = r#"You are a friendly insurance assistant writing to a customer about their claim.

INVOICE DATA:
{invoice_data}

CLAIM DECISION:
{claim_decision}

Write a short message that tells the customer whether the claim was approved, how much will be paid back and why.
Do not invent amounts that are not in the invoice data or the claim decision.

Respond with ONLY this JSON:
{{
  "message": "the message to the customer"
}}
"#;

pub type FinalResponseStage = PromptStage<FinalResponse>;

impl StageOutput for FinalResponse {
    const STAGE: &'static str = "final_response";

    fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message is empty".to_string());
        }
        Ok(())
    }
}

impl PromptStage<FinalResponse> {
    pub fn final_response(model: Arc<dyn LanguageModel>) -> Self {
        Self::new(
            PromptTemplate::new("final_response", FINAL_RESPONSE_PROMPT),
            model,
        )
    }
}

pub fn final_response_bindings(invoice: &InvoiceData, decision: &ClaimDecision) -> Bindings {
    let invoice_data = serde_json::to_string_pretty(invoice)
        .unwrap_or_else(|_| format!("{} {}", invoice.invoice_total, invoice.treatment_type));
    let claim_decision =
        serde_json::to_string_pretty(decision).unwrap_or_else(|_| decision.reason.clone());
    bindings([
        ("invoice_data", invoice_data.as_str()),
        ("claim_decision", claim_decision.as_str()),
    ])
}
