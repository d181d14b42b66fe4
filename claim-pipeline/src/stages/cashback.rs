use std::sync::Arc;

use crate::models::{CashbackAmount, ClaimDecision};
use crate::template::{Bindings, PromptTemplate, bindings};

use super::{LanguageModel, PromptStage, StageOutput};

const CASH_BACK_PROMPT: &str = r#"Extract the cashback amount and the treatment type from the claim decision below.

CLAIM DECISION:
{text}

Respond with ONLY this JSON:
{{
  "cashback_amount": "the amount paid back to the customer, 0 if the claim was rejected",
  "treatment_type": "the treatment the decision refers to, or null"
}}
"#;

pub type CashbackStage = PromptStage<CashbackAmount>;

impl StageOutput for CashbackAmount {
    const STAGE: &'static str = "cashback_extraction";

    fn validate(&self) -> Result<(), String> {
        if self.cashback_amount.trim().is_empty() {
            return Err("cashback_amount is empty".to_string());
        }
        Ok(())
    }
}

impl PromptStage<CashbackAmount> {
    pub fn cashback(model: Arc<dyn LanguageModel>) -> Self {
        Self::new(PromptTemplate::new("cash_back", CASH_BACK_PROMPT), model)
    }
}

pub fn cashback_bindings(decision: &ClaimDecision) -> Bindings {
    let text = serde_json::to_string_pretty(decision).unwrap_or_else(|_| decision.reason.clone());
    bindings([("text", text.as_str())])
}
