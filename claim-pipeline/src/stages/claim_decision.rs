use std::sync::Arc;

use crate::models::{ClaimDecision, ClaimDetails, PolicySection};
use crate::template::{Bindings, PromptTemplate, bindings};

use super::{LanguageModel, PromptStage, StageOutput};

const CLAIM_PROCESSING_PROMPT: &str = r#"You are an insurance claims adjudicator. Decide the claim below strictly according to the policy section.

POLICY SECTION:
{POLICY_SECTION}

CLAIM DETAILS: {CLAIM_DETAILS}
- Invoice total: {INVOICE_TOTAL}
- Treatment type: {TREATMENT_TYPE}

Rules:
- If the policy covers the treatment and the invoice total is within the yearly cashback, approve the full invoice total.
- If the invoice total exceeds the yearly cashback, partially approve up to the cashback amount.
- If the policy does not cover the treatment, or the policy section does not mention it, reject the claim.

Respond with ONLY this JSON (no explanation, no additional text):
{{
  "decision": "approved" | "partially_approved" | "rejected",
  "reason": "one or two sentences citing the policy",
  "approved_amount": "amount paid back, or null when rejected"
}}
"#;

pub type ClaimDecisionStage = PromptStage<ClaimDecision>;

impl StageOutput for ClaimDecision {
    const STAGE: &'static str = "claim_decision";

    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("decision reason is empty".to_string());
        }
        Ok(())
    }
}

impl PromptStage<ClaimDecision> {
    pub fn claim_decision(model: Arc<dyn LanguageModel>) -> Self {
        Self::new(
            PromptTemplate::new("claim_processing", CLAIM_PROCESSING_PROMPT),
            model,
        )
    }
}

/// The joined details and both fields individually.
pub fn decision_bindings(policy_section: &PolicySection, details: &ClaimDetails) -> Bindings {
    bindings([
        ("POLICY_SECTION", policy_section.as_str()),
        ("CLAIM_DETAILS", details.text()),
        ("INVOICE_TOTAL", details.invoice_total()),
        ("TREATMENT_TYPE", details.treatment_type()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClaimError, ModelInvocationError};
    use crate::models::{ClaimOutcome, InvoiceData};
    use crate::stages::testing::ScriptedModel;

    fn inputs() -> (PolicySection, ClaimDetails) {
        (
            PolicySection::from("Dental cashback is 80 per year".to_string()),
            ClaimDetails::from_invoice(&InvoiceData::new("120", "dental")),
        )
    }

    #[tokio::test]
    async fn renders_policy_and_details_into_prompt() {
        let model = Arc::new(ScriptedModel::replying(
            r#"{"decision": "partially_approved", "reason": "Capped at 80.", "approved_amount": "80"}"#,
        ));
        let stage = ClaimDecisionStage::claim_decision(model.clone());
        assert_eq!(stage.name(), "claim_decision");
        let (policy, details) = inputs();

        let decision = stage
            .invoke(&decision_bindings(&policy, &details))
            .await
            .unwrap();

        assert_eq!(decision.decision, ClaimOutcome::PartiallyApproved);
        assert_eq!(decision.approved_amount.as_deref(), Some("80"));

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("Dental cashback is 80 per year"));
        assert!(prompt.contains("CLAIM DETAILS: 120 dental"));
        assert!(prompt.contains("- Invoice total: 120"));
        assert!(prompt.contains("- Treatment type: dental"));
        assert!(prompt.contains(r#""decision": "approved""#));
        assert_eq!(model.stages(), vec!["claim_decision"]);
    }

    #[tokio::test]
    async fn prose_reply_fails_schema_validation() {
        let model = Arc::new(ScriptedModel::replying("The claim is approved, congratulations!"));
        let stage = ClaimDecisionStage::claim_decision(model);
        let (policy, details) = inputs();

        let err = stage
            .invoke(&decision_bindings(&policy, &details))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClaimError::ModelInvocation(ModelInvocationError::Schema {
                stage: "claim_decision",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unknown_decision_value_is_rejected() {
        let model = Arc::new(ScriptedModel::replying(
            r#"{"decision": "maybe", "reason": "unsure"}"#,
        ));
        let stage = ClaimDecisionStage::claim_decision(model);
        let (policy, details) = inputs();

        let err = stage
            .invoke(&decision_bindings(&policy, &details))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "model_schema_error");
    }

    #[tokio::test]
    async fn missing_binding_never_reaches_the_model() {
        let model = Arc::new(ScriptedModel::replying("{}"));
        let stage = ClaimDecisionStage::claim_decision(model.clone());

        let err = stage
            .invoke(&bindings([("POLICY_SECTION", "anything")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::TemplateBinding { .. }));
        assert!(model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_reply_is_reported_as_such() {
        let model = Arc::new(ScriptedModel::replying("   "));
        let stage = ClaimDecisionStage::claim_decision(model);
        let (policy, details) = inputs();

        let err = stage
            .invoke(&decision_bindings(&policy, &details))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClaimError::ModelInvocation(ModelInvocationError::EmptyResponse)
        ));
    }
}
