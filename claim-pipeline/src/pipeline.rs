use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::{
    collaborators::{InvoiceExtractor, KnowledgeBase},
    error::{ClaimError, Result},
    models::{ClaimDetails, ClaimFile, ClaimRun, PolicySection},
    stages::{
        CashbackStage, ClaimDecisionStage, FinalResponseStage, LanguageModel,
        cashback::cashback_bindings, claim_decision::decision_bindings,
        final_response::final_response_bindings,
    },
};

/// Where a claim run currently stands. Runs only move forward; any stage
/// error moves them to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Uploaded,
    Extracted,
    PolicyLookedUp,
    ClaimDetailsBuilt,
    Decided,
    CashbackExtracted,
    Finalized,
    Failed,
}

impl RunState {
    /// The state after the current stage succeeds. Terminal states stay put.
    pub fn next(self) -> Self {
        match self {
            RunState::Uploaded => RunState::Extracted,
            RunState::Extracted => RunState::PolicyLookedUp,
            RunState::PolicyLookedUp => RunState::ClaimDetailsBuilt,
            RunState::ClaimDetailsBuilt => RunState::Decided,
            RunState::Decided => RunState::CashbackExtracted,
            RunState::CashbackExtracted => RunState::Finalized,
            RunState::Finalized => RunState::Finalized,
            RunState::Failed => RunState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finalized | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Uploaded => "uploaded",
            RunState::Extracted => "extracted",
            RunState::PolicyLookedUp => "policy_looked_up",
            RunState::ClaimDetailsBuilt => "claim_details_built",
            RunState::Decided => "decided",
            RunState::CashbackExtracted => "cashback_extracted",
            RunState::Finalized => "finalized",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that ended in `Failed`. Carries whatever was produced before the
/// failing stage; never a final response.
#[derive(Debug, Error)]
#[error("claim run {} failed after {failed_after}: {source}", .claim.id)]
pub struct ClaimRunError {
    /// Last state the run reached before the failing stage.
    pub failed_after: RunState,
    /// Always `RunState::Failed`.
    pub state: RunState,
    #[source]
    pub source: ClaimError,
    pub claim: Box<ClaimFile>,
}

/// The question put to the policy knowledge base for a treatment.
pub fn policy_query(treatment_type: &str) -> String {
    format!("What is the cashback amount for {treatment_type} fees per year?")
}

/// Drives one invoice through extraction, policy lookup and the three model
/// stages. Built once and shared; holds no per-run state.
pub struct ClaimPipeline {
    extractor: Arc<dyn InvoiceExtractor>,
    policy: Arc<dyn KnowledgeBase>,
    claim_decision: ClaimDecisionStage,
    cashback: CashbackStage,
    final_response: FinalResponseStage,
}

impl ClaimPipeline {
    pub fn new(
        extractor: Arc<dyn InvoiceExtractor>,
        policy: Arc<dyn KnowledgeBase>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            extractor,
            policy,
            claim_decision: ClaimDecisionStage::claim_decision(model.clone()),
            cashback: CashbackStage::cashback(model.clone()),
            final_response: FinalResponseStage::final_response(model),
        }
    }

    pub async fn run_claim(
        &self,
        invoice_path: &Path,
    ) -> std::result::Result<ClaimRun, ClaimRunError> {
        let mut claim = ClaimFile::new(Uuid::new_v4().to_string(), invoice_path);
        let mut state = RunState::Uploaded;
        let span = info_span!("claim_run", run_id = %claim.id);

        async move {
            info!(invoice = %invoice_path.display(), "starting claim run");

            match self.drive(&mut claim, &mut state).await {
                Ok(run) => {
                    info!(state = %state, "claim run finished");
                    Ok(run)
                }
                Err(source) => {
                    let failed_after = state;
                    fail(&mut state);
                    error!(
                        failed_after = %failed_after,
                        kind = source.kind(),
                        error = %source,
                        "claim run failed"
                    );
                    Err(ClaimRunError {
                        failed_after,
                        state,
                        source,
                        claim: Box::new(claim),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, claim: &mut ClaimFile, state: &mut RunState) -> Result<ClaimRun> {
        let invoice = self.extractor.extract(&claim.invoice_path).await?;
        invoice.validate()?;
        info!(
            invoice_total = %invoice.invoice_total,
            treatment_type = %invoice.treatment_type,
            "invoice extracted"
        );
        claim.invoice = Some(invoice.clone());
        advance(state);

        let question = policy_query(&invoice.treatment_type);
        let policy_section = PolicySection::from(self.policy.query(&question).await?);
        claim.policy_section = Some(policy_section.clone());
        advance(state);

        let claim_details = ClaimDetails::from_invoice(&invoice);
        claim.claim_details = Some(claim_details.clone());
        advance(state);

        let claim_decision = self
            .claim_decision
            .invoke(&decision_bindings(&policy_section, &claim_details))
            .await?;
        info!(
            stage = self.claim_decision.name(),
            decision = ?claim_decision.decision,
            "claim decided"
        );
        claim.claim_decision = Some(claim_decision.clone());
        advance(state);

        let cashback = self
            .cashback
            .invoke(&cashback_bindings(&claim_decision))
            .await?;
        info!(
            stage = self.cashback.name(),
            cashback_amount = %cashback.cashback_amount,
            "cashback extracted"
        );
        claim.cashback = Some(cashback.clone());
        advance(state);

        let final_response = self
            .final_response
            .invoke(&final_response_bindings(&invoice, &claim_decision))
            .await?;
        info!(stage = self.final_response.name(), "final response written");
        advance(state);

        Ok(ClaimRun {
            id: claim.id.clone(),
            invoice_path: claim.invoice_path.clone(),
            started_at: claim.started_at,
            completed_at: Utc::now(),
            invoice,
            policy_section,
            claim_details,
            claim_decision,
            cashback,
            final_response,
        })
    }
}

fn advance(state: &mut RunState) {
    let next = state.next();
    info!(from = %state, to = %next, "claim run advanced");
    *state = next;
}

fn fail(state: &mut RunState) {
    info!(from = %state, to = %RunState::Failed, "claim run advanced");
    *state = RunState::Failed;
}
