//! Claim adjudication pipeline: one uploaded invoice in, one claim decision out.
//!
//! ```text
//! invoice ─▶ extract ─▶ policy lookup ─▶ claim details ─▶ decision ─▶ cashback ─▶ final response
//! ```
//!
//! Invoice extraction, knowledge-base lookup and the language model are
//! collaborators behind the [`InvoiceExtractor`], [`KnowledgeBase`] and
//! [`LanguageModel`] traits; [`ClaimPipeline::run_claim`] sequences them and
//! returns every intermediate artifact.

pub mod collaborators;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod template;
pub mod upload;

// Re-export commonly used types
pub use collaborators::{InvoiceExtractor, KnowledgeBase};
pub use error::{ClaimError, ModelInvocationError, Result};
pub use models::{
    CashbackAmount, ClaimDecision, ClaimDetails, ClaimFile, ClaimOutcome, ClaimRun,
    FinalResponse, InvoiceData, PolicySection,
};
pub use pipeline::{ClaimPipeline, ClaimRunError, RunState, policy_query};
pub use stages::{LanguageModel, PromptStage, StageOutput};
pub use template::{Bindings, PromptTemplate, bindings};
pub use upload::{UploadStore, looks_like_pdf, sanitize_filename};
