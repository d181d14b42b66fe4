//! Prompt-template stages of the claim pipeline.
//!
//! Each stage renders one fixed template, makes one model call and parses the
//! reply into a small validated schema. Stages hold no per-run state and are
//! shared between runs behind `Arc`s.

pub mod cashback;
pub mod claim_decision;
pub mod final_response;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{ModelInvocationError, Result};
use crate::models::json_body;
use crate::template::{Bindings, PromptTemplate};

pub use cashback::CashbackStage;
pub use claim_decision::ClaimDecisionStage;
pub use final_response::FinalResponseStage;

/// A text-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Completes `prompt`. `stage` names the caller for logging and routing.
    async fn complete(
        &self,
        stage: &str,
        prompt: &str,
    ) -> std::result::Result<String, ModelInvocationError>;
}

/// The schema a stage's model output must satisfy before it flows downstream.
pub trait StageOutput: DeserializeOwned + Send {
    const STAGE: &'static str;

    fn validate(&self) -> std::result::Result<(), String>;
}

/// One template plus the model that answers it, typed by the output schema.
pub struct PromptStage<O> {
    template: PromptTemplate,
    model: Arc<dyn LanguageModel>,
    _output: PhantomData<fn() -> O>,
}

impl<O: StageOutput> PromptStage<O> {
    pub fn new(template: PromptTemplate, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            template,
            model,
            _output: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        O::STAGE
    }

    pub async fn invoke(&self, bindings: &Bindings) -> Result<O> {
        let prompt = self.template.render(bindings)?;
        debug!(
            stage = O::STAGE,
            template = self.template.name(),
            prompt_len = prompt.len(),
            "invoking model"
        );

        let reply = self.model.complete(O::STAGE, &prompt).await?;
        if reply.trim().is_empty() {
            return Err(ModelInvocationError::EmptyResponse.into());
        }

        let output = parse_stage_output::<O>(&reply)?;
        info!(stage = O::STAGE, "stage output validated");
        Ok(output)
    }
}

fn parse_stage_output<O: StageOutput>(
    reply: &str,
) -> std::result::Result<O, ModelInvocationError> {
    let output: O =
        serde_json::from_str(json_body(reply)).map_err(|e| ModelInvocationError::Schema {
            stage: O::STAGE,
            reason: e.to_string(),
        })?;
    output
        .validate()
        .map_err(|reason| ModelInvocationError::Schema {
            stage: O::STAGE,
            reason,
        })?;
    Ok(output)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::LanguageModel;
    use crate::error::ModelInvocationError;

    type Responder = dyn Fn(&str, &str) -> Result<String, ModelInvocationError> + Send + Sync;

    /// Answers through a closure and records `(stage, prompt)` for every call.
    pub struct ScriptedModel {
        pub calls: Arc<Mutex<Vec<(String, String)>>>,
        respond: Box<Responder>,
    }

    impl ScriptedModel {
        pub fn new<F>(respond: F) -> Self
        where
            F: Fn(&str, &str) -> Result<String, ModelInvocationError> + Send + Sync + 'static,
        {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                respond: Box::new(respond),
            }
        }

        pub fn replying(reply: &'static str) -> Self {
            Self::new(move |_, _| Ok(reply.to_string()))
        }

        pub fn stages(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, stage: &str, prompt: &str) -> Result<String, ModelInvocationError> {
            self.calls
                .lock()
                .unwrap()
                .push((stage.to_string(), prompt.to_string()));
            (self.respond)(stage, prompt)
        }
    }
}
