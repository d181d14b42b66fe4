use async_trait::async_trait;
use claim_pipeline::{LanguageModel, ModelInvocationError};
use rig::{agent::Agent, client::CompletionClient, completion::Prompt, providers::openrouter};
use tracing::{debug, warn};

const PREAMBLE: &str = "You are ClaimGenius, an AI assistant for insurance claims. \
Answer precisely and follow the output format each request asks for.";

pub fn get_llm_agent(
    api_key: &str,
    model: &str,
    preamble: &str,
) -> Agent<openrouter::CompletionModel> {
    let client = openrouter::Client::new(api_key);
    client.agent(model).preamble(preamble).temperature(0.0).build()
}

/// OpenRouter chat model behind the pipeline's [`LanguageModel`] seam.
/// The agent is built once and shared by every stage and request.
pub struct OpenRouterModel {
    agent: Agent<openrouter::CompletionModel>,
    model: String,
}

impl OpenRouterModel {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            agent: get_llm_agent(api_key, model, PREAMBLE),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenRouterModel {
    async fn complete(&self, stage: &str, prompt: &str) -> Result<String, ModelInvocationError> {
        debug!(stage, model = %self.model, "calling OpenRouter");

        self.agent.prompt(prompt.to_owned()).await.map_err(|e| {
            warn!(stage, model = %self.model, error = %e, "OpenRouter call failed");
            ModelInvocationError::Provider(e.to_string())
        })
    }
}
