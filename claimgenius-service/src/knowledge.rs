use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use claim_pipeline::{ClaimError, KnowledgeBase, LanguageModel, PromptTemplate, bindings};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{info, warn};

const MAX_CHUNK_CHARS: usize = 900;
const DEFAULT_TOP_K: usize = 4;

const ANSWER_PROMPT: &str = r#"You answer questions about insurance documents using only the passages below.
If the passages do not contain the answer, say that the document does not cover it.

Passages:
{CONTEXT}

Question: {QUESTION}
Answer:"#;

/// Turns text into vectors; one vector per input, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Local ONNX sentence embeddings (all-MiniLM-L6-v2). The model is loaded
/// once and shared by both knowledge bases.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    pub async fn new() -> anyhow::Result<Self> {
        info!("Loading embedding model");
        let model = tokio::task::spawn_blocking(|| {
            TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
            )
        })
        .await??;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        // ONNX inference is blocking work
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Vec<f32>>> {
            let mut guard = model
                .lock()
                .map_err(|_| anyhow!("embedding model lock poisoned"))?;
            Ok(guard.embed(texts, None)?)
        })
        .await?
    }
}

#[derive(Debug, Clone)]
struct Chunk {
    source: String,
    text: String,
    embedding: Vec<f32>,
}

/// Question answering over a folder of plain-text documents: paragraph
/// chunks embedded once at load, cosine ranking of the question against
/// them, and a model that answers from the top hits.
pub struct DocumentKnowledgeBase {
    name: &'static str,
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    top_k: usize,
}

impl DocumentKnowledgeBase {
    /// Loads every `.txt` and `.md` file in `dir`. A missing directory gives
    /// an empty knowledge base, which reports itself unavailable on query.
    pub async fn load(
        name: &'static str,
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> anyhow::Result<Self> {
        let mut documents = Vec::new();

        if tokio::fs::try_exists(dir).await? {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let is_text = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt" | "md")
                );
                if !is_text {
                    continue;
                }
                let text = tokio::fs::read_to_string(&path).await?;
                documents.push((path.display().to_string(), text));
            }
        } else {
            warn!(knowledge_base = name, dir = %dir.display(), "document directory not found");
        }

        let kb = Self::from_documents(name, documents, embedder, model).await?;
        info!(
            knowledge_base = name,
            dir = %dir.display(),
            chunks = kb.chunks.len(),
            "knowledge base loaded"
        );
        Ok(kb)
    }

    pub async fn from_documents(
        name: &'static str,
        documents: Vec<(String, String)>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> anyhow::Result<Self> {
        let pieces: Vec<(String, String)> = documents
            .into_iter()
            .flat_map(|(source, text)| {
                split_into_chunks(&text)
                    .into_iter()
                    .map(move |chunk| (source.clone(), chunk))
            })
            .collect();

        let embeddings = if pieces.is_empty() {
            Vec::new()
        } else {
            embedder
                .embed(pieces.iter().map(|(_, text)| text.clone()).collect())
                .await?
        };
        if embeddings.len() != pieces.len() {
            return Err(anyhow!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                pieces.len()
            ));
        }

        let chunks = pieces
            .into_iter()
            .zip(embeddings)
            .map(|((source, text), embedding)| Chunk {
                source,
                text,
                embedding,
            })
            .collect();

        Ok(Self {
            name,
            chunks,
            embedder,
            model,
            template: PromptTemplate::new("knowledge_answer", ANSWER_PROMPT),
            top_k: DEFAULT_TOP_K,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    async fn retrieve(&self, question: &str) -> claim_pipeline::Result<Vec<&Chunk>> {
        let query = self
            .embedder
            .embed(vec![question.to_string()])
            .await
            .map_err(|e| ClaimError::Retrieval(format!("question embedding failed: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| ClaimError::Retrieval("embedder returned no vector".to_string()))?;

        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(&query, &chunk.embedding), chunk))
            .collect();
        // stable sort keeps document order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, chunk)| chunk)
            .collect())
    }
}

#[async_trait]
impl KnowledgeBase for DocumentKnowledgeBase {
    async fn query(&self, question: &str) -> claim_pipeline::Result<String> {
        if self.chunks.is_empty() {
            return Err(ClaimError::Retrieval(format!(
                "knowledge base `{}` has no documents loaded",
                self.name
            )));
        }

        let hits = self.retrieve(question).await?;
        info!(knowledge_base = self.name, hits = hits.len(), "retrieved passages");

        let context = hits
            .iter()
            .map(|chunk| format!("[{}]\n{}", chunk.source, chunk.text))
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = self
            .template
            .render(&bindings([("CONTEXT", context.as_str()), ("QUESTION", question)]))?;

        let answer = self
            .model
            .complete(self.name, &prompt)
            .await
            .map_err(|e| ClaimError::Retrieval(e.to_string()))?;
        Ok(answer.trim().to_string())
    }
}

/// Paragraphs merged up to `MAX_CHUNK_CHARS`.
fn split_into_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty() && current.len() + paragraph.len() + 2 > MAX_CHUNK_CHARS {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
