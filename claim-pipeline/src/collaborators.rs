use std::path::Path;

use async_trait::async_trait;

use crate::{error::Result, models::InvoiceData};

/// Reads structured fields out of a stored invoice document.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    /// Must return `ClaimError::Extraction` rather than a blank record when
    /// the required fields cannot be read.
    async fn extract(&self, invoice_path: &Path) -> Result<InvoiceData>;
}

/// Free-text question answering over one document collection
/// (the policy document or the claim forms).
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// `ClaimError::Retrieval` when the collection cannot be queried.
    async fn query(&self, question: &str) -> Result<String>;
}
