use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use claim_pipeline::{ClaimError, InvoiceData, InvoiceExtractor};
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{info, warn};

const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const MAX_PAGES: usize = 4;

const INVOICE_EXTRACTION_PROMPT: &str = r#"You are an expert invoice reader for a health insurance company. The images are the pages of one medical or dental invoice.

Extract the invoice fields and respond with ONLY this JSON (no explanation, no Markdown):
{
  "invoice_total": "the total amount due, exactly as printed including currency symbol",
  "treatment_type": "one or two words naming the treatment category, e.g. dental, optical, physiotherapy",
  "invoice_number": "invoice number or null",
  "invoice_date": "invoice date or null",
  "patient_name": "patient name or null",
  "provider_name": "clinic or practitioner name or null"
}

If the document is not an invoice or the total cannot be read, respond with {"error": "reason"}."#;

/// Reads invoices by rendering the PDF pages and asking a vision model for
/// the fields as JSON.
pub struct PdfInvoiceExtractor {
    http: Client,
    api_key: String,
    model: String,
}

impl PdfInvoiceExtractor {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn read_invoice(&self, pdf_path: &Path) -> anyhow::Result<String> {
        let pages = convert_pdf_to_images(pdf_path).await?;
        if pages.is_empty() {
            return Err(anyhow!("No pages rendered from PDF"));
        }
        info!("Rendered {} invoice page(s)", pages.len());

        let mut content = vec![json!({ "type": "text", "text": INVOICE_EXTRACTION_PROMPT })];
        for page in pages.iter().take(MAX_PAGES) {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", image_to_base64(page)?) }
            }));
        }

        self.call_openrouter_api(content, 800).await
    }

    async fn call_openrouter_api(
        &self,
        content: Vec<Value>,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": max_tokens,
            "temperature": 0.0
        });

        let response = self
            .http
            .post(OPENROUTER_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM API request failed: {}", response.status()));
        }

        let response_json: Value = response.json().await?;
        response_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid response format from LLM"))
    }
}

#[async_trait]
impl InvoiceExtractor for PdfInvoiceExtractor {
    async fn extract(&self, invoice_path: &Path) -> claim_pipeline::Result<InvoiceData> {
        info!(invoice = %invoice_path.display(), model = %self.model, "Extracting invoice fields");

        let output = self.read_invoice(invoice_path).await.map_err(|e| {
            warn!(invoice = %invoice_path.display(), error = %e, "Invoice extraction failed");
            ClaimError::Extraction(e.to_string())
        })?;

        if let Some(reason) = refusal_reason(&output) {
            return Err(ClaimError::Extraction(reason));
        }
        InvoiceData::from_model_output(&output)
    }
}

/// `{"error": "..."}` replies from the extraction prompt.
fn refusal_reason(output: &str) -> Option<String> {
    let value: Value = serde_json::from_str(claim_pipeline::models::json_body(output)).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

async fn convert_pdf_to_images(pdf_path: &Path) -> anyhow::Result<Vec<DynamicImage>> {
    if !tokio::fs::try_exists(pdf_path).await? {
        return Err(anyhow!("PDF file not found: {}", pdf_path.display()));
    }

    let pdf_path: PathBuf = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<DynamicImage>> {
        let pdf = PDF::from_file(&pdf_path).map_err(|e| anyhow!("Failed to load PDF: {}", e))?;
        pdf.render(Pages::All, None)
            .map_err(|e| anyhow!("Failed to render PDF pages: {}", e))
    })
    .await?
}

fn image_to_base64(image: &DynamicImage) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| anyhow!("Failed to encode image: {}", e))?;
    Ok(STANDARD.encode(&buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PdfInvoiceExtractor {
        PdfInvoiceExtractor::new("sk-test", "openai/gpt-4.1-mini", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extractor()
            .extract(&dir.path().join("nope.pdf"))
            .await
            .unwrap_err();
        match err {
            ClaimError::Extraction(reason) => assert!(reason.contains("PDF file not found")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn page_images_encode_as_png() {
        let page = DynamicImage::new_rgb8(8, 8);
        let encoded = image_to_base64(&page).unwrap();
        // PNG signature, base64-encoded
        assert!(encoded.starts_with("iVBORw0KGgo"));
    }

    #[test]
    fn model_refusals_are_detected() {
        assert_eq!(
            refusal_reason(r#"{"error": "not an invoice"}"#).as_deref(),
            Some("not an invoice")
        );
        assert_eq!(
            refusal_reason(r#"{"invoice_total": "120", "treatment_type": "dental"}"#),
            None
        );
        assert_eq!(refusal_reason("plain text"), None);
    }

    #[test]
    fn prompt_asks_for_the_required_fields() {
        assert!(INVOICE_EXTRACTION_PROMPT.contains("\"invoice_total\""));
        assert!(INVOICE_EXTRACTION_PROMPT.contains("\"treatment_type\""));
    }
}
