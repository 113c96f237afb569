//! PDF text extraction and the upload policy gate.
//!
//! Extraction is layout-unaware: each page's text is appended in page order with no separator
//! beyond what the page itself yields. Parsing is CPU-bound and runs on the blocking pool.

use crate::processing::ValidationError;
use lopdf::Document;
use std::sync::Arc;
use thiserror::Error;

const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["application/pdf", "application/octet-stream"];

/// Failures while turning PDF bytes into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Bytes are not a parseable PDF document.
    #[error("pdf parse error: {0}")]
    Parse(String),
    /// The blocking extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Reject uploads that are not PDFs before any parsing is attempted.
///
/// The check is a cheap policy gate on the file name and, when supplied, the declared content
/// type. Content types carrying parameters (`application/pdf; charset=binary`) are accepted.
pub fn validate_upload(
    filename: Option<&str>,
    content_type: Option<&str>,
) -> Result<(), ValidationError> {
    let filename = filename
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(ValidationError::MissingFilename)?;

    let has_pdf_extension = filename
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("pdf"));
    if !has_pdf_extension {
        return Err(ValidationError::NotPdf {
            filename: filename.to_string(),
        });
    }

    if let Some(declared) = content_type {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !essence.is_empty() && !ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
            return Err(ValidationError::UnsupportedContentType(declared.to_string()));
        }
    }

    Ok(())
}

/// Extract the concatenated text of every page, in page order.
///
/// A document with zero pages yields an empty string. Pages whose text cannot be decoded are
/// skipped; only bytes that do not parse as a PDF at all produce an error.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let document =
        Document::load_mem(bytes).map_err(|error| ExtractionError::Parse(error.to_string()))?;

    let pages = document.get_pages();
    let mut text = String::new();
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(error) => {
                tracing::debug!(page = page_number, error = %error, "Skipping undecodable page");
            }
        }
    }

    tracing::debug!(pages = pages.len(), chars = text.len(), "Extracted PDF text");
    Ok(text)
}

/// Run [`extract_text`] on the blocking thread pool.
pub async fn extract_text_blocking(bytes: Arc<[u8]>) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes))
        .await
        .map_err(|error| ExtractionError::Task(error.to_string()))?
}

/// Generated sample documents shared by unit and integration tests.
#[doc(hidden)]
pub mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Build a PDF with one page per entry, each page drawing its text in Courier.
    pub fn sample_pdf(pages: &[&str]) -> anyhow::Result<Vec<u8>> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = document.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = document.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        document.save_to(&mut bytes)?;
        Ok(bytes)
    }
}
