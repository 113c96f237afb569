#![allow(dead_code)]

use pdfqa::config::Config;
use pdfqa::extract::fixtures::sample_pdf;
use std::collections::HashMap;
use std::path::Path;

/// Multi-page PDF bytes built by the crate's own fixture generator.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    sample_pdf(pages).expect("sample pdf")
}

/// Configuration pointing both providers at mock servers, with `overrides` applied last.
pub fn test_config(
    embedding_url: &str,
    generation_url: &str,
    upload_dir: &Path,
    overrides: &[(&str, &str)],
) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("EMBEDDING_PROVIDER".into(), "ollama".into()),
        ("EMBEDDING_MODELS".into(), "all-minilm,nomic-embed-text".into()),
        ("EMBEDDING_URL".into(), embedding_url.into()),
        ("GENERATION_PROVIDER".into(), "openai".into()),
        ("GENERATION_URL".into(), generation_url.into()),
        ("GENERATION_API_KEY".into(), "sk-integration".into()),
        ("GENERATION_MAX_ATTEMPTS".into(), "1".into()),
        ("ASK_TIMEOUT_SECS".into(), "10".into()),
        ("UPLOAD_DIR".into(), upload_dir.display().to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("valid test config")
}

/// Multipart body with a single `file` field.
pub fn multipart_body(boundary: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
