//! One-pass multipart parsing for the relay.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use reqwest::multipart::{Form, Part};

use super::proxy::ProxyError;

/// A file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Text fields and file parts of a multipart body, each list in arrival
/// order. Repeated field names are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMultipart {
    pub fields: Vec<(String, String)>,
    pub files: Vec<UploadedFile>,
}

impl ParsedMultipart {
    /// First text field called `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn file(&self, field_name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field_name)
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.bytes.len()).sum()
    }

    /// Rebuild the body for forwarding.
    pub fn into_form(self) -> Result<Form, ProxyError> {
        let mut form = Form::new();

        for (name, value) in self.fields {
            form = form.text(name, value);
        }

        for file in self.files {
            let mut part =
                Part::bytes(file.bytes).file_name(file.file_name.unwrap_or_else(|| "upload".into()));
            if let Some(content_type) = file.content_type {
                part = part
                    .mime_str(&content_type)
                    .map_err(|e| ProxyError::BadRequest(format!("invalid content type: {}", e)))?;
            }
            form = form.part(file.field_name, part);
        }

        Ok(form)
    }
}

/// Drain `multipart` into memory.
///
/// Parts with a file name are files; everything else is a text field.
pub async fn parse_multipart(mut multipart: Multipart) -> Result<ParsedMultipart, ProxyError> {
    let mut parsed = ParsedMultipart::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| read_failure("Failed to read multipart data", e))?
    {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            let data = field
                .bytes()
                .await
                .map_err(|e| read_failure("Failed to read file data", e))?;
            parsed.files.push(UploadedFile {
                field_name: name,
                file_name,
                content_type,
                bytes: data.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| read_failure("Failed to read field", e))?;
            parsed.fields.push((name, value));
        }
    }

    Ok(parsed)
}

/// Body limit hits become 413; anything else is a malformed body.
fn read_failure(context: &str, e: MultipartError) -> ProxyError {
    let details = format!("{}: {}", context, e.body_text());
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProxyError::PayloadTooLarge(details)
    } else {
        ProxyError::BadRequest(details)
    }
}
