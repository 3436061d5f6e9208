use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;

use crate::error::ApiError;
use crate::media::image_extension;

pub struct FilePart {
    pub content_type: String,
    pub bytes: Bytes,
}

/// A multipart body reduced to its text fields plus at most one image file.
#[derive(Default)]
pub struct ParsedForm {
    pub fields: HashMap<String, String>,
    pub file: Option<FilePart>,
}

impl ParsedForm {
    /// Non-blank text field, trimmed.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Read every field; the one named `file_field` must be an image if present.
pub async fn read_form(mut multipart: Multipart, file_field: &str) -> Result<ParsedForm, ApiError> {
    let mut form = ParsedForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        if name == file_field {
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_default();
            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                continue;
            }
            if image_extension(&content_type).is_none() {
                return Err(ApiError::validation("Only PNG, JPEG, GIF or WebP images are allowed"));
            }
            form.file = Some(FilePart { content_type, bytes });
        } else if !name.is_empty() {
            let value = field.text().await?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
