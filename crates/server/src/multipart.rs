//! Multipart forms used by the content and profile endpoints. Text parts become
//! fields of the request DTO; parts carrying a file name are image uploads.

use std::collections::HashMap;

use axum::extract::Multipart;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use services::services::{
    content::image_change_from,
    image::{ImageChange, ImageUpload},
};

use crate::error::ApiError;

pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: Map<String, Value>,
    files: HashMap<String, ImageUpload>,
}

/// `null` clears nullable fields such as dates; every other value stays text.
fn field_value(text: String) -> Value {
    if text == "null" {
        Value::Null
    } else {
        Value::String(text)
    }
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                // Browsers send an empty part for an untouched file input.
                if !bytes.is_empty() {
                    form.files
                        .insert(name, ImageUpload::new(file_name, content_type, bytes));
                }
            } else {
                let text = field.text().await?;
                form.fields.insert(name, field_value(text));
            }
        }
        Ok(form)
    }

    /// Fills `name` when the client left it out.
    pub fn default_field(&mut self, name: &str, value: &str) {
        self.fields
            .entry(name.to_string())
            .or_insert_with(|| Value::String(value.to_string()));
    }

    /// Image change for the file part `field`, honouring a `remove_<field>=true` flag.
    pub fn take_image(&mut self, field: &str) -> ImageChange {
        let remove = self
            .fields
            .remove(&format!("remove_{field}"))
            .is_some_and(|v| v.as_str().is_some_and(|s| s.trim().eq_ignore_ascii_case("true")));
        image_change_from(self.files.remove(field), remove)
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| ApiError::BadRequest(format!("invalid form: {e}")))
    }
}
