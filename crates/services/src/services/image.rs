//! Validation of uploaded images, shared by every resource that stores one.

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image is empty")]
    Empty,
    #[error("image is {size} bytes, the limit is {MAX_IMAGE_BYTES} bytes (5MB)")]
    TooLarge { size: usize },
    #[error("unsupported image type {0}; allowed: jpeg, png, webp")]
    UnsupportedType(String),
    #[error("file content does not match declared type {0}")]
    ContentMismatch(String),
}

/// An image received from a form upload or produced by the image generator.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// An upload that passed [`ImageUpload::validate`].
#[derive(Debug, Clone)]
pub struct ValidImage {
    pub content_type: &'static str,
    pub extension: &'static str,
    pub bytes: Bytes,
}

impl ValidImage {
    /// Collision-free object name, e.g. `3f2c….webp`.
    pub fn object_name(&self) -> String {
        format!("{}.{}", Uuid::new_v4(), self.extension)
    }
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Declared content type, falling back to a guess from the file name.
    fn declared_type(&self) -> String {
        self.content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
            .or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first_raw()
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    pub fn validate(&self) -> Result<ValidImage, ImageError> {
        if self.bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImageError::TooLarge {
                size: self.bytes.len(),
            });
        }

        let declared = self.declared_type();
        let (content_type, extension) = match declared.as_str() {
            "image/jpeg" | "image/jpg" => ("image/jpeg", "jpg"),
            "image/png" => ("image/png", "png"),
            "image/webp" => ("image/webp", "webp"),
            _ => return Err(ImageError::UnsupportedType(declared)),
        };

        if sniff(&self.bytes) != Some(content_type) {
            return Err(ImageError::ContentMismatch(content_type.to_string()));
        }

        Ok(ValidImage {
            content_type,
            extension,
            bytes: self.bytes.clone(),
        })
    }
}

fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// What an update does to a stored image.
#[derive(Debug, Clone, Default)]
pub enum ImageChange {
    #[default]
    Keep,
    Remove,
    Replace(ImageUpload),
}

impl ImageChange {
    pub fn is_keep(&self) -> bool {
        matches!(self, ImageChange::Keep)
    }

    /// The new upload, if any. Used by create paths where only `Replace` applies.
    pub fn into_upload(self) -> Option<ImageUpload> {
        match self {
            ImageChange::Replace(upload) => Some(upload),
            ImageChange::Keep | ImageChange::Remove => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use bytes::Bytes;

    use super::ImageUpload;

    pub fn png(len: usize) -> ImageUpload {
        let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
        data.resize(len.max(8), 0);
        ImageUpload::new("photo.png", Some("image/png".into()), Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::{fixtures::png, *};

    #[test]
    fn accepts_allowed_types() {
        let valid = png(64).validate().unwrap();
        assert_eq!(valid.content_type, "image/png");
        assert!(valid.object_name().ends_with(".png"));

        let mut webp = b"RIFF\0\0\0\0WEBPVP8 ".to_vec();
        webp.resize(32, 0);
        let upload = ImageUpload::new("x.webp", None, Bytes::from(webp));
        assert_eq!(upload.validate().unwrap().extension, "webp");
    }

    #[test]
    fn rejects_oversized() {
        let err = png(MAX_IMAGE_BYTES + 1).validate().unwrap_err();
        assert_eq!(err, ImageError::TooLarge { size: MAX_IMAGE_BYTES + 1 });
    }

    #[test]
    fn rejects_wrong_type_and_spoofed_content() {
        let gif = ImageUpload::new("a.gif", Some("image/gif".into()), Bytes::from_static(b"GIF89a"));
        assert!(matches!(gif.validate(), Err(ImageError::UnsupportedType(_))));

        let spoofed = ImageUpload::new("a.png", Some("image/png".into()), Bytes::from_static(b"<svg/>"));
        assert!(matches!(spoofed.validate(), Err(ImageError::ContentMismatch(_))));

        let empty = ImageUpload::new("a.png", None, Bytes::new());
        assert_eq!(empty.validate().unwrap_err(), ImageError::Empty);
    }
}
