//! Event image upload types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One image file, carried inline as unpadded base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

/// How newly uploaded images combine with the ones an event already has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    /// Keep existing images and append the new ones.
    #[default]
    Merge,
    /// Drop existing images.
    Replace,
}

/// A header image plus additional images submitted together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBatch {
    #[serde(default)]
    pub header: Option<ImageUpload>,
    #[serde(default)]
    pub additional: Vec<ImageUpload>,
    #[serde(default)]
    pub mode: ImageMode,
}

impl ImageBatch {
    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.additional.is_empty()
    }
}

/// URLs returned by the image store for one upload batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImages {
    #[serde(default)]
    pub header_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

mod base64_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&fast32::base64::RFC4648_NOPAD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = fast32::base64::RFC4648_NOPAD
            .decode_str(encoded.trim_end_matches('='))
            .map_err(|_| serde::de::Error::custom("invalid base64 image data"))?;
        Ok(Bytes::from(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_data_accepts_padded_and_unpadded_base64() {
        let padded: ImageUpload = serde_json::from_str(
            r#"{"file_name":"a.png","content_type":"image/png","data":"aGk="}"#,
        )
        .unwrap();
        let unpadded: ImageUpload = serde_json::from_str(
            r#"{"file_name":"a.png","content_type":"image/png","data":"aGk"}"#,
        )
        .unwrap();
        assert_eq!(padded.data, Bytes::from_static(b"hi"));
        assert_eq!(padded, unpadded);
    }

    #[test]
    fn batch_defaults_to_merge() {
        let batch: ImageBatch = serde_json::from_str("{}").unwrap();
        assert_eq!(batch.mode, ImageMode::Merge);
        assert!(batch.is_empty());
    }
}
