//! Blob objects and their wire payload
//!
//! A blob holds one file's raw bytes. The remote receives the bytes as a
//! [`BlobPayload`] (base64 text plus an explicit encoding tag) and answers with
//! the blob's content address. Once placed in a tree the address travels as a
//! [`BlobRef`].
//!
//! ## Format
//!
//! Hashed as: `blob <size>\0<content>`

use crate::artifacts::objects::entry_mode::FileMode;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use derive_new::new;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Raw blob content, hashed the way git hashes blobs
#[derive(Debug, Clone, new)]
pub struct Blob {
    content: Bytes,
}

impl Packable for Blob {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut blob_bytes = Vec::with_capacity(self.content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), self.content.len());
        blob_bytes.write_all(header.as_bytes())?;
        blob_bytes.write_all(&self.content)?;

        Ok(Bytes::from(blob_bytes))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }
}

/// Encoding tag sent alongside blob content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobEncoding {
    #[serde(rename = "base64")]
    Base64,
    #[serde(rename = "utf-8")]
    Utf8,
}

/// Request body for blob creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobPayload {
    pub content: String,
    pub encoding: BlobEncoding,
}

impl BlobPayload {
    /// Base64-encode raw bytes; the only encoding the uploader produces
    pub fn encode(bytes: &[u8]) -> Self {
        Self {
            content: STANDARD.encode(bytes),
            encoding: BlobEncoding::Base64,
        }
    }

    pub fn decode(&self) -> anyhow::Result<Bytes> {
        match self.encoding {
            BlobEncoding::Base64 => {
                // the remote wraps base64 at 60 columns when echoing blobs back
                let compact = self
                    .content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect::<String>();
                Ok(Bytes::from(STANDARD.decode(compact)?))
            }
            BlobEncoding::Utf8 => Ok(Bytes::from(self.content.clone().into_bytes())),
        }
    }
}

/// A created blob, placed at a path; serializes as a tree entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct BlobRef {
    pub path: String,
    pub mode: FileMode,
    #[serde(rename = "type")]
    #[new(value = "ObjectType::Blob")]
    pub object_type: ObjectType,
    pub sha: ObjectId,
}
