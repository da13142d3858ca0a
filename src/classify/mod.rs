//! Repository qualification and file classification
//!
//! This module decides whether a repository qualifies (its dependency manifest names the
//! required frameworks) and sorts the blobs of its file tree into test files, source
//! files, or neither. It also owns decoding of the base64 file bodies the content API
//! returns.

mod decode;
mod manifest;
mod paths;

pub use decode::{decode_base64, decode_content, decode_text, DecodeError, DecodePolicy};
pub use manifest::ManifestFilter;
pub use paths::{FileClass, FileClassifier, Partition, TreeEntry};
