//! Per-file building blocks: walking, metadata, fingerprints.

pub mod exif;
pub mod fingerprint;
pub mod hash;
pub mod image;
pub mod perceptual;
pub mod scanner;
