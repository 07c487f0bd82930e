//! Whole-buffer message digests

use crate::buffer::PixelBuffer;
use crate::error::{PixelsError, Result};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Hash function folded over the pixels of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    /// Digest length in bytes
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = PixelsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            other => Err(PixelsError::InvalidConfiguration(format!(
                "unknown digest algorithm: {}",
                other
            ))),
        }
    }
}

/// Digest of every pixel of a buffer, read one timepoint at a time
pub fn calculate_digest(buffer: &mut dyn PixelBuffer, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
    let digest = match algorithm {
        DigestAlgorithm::Sha1 => fold::<Sha1>(buffer)?,
        DigestAlgorithm::Sha256 => fold::<Sha256>(buffer)?,
    };
    debug!(
        path = %buffer.path().display(),
        algorithm = %algorithm,
        "calculated pixel digest"
    );
    Ok(digest)
}

/// [`calculate_digest`] rendered as lowercase hex
pub fn calculate_hex_digest(buffer: &mut dyn PixelBuffer, algorithm: DigestAlgorithm) -> Result<String> {
    calculate_digest(buffer, algorithm).map(hex::encode)
}

fn fold<D: Digest>(buffer: &mut dyn PixelBuffer) -> Result<Vec<u8>> {
    let mut hasher = D::new();
    for t in 0..buffer.geometry().size_t {
        // every t below size_t is in bounds
        let timepoint = buffer.get_timepoint(t).map_err(|e| match e {
            PixelsError::OutOfBounds(message) => {
                PixelsError::Internal(format!("timepoint {} rejected: {}", t, message))
            }
            other => other,
        })?;
        hasher.update(timepoint.as_bytes());
    }
    Ok(hasher.finalize().to_vec())
}
