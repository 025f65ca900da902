//! Deterministic detections for local runs and tests.

use async_trait::async_trait;
use parkalot_core::Detection;
use sha2::{Digest, Sha256};

use crate::adapter::{ImageRef, InferenceAdapter};
use crate::error::InferenceError;

const DEFAULT_SLOTS: usize = 20;
const GRID_COLUMNS: usize = 5;
const SLOT_WIDTH: f64 = 100.0;
const SLOT_HEIGHT: f64 = 50.0;

/// Derives one detection per parking slot from a SHA-256 digest of the
/// image bytes, so identical images always produce identical detections.
///
/// The image must still be readable; a missing file fails exactly like a
/// real backend would.
#[derive(Debug, Clone)]
pub struct StubAdapter {
    slots: usize,
}

impl Default for StubAdapter {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS,
        }
    }
}

impl StubAdapter {
    #[must_use]
    pub fn with_slots(slots: usize) -> Self {
        Self { slots }
    }
}

fn detections_for(bytes: &[u8], slots: usize) -> Vec<Detection> {
    let digest = Sha256::digest(bytes);
    (0..slots)
        .map(|i| {
            #[allow(clippy::cast_possible_truncation)]
            let spin = (i / digest.len()) as u32;
            let class_byte = digest[i % digest.len()].rotate_left(spin);
            let confidence_byte = digest[(i + digest.len() / 2) % digest.len()];

            #[allow(clippy::cast_precision_loss)]
            let (col, row) = ((i % GRID_COLUMNS) as f64, (i / GRID_COLUMNS) as f64);
            let (class, class_id) = if class_byte & 1 == 0 {
                ("empty", 0)
            } else {
                ("occupied", 1)
            };

            Detection {
                class: class.to_string(),
                class_id: Some(class_id),
                confidence: f64::from(confidence_byte) / 255.0,
                x: col * SLOT_WIDTH + SLOT_WIDTH / 2.0,
                y: row * SLOT_HEIGHT + SLOT_HEIGHT / 2.0,
                width: SLOT_WIDTH,
                height: SLOT_HEIGHT,
            }
        })
        .collect()
}

#[async_trait]
impl InferenceAdapter for StubAdapter {
    async fn infer(&self, image: &ImageRef) -> Result<Vec<Detection>, InferenceError> {
        let bytes = image.read().await?;
        tracing::debug!(image = %image.name(), size = bytes.len(), "stub inference");
        Ok(detections_for(&bytes, self.slots))
    }
}
