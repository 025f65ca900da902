use parkalot_core::{AppConfig, Detection};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_FREE_CLASSES: [&str; 2] = ["empty", "free"];

/// Reduces detections to a free-space count.
///
/// A detection counts when its class names a free space (case-insensitive)
/// and its confidence is at least the threshold. NaN confidences never count.
#[derive(Debug, Clone)]
pub struct AvailabilityCounter {
    threshold: f64,
    free_classes: Vec<String>,
}

impl Default for AvailabilityCounter {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONFIDENCE_THRESHOLD,
            DEFAULT_FREE_CLASSES.iter().map(ToString::to_string),
        )
    }
}

impl AvailabilityCounter {
    #[must_use]
    pub fn new(threshold: f64, free_classes: impl IntoIterator<Item = String>) -> Self {
        Self {
            threshold,
            free_classes: free_classes
                .into_iter()
                .map(|c| c.to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.confidence_threshold, config.free_classes.clone())
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn is_free(&self, detection: &Detection) -> bool {
        detection.confidence >= self.threshold
            && self
                .free_classes
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&detection.class))
    }

    #[must_use]
    pub fn count(&self, detections: &[Detection]) -> u32 {
        let free = detections.iter().filter(|d| self.is_free(d)).count();
        u32::try_from(free).unwrap_or(u32::MAX)
    }
}

/// Count with the default free classes and the given threshold.
#[must_use]
pub fn count_available(detections: &[Detection], threshold: f64) -> u32 {
    AvailabilityCounter::new(
        threshold,
        DEFAULT_FREE_CLASSES.iter().map(ToString::to_string),
    )
    .count(detections)
}
