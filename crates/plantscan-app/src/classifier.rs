//! Plant / non-plant pre-filter seam
//!
//! The classifier itself lives outside this workspace. The analysis service
//! consults it, when one is attached, before building any prompt.

/// Decides whether an image shows a plant at all.
///
/// Implementations fail open: when the model behind them is unavailable they
/// return `true` so the analysis still runs.
pub trait PlantClassifier: Send + Sync {
    fn is_plant(&self, image: &[u8]) -> bool;
}

impl<F> PlantClassifier for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn is_plant(&self, image: &[u8]) -> bool {
        self(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_closure_classifier() {
        let reject_empty: Arc<dyn PlantClassifier> = Arc::new(|image: &[u8]| !image.is_empty());
        assert!(reject_empty.is_plant(b"leaf"));
        assert!(!reject_empty.is_plant(b""));
    }
}
