use crate::error::{Result, RetrievalError};

/// Per-search settings. Validated eagerly, never clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    /// `None` falls back to the engine's default namespace.
    pub namespace: Option<String>,
}

impl SearchOptions {
    pub fn new(top_k: usize) -> Self {
        SearchOptions {
            top_k,
            score_threshold: None,
            namespace: None,
        }
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RetrievalError::invalid("top_k must be greater than zero"));
        }
        if let Some(threshold) = self.score_threshold {
            validate_threshold(threshold)?;
        }
        Ok(())
    }

    /// Namespace to query, given the engine default. Empty string is the backend default.
    pub fn resolve_namespace<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }

    /// True when `score` survives the threshold, if any.
    pub(crate) fn passes(&self, score: f32) -> bool {
        match self.score_threshold {
            // NaN never passes
            Some(threshold) => score >= threshold,
            None => true,
        }
    }
}

pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(RetrievalError::invalid(format!(
            "score threshold must be within [0, 1], got {threshold}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_top_k() {
        let err = SearchOptions::new(0).validate().unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        for t in [-0.8, 1.8, -f32::EPSILON, 1.0001, f32::NAN, f32::INFINITY] {
            let opts = SearchOptions::new(3).with_score_threshold(t);
            assert!(opts.validate().unwrap_err().is_invalid_argument(), "threshold {t}");
        }
    }

    #[test]
    fn accepts_boundary_thresholds() {
        for t in [0.0, 0.5, 1.0] {
            assert!(SearchOptions::new(1).with_score_threshold(t).validate().is_ok());
        }
    }

    #[test]
    fn namespace_falls_back_to_default() {
        let opts = SearchOptions::new(1);
        assert_eq!(opts.resolve_namespace("base"), "base");
        let opts = opts.with_namespace("");
        assert_eq!(opts.resolve_namespace("base"), "");
    }

    #[test]
    fn threshold_drops_strictly_lower_scores() {
        let opts = SearchOptions::new(1).with_score_threshold(0.8);
        assert!(opts.passes(0.8));
        assert!(opts.passes(0.95));
        assert!(!opts.passes(0.79));
        assert!(!opts.passes(f32::NAN));
        assert!(SearchOptions::new(1).passes(0.0));
    }
}
