//! Readiness conditions and the fallback ladder
//!
//! The ladder is plain configuration: an ordered list of lifecycle event
//! names, where each entry's fallback is the entry after it. Browsers differ
//! in which names they emit and in which order, so nothing here assumes a
//! fixed set.

/// How a lifecycle event relates to the configured readiness condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The configured condition itself
    Reached,
    /// A ladder entry ahead of the configured one, reported out of order;
    /// accepted once the settle delay has passed
    Early,
    /// Not relevant to this wait
    Ignored,
}

/// Ordered readiness conditions, first entry is tried first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessLadder {
    steps: Vec<String>,
}

impl ReadinessLadder {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position(&self, condition: &str) -> Option<usize> {
        self.steps.iter().position(|step| step == condition)
    }

    pub fn contains(&self, condition: &str) -> bool {
        self.position(condition).is_some()
    }

    /// Returns the condition to retry with after `condition` timed out
    ///
    /// `None` when `condition` is the last step or not on the ladder.
    pub fn fallback(&self, condition: &str) -> Option<&str> {
        let position = self.position(condition)?;
        self.steps.get(position + 1).map(String::as_str)
    }

    /// Classifies a lifecycle event name against the configured condition
    pub fn classify(&self, configured: &str, event: &str) -> Readiness {
        if event == configured {
            return Readiness::Reached;
        }
        match (self.position(event), self.position(configured)) {
            (Some(event), Some(configured)) if event < configured => Readiness::Early,
            _ => Readiness::Ignored,
        }
    }
}
