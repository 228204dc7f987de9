use crate::fingerprint::Fingerprint;

/// Remembers the previous sample and reports how far the next one moved.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `current` as the new baseline and returns its difference from
    /// the old one, or `None` when there was no baseline.
    pub fn observe(&mut self, current: Fingerprint) -> Option<f32> {
        let difference = self
            .previous
            .as_ref()
            .map(|previous| previous.difference(&current));
        self.previous = Some(current);
        difference
    }

    /// `observe` folded against a threshold; the first sample counts as a change.
    pub fn changed(&mut self, current: Fingerprint, threshold: f32) -> bool {
        self.observe(current)
            .is_none_or(|difference| difference > threshold)
    }

    pub fn previous(&self) -> Option<&Fingerprint> {
        self.previous.as_ref()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
