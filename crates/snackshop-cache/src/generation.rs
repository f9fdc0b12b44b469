//! Resource generations: versioned snapshots of the cached app shell.

const PARTITION_PREFIX: &str = "snackshop";

/// Lifecycle of one resource generation.
///
/// Exactly one generation is `Active` at a time; a `Superseded` generation's
/// partitions are deleted on the next activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    Installing,
    /// Fully populated and waiting for activation.
    Installed,
    Activating,
    Active,
    Superseded,
}

/// A versioned snapshot of cached static resources, activated atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    version: String,
    phase: GenerationPhase,
}

impl Generation {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            phase: GenerationPhase::Installing,
        }
    }

    /// Reconstruct the generation recorded as active in the store.
    pub fn resumed_active(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            phase: GenerationPhase::Active,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn phase(&self) -> GenerationPhase {
        self.phase
    }

    /// Partition holding the pre-fetched app shell.
    pub fn static_partition(&self) -> String {
        format!("{PARTITION_PREFIX}-static-{}", self.version)
    }

    /// Partition holding responses cached as they are fetched.
    pub fn dynamic_partition(&self) -> String {
        format!("{PARTITION_PREFIX}-dynamic-{}", self.version)
    }

    pub fn mark_installed(&mut self) {
        debug_assert_eq!(self.phase, GenerationPhase::Installing);
        self.phase = GenerationPhase::Installed;
    }

    pub fn mark_activating(&mut self) {
        debug_assert!(matches!(
            self.phase,
            GenerationPhase::Installed | GenerationPhase::Installing
        ));
        self.phase = GenerationPhase::Activating;
    }

    pub fn mark_active(&mut self) {
        debug_assert_eq!(self.phase, GenerationPhase::Activating);
        self.phase = GenerationPhase::Active;
    }

    pub fn mark_superseded(&mut self) {
        self.phase = GenerationPhase::Superseded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_names_embed_version() {
        let generation = Generation::new("2.0.0");
        assert_eq!(generation.static_partition(), "snackshop-static-2.0.0");
        assert_eq!(generation.dynamic_partition(), "snackshop-dynamic-2.0.0");
        assert_eq!(generation.phase(), GenerationPhase::Installing);
    }

    #[test]
    fn phase_walk() {
        let mut generation = Generation::new("2.0.0");
        generation.mark_installed();
        assert_eq!(generation.phase(), GenerationPhase::Installed);
        generation.mark_activating();
        generation.mark_active();
        assert_eq!(generation.phase(), GenerationPhase::Active);
        generation.mark_superseded();
        assert_eq!(generation.phase(), GenerationPhase::Superseded);
    }
}
