use cos_types::WriteConcern;

/// Per-call write-concern override.
///
/// Either field may be set. A structured concern takes precedence over the
/// legacy `safe` flag; with neither set the store's configured concern applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub write_concern: Option<WriteConcern>,
    pub safe: Option<bool>,
}

impl WriteOptions {
    /// Override with a structured write concern.
    pub fn concern(write_concern: WriteConcern) -> Self {
        Self {
            write_concern: Some(write_concern),
            safe: None,
        }
    }

    /// Override with the legacy boolean flag.
    pub fn safe(safe: bool) -> Self {
        Self {
            write_concern: None,
            safe: Some(safe),
        }
    }
}

/// Reconciles the store's configured write concern with per-call overrides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteConcernResolver {
    configured: WriteConcern,
}

impl WriteConcernResolver {
    pub fn new(configured: WriteConcern) -> Self {
        Self { configured }
    }

    /// The concern used when a call supplies no override.
    pub fn configured(&self) -> WriteConcern {
        self.configured
    }

    /// The write concern one operation runs with.
    ///
    /// `safe: true` means "at least acknowledged": an already-acknowledged
    /// configured concern (e.g. majority) is kept rather than weakened to
    /// `w = 1`.
    pub fn resolve(&self, options: &WriteOptions) -> WriteConcern {
        match (options.write_concern, options.safe) {
            (Some(concern), _) => concern,
            (None, Some(true)) if self.configured.is_acknowledged() => self.configured,
            (None, Some(safe)) => WriteConcern::from_legacy_safe(safe),
            (None, None) => self.configured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_override_uses_configured() {
        let resolver = WriteConcernResolver::new(WriteConcern::MAJORITY);
        assert_eq!(resolver.resolve(&WriteOptions::default()), WriteConcern::MAJORITY);
    }

    #[test]
    fn structured_override_wins() {
        let resolver = WriteConcernResolver::new(WriteConcern::ACKNOWLEDGED);
        let options = WriteOptions {
            write_concern: Some(WriteConcern::UNACKNOWLEDGED),
            safe: Some(true),
        };
        assert_eq!(resolver.resolve(&options), WriteConcern::UNACKNOWLEDGED);
    }

    #[test]
    fn legacy_false_disables_acknowledgment() {
        let resolver = WriteConcernResolver::new(WriteConcern::MAJORITY);
        assert_eq!(
            resolver.resolve(&WriteOptions::safe(false)),
            WriteConcern::UNACKNOWLEDGED
        );
    }

    #[test]
    fn legacy_true_upgrades_unacknowledged() {
        let resolver = WriteConcernResolver::new(WriteConcern::UNACKNOWLEDGED);
        assert_eq!(
            resolver.resolve(&WriteOptions::safe(true)),
            WriteConcern::ACKNOWLEDGED
        );
    }

    #[test]
    fn legacy_true_keeps_stronger_configured_concern() {
        let resolver = WriteConcernResolver::new(WriteConcern::MAJORITY);
        assert_eq!(resolver.resolve(&WriteOptions::safe(true)), WriteConcern::MAJORITY);
    }
}
