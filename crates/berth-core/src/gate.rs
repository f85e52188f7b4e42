use berth_schema::parse_major_version;

/// Result of one compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCheck {
    pub eligible: bool,
    /// True exactly when `eligible` differs from the previously stored
    /// value. Callers flip the project's enabled flag and warn only then.
    pub transitioned: bool,
}

/// Gates a project on the declared build-tool plugin version.
///
/// Eligibility requires the declared major version to reach the configured
/// minimum; missing or unparsable versions fail closed. The gate remembers
/// the last computed eligibility so that repeated checks with the same
/// outcome never report a transition.
#[derive(Debug, Clone)]
pub struct CompatibilityGate {
    minimum_major: u32,
    eligible: bool,
}

impl CompatibilityGate {
    /// Projects start eligible; the first check against a bad version is a
    /// transition.
    pub fn new(minimum_major: u32) -> Self {
        Self {
            minimum_major,
            eligible: true,
        }
    }

    pub fn eligible(&self) -> bool {
        self.eligible
    }

    pub fn check(&mut self, declared: Option<&str>) -> VersionCheck {
        let eligible = declared
            .and_then(parse_major_version)
            .is_some_and(|major| major >= self.minimum_major);
        let transitioned = eligible != self.eligible;
        self.eligible = eligible;
        VersionCheck {
            eligible,
            transitioned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_version_stays_eligible_without_transition() {
        let mut gate = CompatibilityGate::new(4);
        let check = gate.check(Some("4.1.0"));
        assert!(check.eligible);
        assert!(!check.transitioned);
    }

    #[test]
    fn old_version_transitions_once() {
        let mut gate = CompatibilityGate::new(4);

        let first = gate.check(Some("3.2.0"));
        assert!(!first.eligible);
        assert!(first.transitioned);

        let second = gate.check(Some("3.2.0"));
        assert!(!second.eligible);
        assert!(!second.transitioned);
    }

    #[test]
    fn upgrade_transitions_back_to_eligible() {
        let mut gate = CompatibilityGate::new(4);
        gate.check(Some("3.0.0"));
        let check = gate.check(Some("5.0.0"));
        assert!(check.eligible);
        assert!(check.transitioned);
    }

    #[test]
    fn missing_version_fails_closed() {
        let mut gate = CompatibilityGate::new(4);
        let check = gate.check(None);
        assert!(!check.eligible);
        assert!(check.transitioned);
    }

    #[test]
    fn malformed_version_fails_closed() {
        let mut gate = CompatibilityGate::new(4);
        let check = gate.check(Some("not-a-version"));
        assert!(!check.eligible);
        assert!(check.transitioned);
    }
}
