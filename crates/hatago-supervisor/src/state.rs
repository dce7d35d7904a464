//! The per-upstream state machine.

use hatago_support::HatagoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamState {
    Inactive,
    Activating,
    Active,
    Idling,
    Stopping,
    Error,
    Cooldown,
}

impl UpstreamState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Activating => "ACTIVATING",
            Self::Active => "ACTIVE",
            Self::Idling => "IDLING",
            Self::Stopping => "STOPPING",
            Self::Error => "ERROR",
            Self::Cooldown => "COOLDOWN",
        }
    }

    /// True when an upstream in this state owns a live transport handle.
    pub fn has_transport(self) -> bool {
        matches!(
            self,
            Self::Activating | Self::Active | Self::Idling | Self::Stopping
        )
    }

    fn allowed_next(self) -> &'static [UpstreamState] {
        use UpstreamState::*;
        match self {
            Inactive => &[Activating, Cooldown],
            Activating => &[Active, Error],
            Active => &[Idling, Stopping, Error],
            Idling => &[Active, Stopping],
            Stopping => &[Inactive, Error],
            Error => &[Cooldown, Inactive],
            Cooldown => &[Activating, Inactive],
        }
    }

    /// Validate `self -> next`. An invalid transition is a programming
    /// error, never a recoverable one: the state machine is closed and
    /// every caller is expected to only request reachable transitions.
    pub fn validate_transition(self, next: UpstreamState, server_id: &str) -> Result<(), HatagoError> {
        if self.allowed_next().contains(&next) {
            Ok(())
        } else {
            Err(HatagoError::State {
                server_id: server_id.to_string(),
                from: self.label().to_string(),
                to: next.label().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_to_activating_is_allowed() {
        assert!(UpstreamState::Inactive
            .validate_transition(UpstreamState::Activating, "srv1")
            .is_ok());
    }

    #[test]
    fn active_to_cooldown_is_rejected() {
        let err = UpstreamState::Active
            .validate_transition(UpstreamState::Cooldown, "srv1")
            .unwrap_err();
        assert!(matches!(err, HatagoError::State { .. }));
    }

    #[test]
    fn transport_presence_matches_invariant() {
        assert!(UpstreamState::Active.has_transport());
        assert!(!UpstreamState::Inactive.has_transport());
        assert!(!UpstreamState::Error.has_transport());
    }
}
