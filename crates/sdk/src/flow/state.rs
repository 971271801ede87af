use std::fmt;

/// Stage of one login cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    Initiating,
    AwaitingProvider,
    Returned,
    Succeeded,
    Failed,
}

impl LoginState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Initiating)
                | (Self::Initiating, Self::AwaitingProvider | Self::Failed)
                | (Self::AwaitingProvider, Self::Returned)
                | (Self::Returned, Self::Succeeded | Self::Failed)
        )
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initiating => "initiating",
            Self::AwaitingProvider => "awaiting_provider",
            Self::Returned => "returned",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-request view of a login cycle.
///
/// The two halves of a cycle run in different requests; the callback half
/// picks up at `AwaitingProvider`.
#[derive(Debug)]
pub struct LoginCycle {
    source: String,
    state: LoginState,
}

impl LoginCycle {
    pub fn start(source: &str) -> Self {
        Self {
            source: source.to_string(),
            state: LoginState::Idle,
        }
    }

    pub fn resume(source: &str) -> Self {
        Self {
            source: source.to_string(),
            state: LoginState::AwaitingProvider,
        }
    }

    pub const fn state(&self) -> LoginState {
        self.state
    }

    /// Move to `next`; returns false and stays put on an illegal transition
    pub fn advance(&mut self, next: LoginState) -> bool {
        if !self.state.can_advance_to(next) {
            tracing::warn!(
                source = %self.source,
                from = %self.state,
                to = %next,
                "Ignoring illegal login transition"
            );
            return false;
        }
        tracing::debug!(source = %self.source, from = %self.state, to = %next, "Login transition");
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_success_path() {
        let mut cycle = LoginCycle::start("google");
        assert!(cycle.advance(LoginState::Initiating));
        assert!(cycle.advance(LoginState::AwaitingProvider));

        let mut callback = LoginCycle::resume("google");
        assert!(callback.advance(LoginState::Returned));
        assert!(callback.advance(LoginState::Succeeded));
        assert!(callback.state().is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut cycle = LoginCycle::resume("google");
        cycle.advance(LoginState::Returned);
        cycle.advance(LoginState::Failed);

        assert!(!cycle.advance(LoginState::Succeeded));
        assert_eq!(cycle.state(), LoginState::Failed);
    }

    #[test]
    fn test_cannot_skip_provider() {
        let mut cycle = LoginCycle::start("google");
        assert!(!cycle.advance(LoginState::Returned));
        assert_eq!(cycle.state(), LoginState::Idle);
    }
}
