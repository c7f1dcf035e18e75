//! Login phase of a console session.

use rcon_telnet_common::traits::FiniteStateMachine;

use crate::context::AuthOutcome;

/// Login attempts a connection gets before it is turned away.
pub const AUTH_ATTEMPT_LIMIT: usize = 10;

/// Where a connection is in the login exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPhase {
    #[default]
    AwaitingPassword,
    Success,
    Failure,
    TooManyAttempts,
}

/// Attempt bookkeeping carried alongside [`AuthPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempts {
    pub made: usize,
    pub limit: usize,
}

impl Default for Attempts {
    fn default() -> Self {
        Self {
            made: 0,
            limit: AUTH_ATTEMPT_LIMIT,
        }
    }
}

impl Attempts {
    /// Whether the attempt being handled now is the final one allowed.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.made + 1 >= self.limit
    }
}

impl FiniteStateMachine for AuthPhase {
    type Input = AuthOutcome;
    type Context = Attempts;

    fn transition(self, outcome: AuthOutcome, attempts: &mut Attempts) -> Self {
        if self.is_terminal() {
            return self;
        }

        attempts.made += 1;

        match outcome {
            AuthOutcome {
                terminal: true,
                success: true,
            } => Self::Success,
            AuthOutcome { terminal: true, .. } => Self::Failure,
            _ if attempts.made >= attempts.limit => Self::TooManyAttempts,
            _ => Self::AwaitingPassword,
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, Self::AwaitingPassword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETRY: AuthOutcome = AuthOutcome {
        success: false,
        terminal: false,
    };

    #[test]
    fn correct_password_succeeds() {
        let mut attempts = Attempts::default();
        let phase = AuthPhase::default().transition(
            AuthOutcome {
                success: true,
                terminal: true,
            },
            &mut attempts,
        );

        assert_eq!(phase, AuthPhase::Success);
        assert_eq!(attempts.made, 1);
    }

    #[test]
    fn terminal_failure_stops_immediately() {
        let mut attempts = Attempts::default();
        let phase = AuthPhase::AwaitingPassword.transition(
            AuthOutcome {
                success: false,
                terminal: true,
            },
            &mut attempts,
        );

        assert_eq!(phase, AuthPhase::Failure);
        assert!(phase.is_terminal());
    }

    #[test]
    fn retries_until_limit() {
        let mut attempts = Attempts::default();
        let mut phase = AuthPhase::AwaitingPassword;

        for _ in 1..AUTH_ATTEMPT_LIMIT {
            phase = phase.transition(RETRY, &mut attempts);
            assert_eq!(phase, AuthPhase::AwaitingPassword);
        }

        assert!(attempts.is_last());
        phase = phase.transition(RETRY, &mut attempts);
        assert_eq!(phase, AuthPhase::TooManyAttempts);
        assert_eq!(attempts.made, AUTH_ATTEMPT_LIMIT);
    }

    #[test]
    fn terminal_states_ignore_input() {
        let mut attempts = Attempts::default();
        let phase = AuthPhase::Failure.transition(
            AuthOutcome {
                success: true,
                terminal: true,
            },
            &mut attempts,
        );

        assert_eq!(phase, AuthPhase::Failure);
        assert_eq!(attempts.made, 0);
    }
}
