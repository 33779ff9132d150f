use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, or sleeping after an empty poll
    Idle,
    /// Waiting on the queue
    Polling,
    /// Resolving and executing one message
    Dispatching,
    /// Outcome recorded, message deleted
    Completing,
    /// Message visibility deferred for redelivery
    Retrying,
    /// Waiting out the shutdown checkpoints
    Halting,
    Stopped,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Check whether the loop may move from this state to `next`
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Idle, Polling) => true,
            (Polling, Idle | Dispatching) => true,
            (Dispatching, Completing | Retrying | Halting) => true,
            (Completing | Retrying, Polling | Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Polling => write!(f, "polling"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Completing => write!(f, "completing"),
            Self::Retrying => write!(f, "retrying"),
            Self::Halting => write!(f, "halting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for WorkerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "polling" => Ok(Self::Polling),
            "dispatching" => Ok(Self::Dispatching),
            "completing" => Ok(Self::Completing),
            "retrying" => Ok(Self::Retrying),
            "halting" => Ok(Self::Halting),
            "stopped" => Ok(Self::Stopped),
            _ => Err(format!("Invalid worker state: {s}")),
        }
    }
}

/// Why a worker asked its host process to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    InternalError,
    Infrastructure,
    Halted,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InternalError => write!(f, "internal error"),
            Self::Infrastructure => write!(f, "data store failure"),
            Self::Halted => write!(f, "shutdown requested"),
        }
    }
}

/// Instruction returned to the loop after each message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Terminate(TerminationReason),
}

impl LoopControl {
    pub fn should_terminate(&self) -> bool {
        matches!(self, Self::Terminate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use WorkerState::*;
        assert!(Idle.can_transition_to(Polling));
        assert!(Polling.can_transition_to(Dispatching));
        assert!(Dispatching.can_transition_to(Completing));
        assert!(Completing.can_transition_to(Polling));
        assert!(Dispatching.can_transition_to(Halting));
        assert!(Halting.can_transition_to(Stopped));
    }

    #[test]
    fn test_invalid_transitions() {
        use WorkerState::*;
        assert!(!Idle.can_transition_to(Dispatching));
        assert!(!Halting.can_transition_to(Polling));
        assert!(!Stopped.can_transition_to(Idle));
        assert!(Stopped.is_terminal());
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(WorkerState::Dispatching.to_string(), "dispatching");
        assert_eq!("retrying".parse::<WorkerState>().unwrap(), WorkerState::Retrying);
        assert!("busy".parse::<WorkerState>().is_err());
    }
}
