use crate::types::{Action, Role, RoleSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("unknown identity: {0}")]
    Unauthenticated(String),

    #[error("team not found: {0}")]
    TeamNotFound(String),

    #[error("'{identity}' is not a member of team '{team}'")]
    NotTeamMember { identity: String, team: String },

    #[error("role '{role}' may not {action} on team '{team}' (requires one of: {required})")]
    RoleNotPermitted {
        role: Role,
        action: Action,
        team: String,
        required: RoleSet,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("scheduled dispatch not found: {0}")]
    ScheduleNotFound(String),

    #[error("invalid config:\n{0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FleetError {
    /// True for the authorization failures that map to Forbidden.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            FleetError::NotTeamMember { .. } | FleetError::RoleNotPermitted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
