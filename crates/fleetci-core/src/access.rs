//! Role and team permission checks for mutating actions.
//!
//! Authentication maps an identity to a [`Principal`] through the static user
//! registry. Authorization of a mutating action against a team checks, in
//! order: the team exists, the caller is a member, the caller's role is in
//! the team's permitted set for that action.
//!
//! Read and listing operations never call [`AccessControl::authorize`]; they
//! only require an authenticated principal and may look at any team.

use crate::config::{Config, TeamConfig};
use crate::error::{FleetError, Result};
use crate::types::{Action, Role, RoleSet};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub identity: String,
    pub role: Role,
    pub teams: BTreeSet<String>,
}

impl Principal {
    pub fn is_member(&self, team: &str) -> bool {
        self.teams.contains(team)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    users: HashMap<String, Principal>,
    teams: BTreeMap<String, TeamConfig>,
}

impl AccessControl {
    pub fn from_config(config: &Config) -> Self {
        let users = config
            .users
            .iter()
            .map(|u| {
                (
                    u.identity.clone(),
                    Principal {
                        identity: u.identity.clone(),
                        role: u.role,
                        teams: u.teams.clone(),
                    },
                )
            })
            .collect();
        Self {
            users,
            teams: config.teams.clone(),
        }
    }

    pub fn authenticate(&self, identity: &str) -> Result<Principal> {
        self.users
            .get(identity)
            .cloned()
            .ok_or_else(|| FleetError::Unauthenticated(identity.to_string()))
    }

    pub fn team(&self, name: &str) -> Result<&TeamConfig> {
        self.teams
            .get(name)
            .ok_or_else(|| FleetError::TeamNotFound(name.to_string()))
    }

    /// Roles allowed to perform `action` on `team`; empty when unconfigured.
    pub fn required_roles(&self, team: &str, action: Action) -> Result<RoleSet> {
        Ok(self
            .team(team)?
            .permissions
            .get(&action)
            .cloned()
            .unwrap_or_default())
    }

    pub fn authorize(&self, principal: &Principal, team: &str, action: Action) -> Result<()> {
        let required = self.required_roles(team, action)?;
        if !principal.is_member(team) {
            return Err(FleetError::NotTeamMember {
                identity: principal.identity.clone(),
                team: team.to_string(),
            });
        }
        if !required.contains(principal.role) {
            return Err(FleetError::RoleNotPermitted {
                role: principal.role,
                action,
                team: team.to_string(),
                required,
            });
        }
        Ok(())
    }

    /// Succeeds if `action` is permitted on at least one of `teams`; otherwise
    /// returns the failure for the first team checked.
    pub fn authorize_any<'a>(
        &self,
        principal: &Principal,
        teams: impl IntoIterator<Item = &'a str>,
        action: Action,
    ) -> Result<()> {
        let mut first_err = None;
        for team in teams {
            match self.authorize(principal, team, action) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        Err(first_err.unwrap_or_else(|| {
            FleetError::TeamNotFound("no team owns this repository".to_string())
        }))
    }
}
