//! Capability Table
//!
//! Every privileged operation is listed once in [`required_capability`],
//! and [`AccessControl::authorize`] is the only place a caller is checked
//! against it. Components never inspect roles themselves.

use crate::context::CallContext;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Protocol roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Governance: authorizes reserves, unpauses, tunes parameters
    Owner,
    /// Incident responders: may pause and clear pauses, never unpause
    EmergencyCouncil,
    /// Reserve attestation submitters
    Attester,
    /// Dispute resolution and oracle overrides
    Arbiter,
    /// Direct backing feed
    Oracle,
    /// Mints on behalf of a custodian
    Minter,
    /// Custodian lifecycle administration
    QcManager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Owner => "owner",
            Role::EmergencyCouncil => "emergency_council",
            Role::Attester => "attester",
            Role::Arbiter => "arbiter",
            Role::Oracle => "oracle",
            Role::Minter => "minter",
            Role::QcManager => "qc_manager",
        };
        f.write_str(s)
    }
}

/// Gated entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SubmitAttestation,
    RecordConsensusAttestation,
    OverrideAttestation,
    EmergencySetReserve,
    ResetConsensus,
    SetOracleParameters,
    SetQcStatus,
    RegisterWallet,
    DeregisterWallet,
    UseEmergencyPause,
    ResumeIfExpired,
    ResumeEarly,
    RenewPauseCredit,
    EmergencyClearPause,
    EmergencyRestoreCredit,
    Mint,
    Redeem,
    SetBacking,
    Pause,
    Unpause,
    AuthorizeReserve,
    DeauthorizeReserve,
    SetMintingCap,
    RequestRedemption,
    RecordFulfillment,
    FlagDefault,
    SetRedemptionParameters,
    ManageRoles,
}

/// Who may invoke an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Holder of a single role
    Role(Role),
    /// Holder of any of the listed roles
    AnyRole(&'static [Role]),
    /// The custodian named by the call
    QcSelf,
    /// The custodian named by the call, or a holder of the role
    QcSelfOrRole(Role),
    /// Permissionless
    Anyone,
}

/// The audited table: operation -> required capability
pub const fn required_capability(op: Operation) -> Capability {
    use Operation::*;
    match op {
        SubmitAttestation => Capability::Role(Role::Attester),
        RecordConsensusAttestation => Capability::Anyone,
        OverrideAttestation | EmergencySetReserve | ResetConsensus => {
            Capability::Role(Role::Arbiter)
        }
        SetOracleParameters => Capability::Role(Role::Owner),

        SetQcStatus | RegisterWallet | DeregisterWallet => Capability::Role(Role::QcManager),

        UseEmergencyPause | ResumeEarly | RenewPauseCredit => Capability::QcSelf,
        ResumeIfExpired => Capability::Anyone,
        EmergencyClearPause | EmergencyRestoreCredit => {
            Capability::Role(Role::EmergencyCouncil)
        }

        Mint => Capability::QcSelfOrRole(Role::Minter),
        Redeem => Capability::QcSelf,
        SetBacking => Capability::Role(Role::Oracle),
        Pause => Capability::AnyRole(&[Role::Owner, Role::EmergencyCouncil]),
        Unpause => Capability::Role(Role::Owner),
        AuthorizeReserve | DeauthorizeReserve | SetMintingCap => Capability::Role(Role::Owner),

        RequestRedemption | RecordFulfillment => Capability::Anyone,
        FlagDefault => Capability::Role(Role::Arbiter),
        SetRedemptionParameters | ManageRoles => Capability::Role(Role::Owner),
    }
}

/// Access errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("{caller} lacks capability for {operation:?}")]
    MissingCapability {
        operation: Operation,
        caller: AccountId,
    },

    #[error("{operation:?} requires a custodian subject")]
    MissingSubject { operation: Operation },

    #[error("{account} already holds role {role}")]
    RoleAlreadyGranted { role: Role, account: AccountId },

    #[error("{account} does not hold role {role}")]
    RoleNotHeld { role: Role, account: AccountId },

    #[error("zero account cannot hold roles")]
    ZeroAccount,
}

impl AccessError {
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::MissingCapability { .. } => "MISSING_CAPABILITY",
            AccessError::MissingSubject { .. } => "MISSING_SUBJECT",
            AccessError::RoleAlreadyGranted { .. } => "ROLE_ALREADY_GRANTED",
            AccessError::RoleNotHeld { .. } => "ROLE_NOT_HELD",
            AccessError::ZeroAccount => "ZERO_ACCOUNT",
        }
    }
}

/// Role membership
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessControl {
    members: BTreeMap<Role, BTreeSet<AccountId>>,
}

impl AccessControl {
    /// Bootstrap with a single owner
    pub fn with_owner(owner: AccountId) -> Self {
        let mut members = BTreeMap::new();
        members.insert(Role::Owner, BTreeSet::from([owner]));
        Self { members }
    }

    pub fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }

    pub fn members(&self, role: Role) -> Vec<AccountId> {
        self.members
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Check the caller against the table. `subject` is the custodian the
    /// call acts on, required for self-service capabilities.
    pub fn authorize(
        &self,
        operation: Operation,
        ctx: &CallContext,
        subject: Option<&AccountId>,
    ) -> Result<(), AccessError> {
        let allowed = match required_capability(operation) {
            Capability::Anyone => true,
            Capability::Role(role) => self.has_role(role, &ctx.caller),
            Capability::AnyRole(roles) => roles.iter().any(|r| self.has_role(*r, &ctx.caller)),
            Capability::QcSelf => {
                let qc = subject.ok_or(AccessError::MissingSubject { operation })?;
                *qc == ctx.caller
            }
            Capability::QcSelfOrRole(role) => {
                let qc = subject.ok_or(AccessError::MissingSubject { operation })?;
                *qc == ctx.caller || self.has_role(role, &ctx.caller)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(AccessError::MissingCapability {
                operation,
                caller: ctx.caller,
            })
        }
    }

    pub fn grant(&mut self, role: Role, account: AccountId) -> Result<(), AccessError> {
        if account.is_zero() {
            return Err(AccessError::ZeroAccount);
        }
        if !self.members.entry(role).or_default().insert(account) {
            return Err(AccessError::RoleAlreadyGranted { role, account });
        }
        Ok(())
    }

    pub fn revoke(&mut self, role: Role, account: AccountId) -> Result<(), AccessError> {
        let removed = self
            .members
            .get_mut(&role)
            .map(|set| set.remove(&account))
            .unwrap_or(false);
        if !removed {
            return Err(AccessError::RoleNotHeld { role, account });
        }
        Ok(())
    }
}
