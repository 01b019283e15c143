//! Provisioning failure taxonomy.
//!
//! Remote errors are classified once, here, into categories that drive
//! caller behavior: whether a retry can help, whether `start_fresh` is
//! the way out, and what gets written into the connection's last-error
//! snapshot.

use chrono::Utc;
use thiserror::Error;

use frostguard_db::models::{LastErrorSnapshot, StepName};
use frostguard_db::DbError;
use frostguard_secrets::SecretsError;
use frostguard_ttn::{RemoteErrorDetail, TtnError};

/// What a 403 was aimed at, for the two no-rights sub-kinds.
#[derive(Debug, Clone)]
pub enum RightsTarget {
    Organization(String),
    Application(String),
}

/// Error surfaced by any provisioner operation.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Network failure, timeout, 5xx or 429. Retrying later can work.
    #[error("transient failure at {step}: {message}")]
    Transient {
        step: StepName,
        message: String,
        detail: Option<RemoteErrorDetail>,
    },

    /// 401: the configured credential is invalid or expired. Requires
    /// credential replacement, not a retry.
    #[error("authentication failed at {step}")]
    Unauthenticated {
        step: StepName,
        detail: Option<RemoteErrorDetail>,
    },

    /// 403 on the organization: the id is owned by another account.
    #[error("no rights on organization {org_id}")]
    NoOrganizationRights {
        step: StepName,
        org_id: String,
        detail: Option<RemoteErrorDetail>,
    },

    /// 403 on the application.
    #[error("no rights on application {app_id}")]
    NoApplicationRights {
        step: StepName,
        app_id: String,
        detail: Option<RemoteErrorDetail>,
    },

    /// 404 on a resource the ledger believed existed. The dependent
    /// ledger flag has been cleared; the next run recreates it.
    #[error("{resource} vanished remotely; will recreate on next run")]
    Drift {
        step: StepName,
        resource: String,
        detail: Option<RemoteErrorDetail>,
    },

    /// 409 where ownership verification shows a different owner. Never
    /// auto-resolved.
    #[error("{resource} is claimed by another account")]
    OwnershipConflict {
        step: StepName,
        resource: String,
        /// Owning entity extracted from the remote error, when present.
        owner: Option<String>,
        detail: Option<RemoteErrorDetail>,
    },

    /// The identifier rotation budget ran out. Terminal; escalate via
    /// `start_fresh` or support.
    #[error("identifier rotation exhausted after {attempts} attempts")]
    RotationExhausted { step: StepName, attempts: u32 },

    /// The requested action is not valid for the connection's state.
    #[error("{message}")]
    InvalidState {
        message: String,
        use_start_fresh: bool,
    },

    /// Persistence failure.
    #[error("storage failure: {0}")]
    Store(#[from] DbError),

    /// Credential sealing/opening failure.
    #[error("credential store failure: {0}")]
    Secrets(#[from] SecretsError),

    /// Unexpected response shape or an unclassifiable remote error.
    #[error("internal failure at {step}: {message}")]
    Internal { step: StepName, message: String },
}

/// Result alias for provisioner operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    /// Classify a TTN client error for a given step.
    ///
    /// 409 is deliberately absent: conflicts are not failures until
    /// ownership verification says so, and the call sites handle that
    /// themselves.
    pub fn from_ttn(step: StepName, target: &RightsTarget, err: TtnError) -> Self {
        if err.is_transient() {
            let detail = err.detail().cloned();
            return ProvisionError::Transient {
                step,
                message: err.to_string(),
                detail,
            };
        }
        match err {
            TtnError::Unauthenticated { detail, .. } => ProvisionError::Unauthenticated {
                step,
                detail: Some(detail),
            },
            TtnError::Forbidden { detail, .. } => match target {
                RightsTarget::Organization(org_id) => ProvisionError::NoOrganizationRights {
                    step,
                    org_id: org_id.clone(),
                    detail: Some(detail),
                },
                RightsTarget::Application(app_id) => ProvisionError::NoApplicationRights {
                    step,
                    app_id: app_id.clone(),
                    detail: Some(detail),
                },
            },
            TtnError::NotFound { resource, detail } => ProvisionError::Drift {
                step,
                resource,
                detail: Some(detail),
            },
            TtnError::Conflict { resource, detail } => {
                let owner = owner_from_detail(&detail);
                ProvisionError::OwnershipConflict {
                    step,
                    resource,
                    owner,
                    detail: Some(detail),
                }
            }
            other => ProvisionError::Internal {
                step,
                message: other.to_string(),
            },
        }
    }

    /// Whether retrying the same action later can reasonably succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, ProvisionError::Transient { .. })
    }

    /// Whether `start_fresh` is the recommended way out.
    #[must_use]
    pub fn use_start_fresh(&self) -> bool {
        match self {
            ProvisionError::NoOrganizationRights { .. }
            | ProvisionError::NoApplicationRights { .. }
            | ProvisionError::OwnershipConflict { .. }
            | ProvisionError::RotationExhausted { .. } => true,
            ProvisionError::InvalidState { use_start_fresh, .. } => *use_start_fresh,
            _ => false,
        }
    }

    /// Stable category name for the response envelope and the log.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            ProvisionError::Transient { .. } => "transient",
            ProvisionError::Unauthenticated { .. } => "unauthenticated",
            ProvisionError::NoOrganizationRights { .. } => "no_organization_rights",
            ProvisionError::NoApplicationRights { .. } => "no_application_rights",
            ProvisionError::Drift { .. } => "drift_not_found",
            ProvisionError::OwnershipConflict { .. } => "ownership_conflict",
            ProvisionError::RotationExhausted { .. } => "rotation_exhausted",
            ProvisionError::InvalidState { .. } => "invalid_state",
            ProvisionError::Store(_) => "storage",
            ProvisionError::Secrets(_) => "secrets",
            ProvisionError::Internal { .. } => "internal",
        }
    }

    /// Step the failure occurred at, when tied to one.
    #[must_use]
    pub fn step(&self) -> Option<StepName> {
        match self {
            ProvisionError::Transient { step, .. }
            | ProvisionError::Unauthenticated { step, .. }
            | ProvisionError::NoOrganizationRights { step, .. }
            | ProvisionError::NoApplicationRights { step, .. }
            | ProvisionError::Drift { step, .. }
            | ProvisionError::OwnershipConflict { step, .. }
            | ProvisionError::RotationExhausted { step, .. }
            | ProvisionError::Internal { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Remote resource the failure names, when tied to one.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        match self {
            ProvisionError::NoOrganizationRights { org_id, .. } => {
                Some(format!("organization {org_id}"))
            }
            ProvisionError::NoApplicationRights { app_id, .. } => {
                Some(format!("application {app_id}"))
            }
            ProvisionError::Drift { resource, .. }
            | ProvisionError::OwnershipConflict { resource, .. } => Some(resource.clone()),
            _ => None,
        }
    }

    /// Remote detail attached to the failure, when one exists.
    #[must_use]
    pub fn detail(&self) -> Option<&RemoteErrorDetail> {
        match self {
            ProvisionError::Transient { detail, .. }
            | ProvisionError::Unauthenticated { detail, .. }
            | ProvisionError::NoOrganizationRights { detail, .. }
            | ProvisionError::NoApplicationRights { detail, .. }
            | ProvisionError::Drift { detail, .. }
            | ProvisionError::OwnershipConflict { detail, .. } => detail.as_ref(),
            _ => None,
        }
    }

    /// Correlation id from the remote system, when present.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.detail().and_then(|d| d.correlation_id.as_deref())
    }

    /// Snapshot for the connection row's `last_error` column.
    #[must_use]
    pub fn snapshot(&self) -> LastErrorSnapshot {
        let detail = self.detail();
        LastErrorSnapshot {
            step: self.step().map(|s| s.to_string()),
            http_status: detail.map(|d| d.status),
            body_excerpt: detail.map(|d| d.body_excerpt.clone()),
            correlation_id: detail.and_then(|d| d.correlation_id.clone()),
            error_namespace: detail.and_then(|d| d.namespace.clone()),
            error_name: detail.and_then(|d| d.name.clone()),
            message: self.to_string(),
            occurred_at: Some(Utc::now()),
        }
    }
}

/// Pull the owning entity out of a conflict detail's attributes.
fn owner_from_detail(detail: &RemoteErrorDetail) -> Option<String> {
    for key in ["application_id", "organization_id", "gateway_id", "entity_id"] {
        if let Some(owner) = detail.attributes.get(key) {
            return Some(owner.clone());
        }
    }
    None
}
