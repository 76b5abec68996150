//! # Request Context
//!
//! Per-request identity carried through request extensions. A request has at
//! most one identity: an employee (admin path), a portal user (portal path) or
//! a tenant user (tenant-user path).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Staff role across the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeRole {
    Admin,
    Accountant,
    Support,
}

impl EmployeeRole {
    pub fn as_str(self) -> &'static str {
        match self {
            EmployeeRole::Admin => "admin",
            EmployeeRole::Accountant => "accountant",
            EmployeeRole::Support => "support",
        }
    }
}

impl std::str::FromStr for EmployeeRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(EmployeeRole::Admin),
            "accountant" => Ok(EmployeeRole::Accountant),
            "support" => Ok(EmployeeRole::Support),
            other => Err(CoreError::malformed(format!("unknown employee role '{other}'"))),
        }
    }
}

/// Role of a user inside one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Admin,
    Accountant,
    Viewer,
}

impl TenantRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TenantRole::Admin => "admin",
            TenantRole::Accountant => "accountant",
            TenantRole::Viewer => "viewer",
        }
    }
}

impl std::str::FromStr for TenantRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(TenantRole::Admin),
            "accountant" => Ok(TenantRole::Accountant),
            "viewer" => Ok(TenantRole::Viewer),
            other => Err(CoreError::malformed(format!("unknown tenant role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub id: Uuid,
    pub email: String,
    pub role: EmployeeRole,
}

/// Claims of a portal session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalClaims {
    /// Portal user id
    pub sub: Uuid,
    pub tenant_id: String,
    pub client_id: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Employee(Employee),
    Portal(PortalClaims),
    TenantUser {
        user_id: Uuid,
        firebase_uid: String,
        tenant_id: String,
        role: TenantRole,
    },
}

impl Identity {
    /// Id recorded as the actor in audit records.
    pub fn actor_id(&self) -> Uuid {
        match self {
            Identity::Employee(employee) => employee.id,
            Identity::Portal(claims) => claims.sub,
            Identity::TenantUser { user_id, .. } => *user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Employee(_) => "employee",
            Identity::Portal(_) => "portal",
            Identity::TenantUser { .. } => "tenant_user",
        }
    }
}

/// Fail with [`CoreError::NotAuthorized`] unless `actual` is in `allowed`.
pub fn require_role<R>(actual: R, allowed: &[R]) -> Result<(), CoreError>
where
    R: Copy + PartialEq + std::fmt::Debug,
{
    if allowed.contains(&actual) {
        Ok(())
    } else {
        Err(CoreError::NotAuthorized(format!(
            "role {actual:?} is not permitted"
        )))
    }
}

/// What a staff caller intends to do with tenant data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
}

impl RequestContext {
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Attach the request's identity. A second identity is refused.
    pub fn set_identity(&mut self, identity: Identity) -> Result<(), CoreError> {
        if self.identity.is_some() {
            return Err(CoreError::NotAuthenticated);
        }
        self.identity = Some(identity);
        Ok(())
    }

    pub fn require_identity(&self) -> Result<&Identity, CoreError> {
        self.identity.as_ref().ok_or(CoreError::NotAuthenticated)
    }

    pub fn require_employee(&self, allowed: &[EmployeeRole]) -> Result<&Employee, CoreError> {
        match self.require_identity()? {
            Identity::Employee(employee) => {
                require_role(employee.role, allowed)?;
                Ok(employee)
            }
            other => Err(CoreError::NotAuthorized(format!(
                "{} identities cannot use this endpoint",
                other.kind()
            ))),
        }
    }

    /// Staff access to `tenant_id`. Writes need an admin or accountant role;
    /// portal users never qualify.
    pub fn require_staff(&self, tenant_id: &str, access: Access) -> Result<&Identity, CoreError> {
        let identity = self.require_identity()?;
        match identity {
            Identity::Employee(employee) => {
                if access == Access::Write {
                    require_role(
                        employee.role,
                        &[EmployeeRole::Admin, EmployeeRole::Accountant],
                    )?;
                }
            }
            Identity::TenantUser {
                tenant_id: home,
                role,
                ..
            } => {
                if home != tenant_id {
                    return Err(CoreError::NotAuthorized("cross-tenant access".to_string()));
                }
                if access == Access::Write {
                    require_role(*role, &[TenantRole::Admin, TenantRole::Accountant])?;
                }
            }
            Identity::Portal(_) => {
                return Err(CoreError::NotAuthorized(
                    "portal identities cannot use staff endpoints".to_string(),
                ));
            }
        }
        Ok(identity)
    }

    /// Read access to one client: any staff reader, or the portal user who
    /// owns that client in that tenant.
    pub fn require_client_access(
        &self,
        tenant_id: &str,
        client_id: &str,
    ) -> Result<&Identity, CoreError> {
        match self.require_identity()? {
            identity @ Identity::Portal(claims) => {
                if claims.tenant_id != tenant_id {
                    return Err(CoreError::NotAuthorized("cross-tenant access".to_string()));
                }
                if claims.client_id != client_id {
                    return Err(CoreError::NotAuthorized(
                        "portal users may only read their own record".to_string(),
                    ));
                }
                Ok(identity)
            }
            _ => self.require_staff(tenant_id, Access::Read),
        }
    }
}
