//! Access Gate: role-hierarchy authorization and onboarding redirects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;
use crate::tenant::{TenantContext, TenantId};

/// Membership role, ordered from least to most privileged.
///
/// Only ever compared ordinally; a role never identifies anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Partner,
    Moderator,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Client,
        Role::Partner,
        Role::Moderator,
        Role::Admin,
        Role::SuperAdmin,
    ];

    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Partner => "partner",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RelayError::not_authenticated(format!("Unknown role: {s}")))
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub tenant_id: TenantId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, tenant_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: TenantId(tenant_id.into()),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    InsufficientRole { required: Role, actual: Role },
    TenantMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGate;

impl AccessGate {
    pub fn new() -> Self {
        Self
    }

    /// Allow iff the user's rank reaches `required` and the user is a member
    /// of the tenant being served. Super-admins act across tenants.
    pub fn authorize(&self, required: Role, tenant: &TenantContext, user: &Principal) -> Decision {
        if user.role != Role::SuperAdmin && user.tenant_id != tenant.tenant_id {
            return Decision::Deny(DenyReason::TenantMismatch);
        }
        if user.role >= required {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::InsufficientRole {
                required,
                actual: user.role,
            })
        }
    }

    /// `authorize` for request pipelines: a missing principal is a 401,
    /// a denial a 403.
    pub fn require(
        &self,
        required: Role,
        tenant: &TenantContext,
        user: Option<&Principal>,
    ) -> Result<(), RelayError> {
        let user = user.ok_or_else(|| RelayError::not_authenticated("Authentication required"))?;
        match self.authorize(required, tenant, user) {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::TenantMismatch) => Err(RelayError::forbidden(format!(
                "User does not belong to tenant {}",
                tenant.tenant_id
            ))),
            Decision::Deny(DenyReason::InsufficientRole { required, actual }) => Err(
                RelayError::forbidden(format!("Role {required} required, caller has {actual}")),
            ),
        }
    }

    pub fn require_feature(&self, tenant: &TenantContext, feature: &str) -> Result<(), RelayError> {
        if tenant.has_feature(feature) {
            Ok(())
        } else {
            Err(RelayError::forbidden(format!(
                "Feature {feature} is not enabled for tenant {}",
                tenant.tenant_id
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Navigation {
    Proceed,
    Redirect { to: String },
}

/// Sends members of tenants that have not finished onboarding to the
/// onboarding flow.
#[derive(Debug, Clone)]
pub struct OnboardingGate {
    onboarding_path: String,
    excluded: Vec<String>,
}

impl Default for OnboardingGate {
    fn default() -> Self {
        Self::new("/onboarding")
            .exclude("/auth")
            .exclude("/login")
            .exclude("/logout")
            .exclude("/signup")
            .exclude("/pricing")
            .exclude("/about")
            .exclude("/legal")
    }
}

impl OnboardingGate {
    /// The onboarding path itself is always excluded.
    pub fn new(onboarding_path: impl Into<String>) -> Self {
        let onboarding_path = onboarding_path.into();
        Self {
            excluded: vec![onboarding_path.clone()],
            onboarding_path,
        }
    }

    pub fn exclude(mut self, prefix: impl Into<String>) -> Self {
        self.excluded.push(prefix.into());
        self
    }

    /// Move the onboarding flow, keeping the other exclusions.
    pub fn with_onboarding_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let old = std::mem::replace(&mut self.onboarding_path, path.clone());
        self.excluded.retain(|p| *p != old);
        self.excluded.push(path);
        self
    }

    pub fn onboarding_path(&self) -> &str {
        &self.onboarding_path
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
        })
    }

    /// Evaluate one navigation. Only members of `tenant` are redirected;
    /// unauthenticated visitors and outsiders always proceed.
    pub fn check(&self, path: &str, tenant: &TenantContext, user: Option<&Principal>) -> Navigation {
        let member = user.is_some_and(|u| u.tenant_id == tenant.tenant_id);
        if !member || tenant.onboarding_completed || self.is_excluded(path) {
            return Navigation::Proceed;
        }
        Navigation::Redirect {
            to: self.onboarding_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TenantRecord;

    fn tenant(id: &str) -> TenantContext {
        TenantContext::new(id)
    }

    #[test]
    fn ordinal_comparison_within_tenant() {
        let gate = AccessGate::new();
        let acme = tenant("acme");
        let admin = Principal::new("u1", "acme", Role::Admin);
        let partner = Principal::new("u2", "acme", Role::Partner);

        assert!(gate.authorize(Role::Moderator, &acme, &admin).is_allowed());
        assert!(gate.authorize(Role::Admin, &acme, &admin).is_allowed());
        assert_eq!(
            gate.authorize(Role::Admin, &acme, &partner),
            Decision::Deny(DenyReason::InsufficientRole {
                required: Role::Admin,
                actual: Role::Partner
            })
        );
    }

    #[test]
    fn cross_tenant_roles_do_not_bleed() {
        let gate = AccessGate::new();
        let other_admin = Principal::new("u1", "globex", Role::Admin);
        assert_eq!(
            gate.authorize(Role::Client, &tenant("acme"), &other_admin),
            Decision::Deny(DenyReason::TenantMismatch)
        );
    }

    #[test]
    fn super_admin_is_tenant_agnostic() {
        let gate = AccessGate::new();
        let root = Principal::new("root", "platform", Role::SuperAdmin);
        assert!(gate.authorize(Role::SuperAdmin, &tenant("acme"), &root).is_allowed());
        assert!(gate.authorize(Role::Admin, &tenant("acme"), &root).is_allowed());
    }

    #[test]
    fn require_maps_denials_to_status_codes() {
        let gate = AccessGate::new();
        let acme = tenant("acme");
        assert_eq!(gate.require(Role::Client, &acme, None).unwrap_err().code(), 401);

        let client = Principal::new("u", "acme", Role::Client);
        assert_eq!(gate.require(Role::SuperAdmin, &acme, Some(&client)).unwrap_err().code(), 403);
        assert!(gate.require(Role::Client, &acme, Some(&client)).is_ok());
    }

    #[test]
    fn role_parses_from_claims() {
        assert_eq!("super_admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn onboarding_redirects_authenticated_members_only() {
        let gate = OnboardingGate::default();
        let fresh = TenantContext::from_record(
            &TenantRecord::new("fresh", "Fresh").with_onboarding_completed(false),
        );
        let user = Principal::new("u", "fresh", Role::Admin);

        assert_eq!(
            gate.check("/dashboard", &fresh, Some(&user)),
            Navigation::Redirect { to: "/onboarding".into() }
        );
        assert_eq!(gate.check("/dashboard", &fresh, None), Navigation::Proceed);
        assert_eq!(gate.check("/onboarding/step-2", &fresh, Some(&user)), Navigation::Proceed);
        assert_eq!(gate.check("/auth/callback", &fresh, Some(&user)), Navigation::Proceed);
        assert_eq!(gate.check("/pricing", &fresh, Some(&user)), Navigation::Proceed);
        // prefix match respects segment boundaries
        assert_eq!(
            gate.check("/authors", &fresh, Some(&user)),
            Navigation::Redirect { to: "/onboarding".into() }
        );
    }

    #[test]
    fn outsiders_are_not_sent_to_another_tenants_onboarding() {
        let gate = OnboardingGate::default();
        let fresh = TenantContext::from_record(
            &TenantRecord::new("fresh", "Fresh").with_onboarding_completed(false),
        );
        let other = Principal::new("u", "acme", Role::Admin);
        let root = Principal::new("root", "platform", Role::SuperAdmin);
        assert_eq!(gate.check("/dashboard", &fresh, Some(&other)), Navigation::Proceed);
        assert_eq!(gate.check("/dashboard", &fresh, Some(&root)), Navigation::Proceed);
    }

    #[test]
    fn completed_tenants_never_redirect() {
        let gate = OnboardingGate::default();
        let user = Principal::new("u", "acme", Role::Client);
        assert_eq!(gate.check("/dashboard", &tenant("acme"), Some(&user)), Navigation::Proceed);
    }
}
