use crate::error::{MostradorError, Result};
use crate::settings::Settings;

/// Tenant scope threaded through every data-access call.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantContext {
    pub organization_id: i64,
    pub branch_id: Option<i64>,
    pub user_id: Option<String>,
}

impl TenantContext {
    pub fn new(organization_id: i64) -> Self {
        Self {
            organization_id,
            branch_id: None,
            user_id: None,
        }
    }

    pub fn with_branch(mut self, branch_id: i64) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let org = settings
            .organization_id
            .ok_or(MostradorError::MissingContext("organization"))?;
        let ctx = Self {
            organization_id: org,
            branch_id: settings.branch_id,
            user_id: settings.user_id.clone(),
        };
        ctx.require_organization()?;
        Ok(ctx)
    }

    pub fn require_organization(&self) -> Result<i64> {
        if self.organization_id <= 0 {
            return Err(MostradorError::MissingContext("organization"));
        }
        Ok(self.organization_id)
    }

    pub fn require_branch(&self) -> Result<i64> {
        self.require_organization()?;
        match self.branch_id {
            Some(id) if id > 0 => Ok(id),
            _ => Err(MostradorError::MissingContext("branch")),
        }
    }

    pub fn user(&self) -> &str {
        self.user_id.as_deref().unwrap_or("system")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_branch_fails_without_branch() {
        let ctx = TenantContext::new(1);
        assert!(matches!(
            ctx.require_branch(),
            Err(MostradorError::MissingContext("branch"))
        ));
        assert_eq!(ctx.with_branch(7).require_branch().unwrap(), 7);
    }

    #[test]
    fn test_invalid_organization_rejected() {
        let ctx = TenantContext::new(0).with_branch(1);
        assert!(matches!(
            ctx.require_branch(),
            Err(MostradorError::MissingContext("organization"))
        ));
    }

    #[test]
    fn test_from_settings_requires_organization() {
        let settings = Settings::default();
        assert!(TenantContext::from_settings(&settings).is_err());

        let settings = Settings {
            organization_id: Some(3),
            branch_id: Some(4),
            user_id: Some("ana".into()),
            ..Settings::default()
        };
        let ctx = TenantContext::from_settings(&settings).unwrap();
        assert_eq!(ctx.organization_id, 3);
        assert_eq!(ctx.branch_id, Some(4));
        assert_eq!(ctx.user(), "ana");
    }
}
