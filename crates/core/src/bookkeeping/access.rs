//! Role-based visibility of bookkeeping records

use policydesk_domain::{PolicyDeskError, Principal, Result, Role};

/// What a principal may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Staff see every record.
    All,
    /// A customer principal sees one customer and its vehicles and policies.
    Customer(String),
    /// Pending principals and unassigned customers see nothing.
    Nothing,
}

impl Visibility {
    pub fn for_principal(principal: &Principal) -> Self {
        match principal.role {
            Role::Admin | Role::Employee => Self::All,
            Role::Customer => match &principal.assigned_customer_id {
                Some(customer_id) if !customer_id.is_empty() => Self::Customer(customer_id.clone()),
                _ => Self::Nothing,
            },
            Role::Pending => Self::Nothing,
        }
    }

    pub fn allows_customer(&self, customer_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Customer(own) => own == customer_id,
            Self::Nothing => false,
        }
    }
}

/// Reject principals that are not admins or employees.
pub fn require_staff(principal: &Principal, action: &str) -> Result<()> {
    if principal.role.is_staff() {
        Ok(())
    } else {
        Err(PolicyDeskError::Auth(format!(
            "{} ({}) may not {action}",
            principal.email, principal.role
        )))
    }
}
