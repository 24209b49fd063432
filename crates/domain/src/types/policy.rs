//! Policy entity and renewal tracking types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::table::Table;
use crate::constants::{RENEWAL_CRITICAL_DAYS, RENEWAL_WARNING_DAYS};
use crate::impl_domain_enum_conversions;

/// Coverage kind of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Traffic,
    Comprehensive,
}

impl_domain_enum_conversions!(PolicyType {
    Traffic => "traffic",
    Comprehensive => "comprehensive",
});

/// Insurance policy covering one vehicle of one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub customer_id: String,
    pub vehicle_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: f64,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub policy_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Policy {
    /// Whole days from `today` until the policy ends (negative once expired).
    pub fn days_until_end(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days()
    }
}

impl Entity for Policy {
    const TABLE: Table = Table::Policies;
    type Changes = PolicyChanges;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPolicy {
    pub customer_id: String,
    pub vehicle_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: f64,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub policy_number: String,
}

impl NewPolicy {
    pub fn into_policy(self, id: String) -> Policy {
        Policy {
            id,
            customer_id: self.customer_id,
            vehicle_id: self.vehicle_id,
            start_date: self.start_date,
            end_date: self.end_date,
            price: self.price,
            policy_type: self.policy_type,
            policy_number: self.policy_number,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<PolicyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
}

/// How close a policy is to its end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenewalUrgency {
    Critical,
    Warning,
    Normal,
}

impl_domain_enum_conversions!(RenewalUrgency {
    Critical => "critical",
    Warning => "warning",
    Normal => "normal",
});

impl RenewalUrgency {
    pub const fn from_days_left(days_left: i64) -> Self {
        if days_left <= RENEWAL_CRITICAL_DAYS {
            Self::Critical
        } else if days_left <= RENEWAL_WARNING_DAYS {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// A policy due for renewal, joined with its customer and vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingRenewal {
    pub policy: Policy,
    pub customer_name: Option<String>,
    pub vehicle_plate: Option<String>,
    pub days_left: i64,
    pub urgency: RenewalUrgency,
}
