//! Question answering over the visible policy book.

use std::collections::HashMap;
use std::sync::Arc;

use policydesk_domain::{Customer, Policy, PolicyDeskError, Principal, Result, Vehicle};
use serde::Serialize;
use tracing::{debug, instrument};

use super::ports::TextAnalyzer;
use crate::bookkeeping::BookkeepingService;

/// One policy flattened for the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDigest {
    pub policy_number: String,
    pub customer: String,
    pub vehicle: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    pub start_date: String,
    pub end_date: String,
    pub price: f64,
}

pub struct PolicyAnalytics {
    bookkeeping: Arc<BookkeepingService>,
    analyzer: Arc<dyn TextAnalyzer>,
}

impl PolicyAnalytics {
    pub fn new(bookkeeping: Arc<BookkeepingService>, analyzer: Arc<dyn TextAnalyzer>) -> Self {
        Self { bookkeeping, analyzer }
    }

    /// Answer `question` about the policies `principal` can see.
    #[instrument(skip(self, principal, question), fields(principal = %principal.id))]
    pub async fn ask(&self, principal: &Principal, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PolicyDeskError::InvalidInput("question is empty".into()));
        }

        let policies = self.bookkeeping.list_policies(principal).await?;
        let customers = self.bookkeeping.list_customers(principal).await?;
        let vehicles = self.bookkeeping.list_vehicles(principal).await?;
        let digests = digest_policies(&policies, &customers, &vehicles);
        debug!(policies = digests.len(), "policy digest built");

        let prompt = build_prompt(&digests, question)?;
        self.analyzer.analyze(&prompt).await
    }
}

pub fn digest_policies(
    policies: &[Policy],
    customers: &[Customer],
    vehicles: &[Vehicle],
) -> Vec<PolicyDigest> {
    let customers: HashMap<&str, &Customer> =
        customers.iter().map(|c| (c.id.as_str(), c)).collect();
    let vehicles: HashMap<&str, &Vehicle> = vehicles.iter().map(|v| (v.id.as_str(), v)).collect();

    policies
        .iter()
        .map(|policy| PolicyDigest {
            policy_number: policy.policy_number.clone(),
            customer: customers
                .get(policy.customer_id.as_str())
                .map_or_else(|| "unknown customer".to_string(), |c| c.full_name()),
            vehicle: vehicles
                .get(policy.vehicle_id.as_str())
                .map_or_else(|| "unknown vehicle".to_string(), |v| v.description()),
            policy_type: policy.policy_type.to_string(),
            start_date: policy.start_date.to_string(),
            end_date: policy.end_date.to_string(),
            price: policy.price,
        })
        .collect()
}

pub fn build_prompt(digests: &[PolicyDigest], question: &str) -> Result<String> {
    let data = serde_json::to_string_pretty(digests)?;
    Ok(format!(
        "Insurance policy data: {data}\n\nQuestion: {question}\n\n\
         Please analyse the data above and answer the question."
    ))
}
