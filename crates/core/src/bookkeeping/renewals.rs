//! Policies approaching their end date.

use std::collections::HashMap;

use chrono::NaiveDate;
use policydesk_domain::{Customer, Policy, RenewalUrgency, UpcomingRenewal, Vehicle};

/// Policies ending within `[today, today + window_days]`, soonest first.
///
/// Customer and vehicle are joined by id; a dangling reference leaves the
/// name or plate empty rather than dropping the policy.
pub fn upcoming_renewals(
    policies: &[Policy],
    customers: &[Customer],
    vehicles: &[Vehicle],
    today: NaiveDate,
    window_days: i64,
) -> Vec<UpcomingRenewal> {
    let customers: HashMap<&str, &Customer> =
        customers.iter().map(|c| (c.id.as_str(), c)).collect();
    let vehicles: HashMap<&str, &Vehicle> = vehicles.iter().map(|v| (v.id.as_str(), v)).collect();

    let mut renewals: Vec<UpcomingRenewal> = policies
        .iter()
        .filter_map(|policy| {
            let days_left = policy.days_until_end(today);
            if !(0..=window_days).contains(&days_left) {
                return None;
            }
            Some(UpcomingRenewal {
                policy: policy.clone(),
                customer_name: customers.get(policy.customer_id.as_str()).map(|c| c.full_name()),
                vehicle_plate: vehicles.get(policy.vehicle_id.as_str()).map(|v| v.plate.clone()),
                days_left,
                urgency: RenewalUrgency::from_days_left(days_left),
            })
        })
        .collect();

    renewals.sort_by(|a, b| {
        a.policy.end_date.cmp(&b.policy.end_date).then_with(|| a.policy.id.cmp(&b.policy.id))
    });
    renewals
}
