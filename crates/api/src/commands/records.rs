//! Bookkeeping commands: customers, vehicles, policies and users.
//!
//! Every command acts on behalf of a signed-in [`Principal`]; role checks
//! live in the bookkeeping service.

use chrono::Utc;
use policydesk_core::CustomerSummary;
use policydesk_domain::{
    Customer, CustomerChanges, NewCustomer, NewDocument, NewPolicy, NewVehicle, Policy,
    PolicyChanges, Principal, Result as DomainResult, Role, UpcomingRenewal, User, Vehicle,
    VehicleChanges,
};

use crate::context::AppContext;
use crate::utils::command_helpers::execute_with_metrics;

// ---- users ----

/// Resolve the signed-in identity to a user, creating a pending one on first sign-in.
pub async fn sign_in(
    ctx: &AppContext,
    id: &str,
    email: &str,
    name: Option<String>,
) -> DomainResult<Principal> {
    execute_with_metrics("records::sign_in", || async {
        let user = ctx.bookkeeping.sign_in(id, email, name).await?;
        Ok(Principal::from(&user))
    })
    .await
}

pub async fn list_users(ctx: &AppContext, principal: &Principal) -> DomainResult<Vec<User>> {
    execute_with_metrics("records::list_users", || async {
        ctx.bookkeeping.list_users(principal).await
    })
    .await
}

pub async fn set_user_role(
    ctx: &AppContext,
    principal: &Principal,
    user_id: &str,
    role: Role,
) -> DomainResult<User> {
    execute_with_metrics("records::set_user_role", || async {
        ctx.bookkeeping.set_user_role(principal, user_id, role).await
    })
    .await
}

// ---- customers ----

pub async fn list_customers(ctx: &AppContext, principal: &Principal) -> DomainResult<Vec<Customer>> {
    execute_with_metrics("records::list_customers", || async {
        ctx.bookkeeping.list_customers(principal).await
    })
    .await
}

pub async fn customer_summaries(
    ctx: &AppContext,
    principal: &Principal,
) -> DomainResult<Vec<CustomerSummary>> {
    execute_with_metrics("records::customer_summaries", || async {
        ctx.bookkeeping.customer_summaries(principal).await
    })
    .await
}

pub async fn get_customer(
    ctx: &AppContext,
    principal: &Principal,
    id: &str,
) -> DomainResult<Option<Customer>> {
    execute_with_metrics("records::get_customer", || async {
        ctx.bookkeeping.get_customer(principal, id).await
    })
    .await
}

pub async fn create_customer(
    ctx: &AppContext,
    principal: &Principal,
    new: NewCustomer,
) -> DomainResult<Customer> {
    execute_with_metrics("records::create_customer", || async {
        ctx.bookkeeping.create_customer(principal, new).await
    })
    .await
}

pub async fn update_customer(
    ctx: &AppContext,
    principal: &Principal,
    id: &str,
    changes: CustomerChanges,
) -> DomainResult<Customer> {
    execute_with_metrics("records::update_customer", || async {
        ctx.bookkeeping.update_customer(principal, id, &changes).await
    })
    .await
}

/// Delete a customer together with its vehicles and policies.
pub async fn delete_customer(ctx: &AppContext, principal: &Principal, id: &str) -> DomainResult<bool> {
    execute_with_metrics("records::delete_customer", || async {
        ctx.bookkeeping.delete_customer(principal, id).await
    })
    .await
}

pub async fn add_document(
    ctx: &AppContext,
    principal: &Principal,
    customer_id: &str,
    document: NewDocument,
) -> DomainResult<Customer> {
    execute_with_metrics("records::add_document", || async {
        ctx.bookkeeping.add_document(principal, customer_id, document).await
    })
    .await
}

pub async fn add_note(
    ctx: &AppContext,
    principal: &Principal,
    customer_id: &str,
    content: &str,
) -> DomainResult<Customer> {
    execute_with_metrics("records::add_note", || async {
        ctx.bookkeeping.add_note(principal, customer_id, content).await
    })
    .await
}

// ---- vehicles ----

pub async fn list_vehicles(ctx: &AppContext, principal: &Principal) -> DomainResult<Vec<Vehicle>> {
    execute_with_metrics("records::list_vehicles", || async {
        ctx.bookkeeping.list_vehicles(principal).await
    })
    .await
}

pub async fn create_vehicle(
    ctx: &AppContext,
    principal: &Principal,
    new: NewVehicle,
) -> DomainResult<Vehicle> {
    execute_with_metrics("records::create_vehicle", || async {
        ctx.bookkeeping.create_vehicle(principal, new).await
    })
    .await
}

pub async fn update_vehicle(
    ctx: &AppContext,
    principal: &Principal,
    id: &str,
    changes: VehicleChanges,
) -> DomainResult<Vehicle> {
    execute_with_metrics("records::update_vehicle", || async {
        ctx.bookkeeping.update_vehicle(principal, id, &changes).await
    })
    .await
}

pub async fn delete_vehicle(ctx: &AppContext, principal: &Principal, id: &str) -> DomainResult<bool> {
    execute_with_metrics("records::delete_vehicle", || async {
        ctx.bookkeeping.delete_vehicle(principal, id).await
    })
    .await
}

// ---- policies ----

pub async fn list_policies(ctx: &AppContext, principal: &Principal) -> DomainResult<Vec<Policy>> {
    execute_with_metrics("records::list_policies", || async {
        ctx.bookkeeping.list_policies(principal).await
    })
    .await
}

pub async fn create_policy(
    ctx: &AppContext,
    principal: &Principal,
    new: NewPolicy,
) -> DomainResult<Policy> {
    execute_with_metrics("records::create_policy", || async {
        ctx.bookkeeping.create_policy(principal, new).await
    })
    .await
}

pub async fn update_policy(
    ctx: &AppContext,
    principal: &Principal,
    id: &str,
    changes: PolicyChanges,
) -> DomainResult<Policy> {
    execute_with_metrics("records::update_policy", || async {
        ctx.bookkeeping.update_policy(principal, id, &changes).await
    })
    .await
}

pub async fn delete_policy(ctx: &AppContext, principal: &Principal, id: &str) -> DomainResult<bool> {
    execute_with_metrics("records::delete_policy", || async {
        ctx.bookkeeping.delete_policy(principal, id).await
    })
    .await
}

/// Policies ending within the renewal window, counted from today (UTC).
pub async fn upcoming_renewals(
    ctx: &AppContext,
    principal: &Principal,
) -> DomainResult<Vec<UpcomingRenewal>> {
    execute_with_metrics("records::upcoming_renewals", || async {
        ctx.bookkeeping.upcoming_renewals(principal, Utc::now().date_naive()).await
    })
    .await
}
