//! Bookkeeping operations over the local store.
//!
//! Every write goes through [`LocalStore`], so replication to the remote
//! store happens through the registered hooks. Dependent records are deleted
//! before their parents; the store never cascades on its own.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use policydesk_domain::constants::UPCOMING_RENEWAL_WINDOW_DAYS;
use policydesk_domain::{
    Customer, CustomerChanges, CustomerNote, NewCustomer, NewDocument, NewPolicy, NewVehicle,
    PolicyChanges, PolicyDeskError, Policy, Principal, Result, Role, UpcomingRenewal, User,
    UserChanges, Vehicle, VehicleChanges,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::access::{require_staff, Visibility};
use super::renewals::upcoming_renewals;
use crate::store::{LocalStore, Repository};

/// A customer with the number of records that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub customer: Customer,
    pub vehicle_count: usize,
    pub policy_count: usize,
}

pub struct BookkeepingService {
    customers: Repository<Customer>,
    vehicles: Repository<Vehicle>,
    policies: Repository<Policy>,
    users: Repository<User>,
}

impl BookkeepingService {
    pub fn new(local: Arc<LocalStore>) -> Self {
        Self {
            customers: Repository::new(Arc::clone(&local)),
            vehicles: Repository::new(Arc::clone(&local)),
            policies: Repository::new(Arc::clone(&local)),
            users: Repository::new(local),
        }
    }

    // ---- users ----

    /// Return the user for a signed-in identity, creating a `pending` user on
    /// first sign-in.
    #[instrument(skip(self, name))]
    pub async fn sign_in(&self, id: &str, email: &str, name: Option<String>) -> Result<User> {
        if let Some(user) = self.users.get(id).await? {
            return Ok(user);
        }
        let user = User {
            id: id.to_string(),
            email: email.to_string(),
            role: Role::Pending,
            name,
            assigned_customer_id: None,
            created_at: Some(Utc::now()),
        };
        info!(user_id = %id, "new user registered as pending");
        self.users.add(&user).await
    }

    pub async fn list_users(&self, principal: &Principal) -> Result<Vec<User>> {
        require_staff(principal, "list users")?;
        self.users.list().await
    }

    pub async fn update_user(
        &self,
        principal: &Principal,
        id: &str,
        changes: &UserChanges,
    ) -> Result<User> {
        require_staff(principal, "update users")?;
        self.users.update(id, changes).await
    }

    pub async fn set_user_role(&self, principal: &Principal, user_id: &str, role: Role) -> Result<User> {
        require_staff(principal, "change roles")?;
        let changes = UserChanges { role: Some(role), ..UserChanges::default() };
        self.users.update(user_id, &changes).await
    }

    /// Link a customer-role user to a customer record, in both directions.
    #[instrument(skip(self, principal))]
    pub async fn assign_customer(
        &self,
        principal: &Principal,
        user_id: &str,
        customer_id: &str,
    ) -> Result<()> {
        require_staff(principal, "assign customers")?;
        self.require_customer(customer_id).await?;
        let user_changes = UserChanges {
            assigned_customer_id: Some(Some(customer_id.to_string())),
            ..UserChanges::default()
        };
        self.users.update(user_id, &user_changes).await?;
        let customer_changes = CustomerChanges {
            assigned_user_id: Some(Some(user_id.to_string())),
            ..CustomerChanges::default()
        };
        self.customers.update(customer_id, &customer_changes).await?;
        Ok(())
    }

    pub async fn delete_user(&self, principal: &Principal, id: &str) -> Result<bool> {
        require_staff(principal, "delete users")?;
        self.users.delete(id).await
    }

    // ---- customers ----

    pub async fn list_customers(&self, principal: &Principal) -> Result<Vec<Customer>> {
        match Visibility::for_principal(principal) {
            Visibility::All => self.customers.list().await,
            Visibility::Customer(id) => Ok(self.customers.get(&id).await?.into_iter().collect()),
            Visibility::Nothing => Ok(Vec::new()),
        }
    }

    /// A customer the principal may see; `None` when missing or out of scope.
    pub async fn get_customer(&self, principal: &Principal, id: &str) -> Result<Option<Customer>> {
        if !Visibility::for_principal(principal).allows_customer(id) {
            return Ok(None);
        }
        self.customers.get(id).await
    }

    pub async fn create_customer(&self, principal: &Principal, new: NewCustomer) -> Result<Customer> {
        require_staff(principal, "create customers")?;
        let mut customer = new.into_customer(new_id());
        customer.created_at = Some(Utc::now());
        self.customers.add(&customer).await
    }

    pub async fn update_customer(
        &self,
        principal: &Principal,
        id: &str,
        changes: &CustomerChanges,
    ) -> Result<Customer> {
        require_staff(principal, "update customers")?;
        self.customers.update(id, changes).await
    }

    /// Delete a customer after its policies and vehicles.
    #[instrument(skip(self, principal))]
    pub async fn delete_customer(&self, principal: &Principal, id: &str) -> Result<bool> {
        require_staff(principal, "delete customers")?;
        for policy in self.policies.find_by("customerId", id).await? {
            self.policies.delete(&policy.id).await?;
        }
        for vehicle in self.vehicles.find_by("customerId", id).await? {
            self.delete_vehicle_cascade(&vehicle.id).await?;
        }
        self.customers.delete(id).await
    }

    pub async fn add_document(
        &self,
        principal: &Principal,
        customer_id: &str,
        document: NewDocument,
    ) -> Result<Customer> {
        require_staff(principal, "attach documents")?;
        let customer = self.require_customer(customer_id).await?;
        let mut documents = customer.documents;
        documents.push(document.into_document(new_id(), Utc::now()));
        let changes = CustomerChanges { documents: Some(documents), ..CustomerChanges::default() };
        self.customers.update(customer_id, &changes).await
    }

    pub async fn remove_document(
        &self,
        principal: &Principal,
        customer_id: &str,
        document_id: &str,
    ) -> Result<Customer> {
        require_staff(principal, "remove documents")?;
        let customer = self.require_customer(customer_id).await?;
        let before = customer.documents.len();
        let documents: Vec<_> =
            customer.documents.into_iter().filter(|d| d.id != document_id).collect();
        if documents.len() == before {
            return Err(PolicyDeskError::NotFound(format!(
                "document {document_id} on customer {customer_id}"
            )));
        }
        let changes = CustomerChanges { documents: Some(documents), ..CustomerChanges::default() };
        self.customers.update(customer_id, &changes).await
    }

    /// Prepend a note authored by `principal`.
    pub async fn add_note(
        &self,
        principal: &Principal,
        customer_id: &str,
        content: &str,
    ) -> Result<Customer> {
        require_staff(principal, "add notes")?;
        let content = content.trim();
        if content.is_empty() {
            return Err(PolicyDeskError::InvalidInput("note content is empty".into()));
        }
        let customer = self.require_customer(customer_id).await?;
        let mut notes = customer.notes;
        notes.insert(
            0,
            CustomerNote {
                id: new_id(),
                content: content.to_string(),
                created_at: Utc::now(),
                created_by: principal.display_name().to_string(),
            },
        );
        let changes = CustomerChanges { notes: Some(notes), ..CustomerChanges::default() };
        self.customers.update(customer_id, &changes).await
    }

    /// Every visible customer with its vehicle and policy counts.
    pub async fn customer_summaries(&self, principal: &Principal) -> Result<Vec<CustomerSummary>> {
        let customers = self.list_customers(principal).await?;
        let vehicle_counts = count_by(self.list_vehicles(principal).await?, |v| v.customer_id);
        let policy_counts = count_by(self.list_policies(principal).await?, |p| p.customer_id);

        Ok(customers
            .into_iter()
            .map(|customer| CustomerSummary {
                vehicle_count: vehicle_counts.get(&customer.id).copied().unwrap_or(0),
                policy_count: policy_counts.get(&customer.id).copied().unwrap_or(0),
                customer,
            })
            .collect())
    }

    // ---- vehicles ----

    pub async fn list_vehicles(&self, principal: &Principal) -> Result<Vec<Vehicle>> {
        match Visibility::for_principal(principal) {
            Visibility::All => self.vehicles.list().await,
            Visibility::Customer(id) => self.vehicles.find_by("customerId", id).await,
            Visibility::Nothing => Ok(Vec::new()),
        }
    }

    pub async fn vehicles_for_customer(
        &self,
        principal: &Principal,
        customer_id: &str,
    ) -> Result<Vec<Vehicle>> {
        if !Visibility::for_principal(principal).allows_customer(customer_id) {
            return Ok(Vec::new());
        }
        self.vehicles.find_by("customerId", customer_id).await
    }

    pub async fn create_vehicle(&self, principal: &Principal, new: NewVehicle) -> Result<Vehicle> {
        require_staff(principal, "create vehicles")?;
        self.require_customer(&new.customer_id).await?;
        let mut vehicle = new.into_vehicle(new_id());
        vehicle.created_at = Some(Utc::now());
        self.vehicles.add(&vehicle).await
    }

    pub async fn update_vehicle(
        &self,
        principal: &Principal,
        id: &str,
        changes: &VehicleChanges,
    ) -> Result<Vehicle> {
        require_staff(principal, "update vehicles")?;
        if let Some(customer_id) = &changes.customer_id {
            self.require_customer(customer_id).await?;
        }
        self.vehicles.update(id, changes).await
    }

    /// Delete a vehicle after every policy that covers it.
    #[instrument(skip(self, principal))]
    pub async fn delete_vehicle(&self, principal: &Principal, id: &str) -> Result<bool> {
        require_staff(principal, "delete vehicles")?;
        self.delete_vehicle_cascade(id).await
    }

    async fn delete_vehicle_cascade(&self, id: &str) -> Result<bool> {
        for policy in self.policies.find_by("vehicleId", id).await? {
            self.policies.delete(&policy.id).await?;
        }
        self.vehicles.delete(id).await
    }

    // ---- policies ----

    pub async fn list_policies(&self, principal: &Principal) -> Result<Vec<Policy>> {
        match Visibility::for_principal(principal) {
            Visibility::All => self.policies.list().await,
            Visibility::Customer(id) => self.policies.find_by("customerId", id).await,
            Visibility::Nothing => Ok(Vec::new()),
        }
    }

    pub async fn policies_for_customer(
        &self,
        principal: &Principal,
        customer_id: &str,
    ) -> Result<Vec<Policy>> {
        if !Visibility::for_principal(principal).allows_customer(customer_id) {
            return Ok(Vec::new());
        }
        self.policies.find_by("customerId", customer_id).await
    }

    pub async fn create_policy(&self, principal: &Principal, new: NewPolicy) -> Result<Policy> {
        require_staff(principal, "create policies")?;
        validate_policy_terms(new.start_date, new.end_date, new.price)?;
        self.require_vehicle_of(&new.vehicle_id, &new.customer_id).await?;
        let mut policy = new.into_policy(new_id());
        policy.created_at = Some(Utc::now());
        self.policies.add(&policy).await
    }

    pub async fn update_policy(
        &self,
        principal: &Principal,
        id: &str,
        changes: &PolicyChanges,
    ) -> Result<Policy> {
        require_staff(principal, "update policies")?;
        let current = self
            .policies
            .get(id)
            .await?
            .ok_or_else(|| PolicyDeskError::NotFound(format!("policy {id}")))?;
        validate_policy_terms(
            changes.start_date.unwrap_or(current.start_date),
            changes.end_date.unwrap_or(current.end_date),
            changes.price.unwrap_or(current.price),
        )?;
        if changes.vehicle_id.is_some() || changes.customer_id.is_some() {
            let vehicle_id = changes.vehicle_id.as_ref().unwrap_or(&current.vehicle_id);
            let customer_id = changes.customer_id.as_ref().unwrap_or(&current.customer_id);
            self.require_vehicle_of(vehicle_id, customer_id).await?;
        }
        self.policies.update(id, changes).await
    }

    pub async fn delete_policy(&self, principal: &Principal, id: &str) -> Result<bool> {
        require_staff(principal, "delete policies")?;
        self.policies.delete(id).await
    }

    /// Visible policies ending within the renewal window from `today`.
    pub async fn upcoming_renewals(
        &self,
        principal: &Principal,
        today: NaiveDate,
    ) -> Result<Vec<UpcomingRenewal>> {
        let policies = self.list_policies(principal).await?;
        let customers = self.list_customers(principal).await?;
        let vehicles = self.list_vehicles(principal).await?;
        Ok(upcoming_renewals(&policies, &customers, &vehicles, today, UPCOMING_RENEWAL_WINDOW_DAYS))
    }

    async fn require_customer(&self, id: &str) -> Result<Customer> {
        self.customers
            .get(id)
            .await?
            .ok_or_else(|| PolicyDeskError::NotFound(format!("customer {id}")))
    }

    async fn require_vehicle_of(&self, vehicle_id: &str, customer_id: &str) -> Result<Vehicle> {
        let vehicle = self
            .vehicles
            .get(vehicle_id)
            .await?
            .ok_or_else(|| PolicyDeskError::NotFound(format!("vehicle {vehicle_id}")))?;
        if vehicle.customer_id != customer_id {
            return Err(PolicyDeskError::InvalidInput(format!(
                "vehicle {vehicle_id} does not belong to customer {customer_id}"
            )));
        }
        Ok(vehicle)
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn validate_policy_terms(start: NaiveDate, end: NaiveDate, price: f64) -> Result<()> {
    if end < start {
        return Err(PolicyDeskError::InvalidInput(format!(
            "policy ends ({end}) before it starts ({start})"
        )));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(PolicyDeskError::InvalidInput(format!("invalid policy price {price}")));
    }
    Ok(())
}

fn count_by<T>(items: Vec<T>, key: impl Fn(T) -> String) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(key(item)).or_insert(0) += 1;
    }
    counts
}
