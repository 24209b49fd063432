//! Customer entity and its embedded documents and notes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

use super::entity::Entity;
use super::table::Table;
use crate::impl_domain_enum_conversions;

/// Legal form of a customer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    #[default]
    Individual,
    Corporate,
}

impl_domain_enum_conversions!(CustomerType {
    Individual => "individual",
    Corporate => "corporate",
});

/// Kind of an uploaded customer document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Identity,
    VehicleRegistration,
    #[default]
    Other,
}

impl_domain_enum_conversions!(DocumentType {
    Identity => "identity",
    VehicleRegistration => "vehicle-registration",
    Other => "other",
});

/// Document attached to a customer.
///
/// `url` is an opaque reference produced by blob storage and is never decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub name: String,
    pub url: String,
    pub mime_type: String,
    pub upload_date: DateTime<Utc>,
}

/// Free-text note attached to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerNote {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// Insurance customer.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub identity_number: String,
    pub phone: String,
    #[serde(rename = "type", default)]
    pub customer_type: CustomerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<CustomerDocument>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<CustomerNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Entity for Customer {
    const TABLE: Table = Table::Customers;
    type Changes = CustomerChanges;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Form input for a new customer; the id is assigned on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub identity_number: String,
    pub phone: String,
    #[serde(rename = "type", default)]
    pub customer_type: CustomerType,
    #[serde(default)]
    pub assigned_user_id: Option<String>,
}

impl NewCustomer {
    pub fn into_customer(self, id: String) -> Customer {
        Customer {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            identity_number: self.identity_number,
            phone: self.phone,
            customer_type: self.customer_type,
            assigned_user_id: self.assigned_user_id,
            documents: Vec::new(),
            notes: Vec::new(),
            created_at: None,
        }
    }
}

/// Partial customer update. `None` leaves a field untouched;
/// `assigned_user_id: Some(None)` clears the assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub customer_type: Option<CustomerType>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub assigned_user_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<CustomerDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<CustomerNote>>,
}

/// Upload metadata for a new customer document; the blob lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub name: String,
    pub url: String,
    pub mime_type: String,
}

impl NewDocument {
    pub fn into_document(self, id: String, upload_date: DateTime<Utc>) -> CustomerDocument {
        CustomerDocument {
            id,
            document_type: self.document_type,
            name: self.name,
            url: self.url,
            mime_type: self.mime_type,
            upload_date,
        }
    }
}
