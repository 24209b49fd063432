//! Vehicle entity.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::table::Table;

/// Insured vehicle, owned by exactly one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub plate: String,
    pub brand: String,
    pub model: String,
    pub year: String,
    pub chassis_number: String,
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Vehicle {
    pub fn description(&self) -> String {
        format!("{} {} ({})", self.brand, self.model, self.plate)
    }
}

impl Entity for Vehicle {
    const TABLE: Table = Table::Vehicles;
    type Changes = VehicleChanges;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    pub plate: String,
    pub brand: String,
    pub model: String,
    pub year: String,
    pub chassis_number: String,
    pub customer_id: String,
    #[serde(default)]
    pub inspection_date: Option<NaiveDate>,
}

impl NewVehicle {
    pub fn into_vehicle(self, id: String) -> Vehicle {
        Vehicle {
            id,
            plate: self.plate,
            brand: self.brand,
            model: self.model,
            year: self.year,
            chassis_number: self.chassis_number,
            customer_id: self.customer_id,
            inspection_date: self.inspection_date,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chassis_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub inspection_date: Option<Option<NaiveDate>>,
}
