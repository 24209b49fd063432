//! Synchronized tables and their local indexes.

use serde::{Deserialize, Serialize};

use crate::impl_domain_enum_conversions;

/// A table that exists both in the local store and on the remote backend.
///
/// The same name is used on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Customers,
    Vehicles,
    Policies,
    Users,
}

impl_domain_enum_conversions!(Table {
    Customers => "customers",
    Vehicles => "vehicles",
    Policies => "policies",
    Users => "users",
});

impl Table {
    /// Every synchronized table, parents before children.
    pub const ALL: [Self; 4] = [Self::Customers, Self::Vehicles, Self::Policies, Self::Users];

    /// Secondary fields (local names) that can be queried by equality.
    pub const fn index_fields(self) -> &'static [&'static str] {
        match self {
            Self::Customers => {
                &["firstName", "lastName", "identityNumber", "phone", "assignedUserId"]
            }
            Self::Vehicles => &["plate", "brand", "model", "year", "chassisNumber", "customerId"],
            Self::Policies => &[
                "customerId",
                "vehicleId",
                "startDate",
                "endDate",
                "price",
                "type",
                "policyNumber",
            ],
            Self::Users => &["email", "role", "assignedCustomerId"],
        }
    }

    pub fn is_indexed(self, field: &str) -> bool {
        self.index_fields().contains(&field)
    }
}
