use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

/// Back-office roles carried in the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    CustomerCare,
    DeliveryCrew,
    StockManager,
    Client,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::CustomerCare,
        Role::DeliveryCrew,
        Role::StockManager,
        Role::Client,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::CustomerCare => "customer_care",
            Role::DeliveryCrew => "delivery_crew",
            Role::StockManager => "stock_manager",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| CoreError::ValidationError(format!("unknown role '{}'", s)))
    }
}

/// Operations a caller may be allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ViewOrders,
    ChangeOrderStatus,
    ViewDeliveries,
    UpdateDelivery,
    ViewNotifications,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ViewOrders,
        Capability::ChangeOrderStatus,
        Capability::ViewDeliveries,
        Capability::UpdateDelivery,
        Capability::ViewNotifications,
    ];
}

/// Single source of truth for who may do what.
const CAPABILITY_TABLE: &[(Capability, &[Role])] = &[
    (Capability::ViewOrders, &[Role::Admin, Role::CustomerCare, Role::Client]),
    (Capability::ChangeOrderStatus, &[Role::Admin, Role::CustomerCare]),
    (Capability::ViewDeliveries, &[Role::Admin, Role::DeliveryCrew, Role::CustomerCare]),
    (Capability::UpdateDelivery, &[Role::Admin, Role::DeliveryCrew]),
    (Capability::ViewNotifications, &Role::ALL),
];

pub fn allows(role: Role, capability: Capability) -> bool {
    CAPABILITY_TABLE
        .iter()
        .find(|(cap, _)| *cap == capability)
        .map(|(_, roles)| roles.contains(&role))
        .unwrap_or(false)
}

pub fn authorize(role: Role, capability: Capability) -> CoreResult<()> {
    if allows(role, capability) {
        Ok(())
    } else {
        Err(CoreError::AccessDenied(format!("{} may not {:?}", role, capability)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_changes_limited_to_staff() {
        assert!(allows(Role::Admin, Capability::ChangeOrderStatus));
        assert!(allows(Role::CustomerCare, Capability::ChangeOrderStatus));
        assert!(!allows(Role::Client, Capability::ChangeOrderStatus));
        assert!(!allows(Role::DeliveryCrew, Capability::ChangeOrderStatus));
        assert!(!allows(Role::StockManager, Capability::ChangeOrderStatus));
    }

    #[test]
    fn test_delivery_updates() {
        assert!(allows(Role::DeliveryCrew, Capability::UpdateDelivery));
        assert!(!allows(Role::CustomerCare, Capability::UpdateDelivery));
        assert!(allows(Role::CustomerCare, Capability::ViewDeliveries));
    }

    #[test]
    fn test_every_capability_has_a_row() {
        assert_eq!(CAPABILITY_TABLE.len(), Capability::ALL.len());
        for cap in Capability::ALL {
            assert!(CAPABILITY_TABLE.iter().any(|(c, _)| *c == cap), "{:?}", cap);
        }
    }

    #[test]
    fn test_every_role_reads_notifications() {
        for role in Role::ALL {
            assert!(authorize(role, Capability::ViewNotifications).is_ok());
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("customer_care".parse::<Role>().unwrap(), Role::CustomerCare);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::DeliveryCrew).unwrap(), "\"delivery_crew\"");
    }
}
