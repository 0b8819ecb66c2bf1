use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    WarehouseStaff,
    WarehouseAdmin,
    BudgetAnalyst,
    Engineering,
    Manager,
    OperationsMaintenance,
    Employee,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::WarehouseStaff,
        Role::WarehouseAdmin,
        Role::BudgetAnalyst,
        Role::Engineering,
        Role::Manager,
        Role::OperationsMaintenance,
        Role::Employee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WarehouseStaff => "warehouse_staff",
            Self::WarehouseAdmin => "warehouse_admin",
            Self::BudgetAnalyst => "budget_analyst",
            Self::Engineering => "engineering",
            Self::Manager => "manager",
            Self::OperationsMaintenance => "operations_maintenance",
            Self::Employee => "employee",
        }
    }

    /// Accepts the snake_case wire names plus the spaced labels older clients send
    /// (`"Budget Analyst"`, `"warehouse admin"`).
    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "warehouse_staff" => Some(Self::WarehouseStaff),
            "warehouse_admin" => Some(Self::WarehouseAdmin),
            "budget_analyst" => Some(Self::BudgetAnalyst),
            "engineering" => Some(Self::Engineering),
            "manager" => Some(Self::Manager),
            "operations_maintenance" => Some(Self::OperationsMaintenance),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated identity as seen by the workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub role: Role,
    pub role_confirmed: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self { id: ActorId(id.into()), name: name.into(), role, role_confirmed: true }
    }

    pub fn unconfirmed(mut self) -> Self {
        self.role_confirmed = false;
        self
    }

    /// Role-derived privileges only apply once an administrator confirmed the role.
    pub fn holds(&self, role: Role) -> bool {
        self.role_confirmed && self.role == role
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, Role};

    #[test]
    fn parse_accepts_wire_names_and_labels() {
        assert_eq!(Role::parse("budget_analyst"), Some(Role::BudgetAnalyst));
        assert_eq!(Role::parse("Budget Analyst"), Some(Role::BudgetAnalyst));
        assert_eq!(Role::parse("warehouse admin"), Some(Role::WarehouseAdmin));
        assert_eq!(Role::parse("operations-maintenance"), Some(Role::OperationsMaintenance));
        assert_eq!(Role::parse("auditor"), None);
    }

    #[test]
    fn every_role_round_trips_through_its_wire_name() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn unconfirmed_actor_does_not_hold_its_role() {
        let actor = Actor::new("u-1", "Dana", Role::BudgetAnalyst).unconfirmed();
        assert!(!actor.holds(Role::BudgetAnalyst));
        assert!(Actor::new("u-2", "Eli", Role::BudgetAnalyst).holds(Role::BudgetAnalyst));
    }
}
