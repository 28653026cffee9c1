//! Authorization policy.
//!
//! Every role decision in the service goes through this module. Handlers ask
//! [`authorize`] whether an action is allowed and never compare role names
//! themselves. The role set comes from [`AuthUser`], resolved once at request
//! entry; nothing here touches the store.

use uuid::Uuid;

use crate::{auth::AuthUser, error::AppError, models::Role};

/// The kind of resource an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Category,
    MenuItem,
    Cart,
    Order,
    UserRoleAssignment,
    ManagerArea,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    PartialUpdate,
    Destroy,
}

impl Action {
    const fn is_write(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::PartialUpdate | Self::Destroy
        )
    }
}

/// Ownership
///
/// Who a concrete record belongs to: the placing/owning user, and for orders
/// the assigned delivery crew member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub owner: Uuid,
    pub assignee: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Converts a denial into `AppError::Forbidden` carrying the reason.
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(AppError::Forbidden(reason.to_string())),
        }
    }
}

/// authorize
///
/// Evaluates the rule table for `(resource, action)`. `target` narrows the
/// decision to a specific record when the rule depends on ownership.
pub fn authorize(
    user: &AuthUser,
    resource: ResourceKind,
    action: Action,
    target: Option<&Ownership>,
) -> Decision {
    let is_manager = user.has_role(Role::Manager);

    match resource {
        ResourceKind::Category | ResourceKind::MenuItem => {
            if !action.is_write() || is_manager {
                Decision::Allow
            } else if resource == ResourceKind::Category {
                Decision::Deny("Only managers can modify categories.")
            } else {
                Decision::Deny("Only managers can modify menu items.")
            }
        }

        ResourceKind::Cart => {
            if !user.has_role(Role::Customer) {
                return Decision::Deny("Only customers can use the cart.");
            }
            match action {
                Action::List | Action::Create => Decision::Allow,
                Action::Retrieve | Action::Destroy => match target {
                    Some(t) if t.owner != user.id => Decision::Deny("This cart line is not yours."),
                    _ => Decision::Allow,
                },
                Action::Update | Action::PartialUpdate => {
                    Decision::Deny("Cart lines cannot be edited; remove and add again.")
                }
            }
        }

        ResourceKind::Order => match action {
            Action::List | Action::Retrieve | Action::Create => Decision::Allow,
            Action::Update | Action::PartialUpdate => {
                if is_manager {
                    Decision::Allow
                } else if user.has_role(Role::DeliveryCrew) {
                    match target {
                        Some(t) if t.assignee != Some(user.id) => {
                            Decision::Deny("This order is not assigned to you.")
                        }
                        _ => Decision::Allow,
                    }
                } else {
                    Decision::Deny("Only delivery crew or managers can update orders.")
                }
            }
            Action::Destroy => {
                if is_manager {
                    Decision::Allow
                } else {
                    Decision::Deny("Only managers can delete orders.")
                }
            }
        },

        ResourceKind::UserRoleAssignment => {
            if action == Action::Create && is_manager {
                Decision::Allow
            } else {
                Decision::Deny("Only managers can assign delivery crew.")
            }
        }

        ResourceKind::ManagerArea => {
            if is_manager {
                Decision::Allow
            } else {
                Decision::Deny("You are not authorized to view this.")
            }
        }
    }
}

/// Shorthand for `authorize(..).into_result()`, logging the denial.
pub fn require(
    user: &AuthUser,
    resource: ResourceKind,
    action: Action,
    target: Option<&Ownership>,
) -> Result<(), AppError> {
    let decision = authorize(user, resource, action, target);
    if let Decision::Deny(reason) = &decision {
        tracing::warn!(user_id = %user.id, ?resource, ?action, reason, "request denied");
    }
    decision.into_result()
}

/// OrderScope
///
/// Which orders a caller can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    All,
    AssignedTo(Uuid),
    PlacedBy(Uuid),
}

impl OrderScope {
    pub fn includes(self, user: Uuid, delivery_crew: Option<Uuid>) -> bool {
        match self {
            Self::All => true,
            Self::AssignedTo(crew) => delivery_crew == Some(crew),
            Self::PlacedBy(owner) => user == owner,
        }
    }
}

/// The most privileged role wins: Manager, then Delivery Crew, then everyone else.
pub fn order_scope(user: &AuthUser) -> OrderScope {
    if user.has_role(Role::Manager) {
        OrderScope::All
    } else if user.has_role(Role::DeliveryCrew) {
        OrderScope::AssignedTo(user.id)
    } else {
        OrderScope::PlacedBy(user.id)
    }
}

/// OrderFieldGrant
///
/// Fields of an order the caller may change. Users holding both roles get both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderFieldGrant {
    pub status: bool,
    pub delivery_crew: bool,
}

pub fn order_field_grant(user: &AuthUser) -> OrderFieldGrant {
    OrderFieldGrant {
        status: user.has_role(Role::DeliveryCrew),
        delivery_crew: user.has_role(Role::Manager),
    }
}
