use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, FieldErrors};

// --- Identity ---

/// Role
///
/// An authorization group held by a user. The wire names are the group names
/// the identity provider uses ("Delivery Crew" carries a space).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, ToSchema,
)]
#[ts(export)]
pub enum Role {
    Manager,
    #[serde(rename = "Delivery Crew")]
    DeliveryCrew,
    Customer,
}

#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "Manager",
            Self::DeliveryCrew => "Delivery Crew",
            Self::Customer => "Customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Manager" => Ok(Self::Manager),
            "Delivery Crew" => Ok(Self::DeliveryCrew),
            "Customer" => Ok(Self::Customer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// RoleSet
///
/// The roles resolved for an identity at request entry. Holding several roles
/// at once is allowed; nothing here enforces exclusivity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// Returns true if the role was not already present.
    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<Role> {
        self.iter().collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// User
///
/// A user profile mirrored from the identity provider (`profiles` table) with
/// its role memberships (`user_roles` table).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    // Loaded with a second query; not a column of `profiles`.
    #[sqlx(skip)]
    pub roles: Vec<Role>,
}

impl User {
    pub fn role_set(&self) -> RoleSet {
        self.roles.iter().copied().collect()
    }
}

// --- Catalog ---

/// Category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub title: String,
    pub slug: String,
}

/// CategoryRequest
///
/// Body of POST and PUT on `/categories`. The slug is derived from the title
/// when omitted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CategoryRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl CategoryRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if self.title.trim().is_empty() {
            errors.add("title", "this field may not be blank");
        }
        if self.slug.as_deref().is_some_and(|s| s.trim().is_empty()) {
            errors.add("slug", "this field may not be blank");
        }
        errors.into_result()
    }

    pub fn resolved_slug(&self) -> String {
        self.slug
            .as_deref()
            .map_or_else(|| slugify(&self.title), str::to_string)
    }
}

/// CategoryPatch
///
/// Body of PATCH on `/categories/{id}`; only supplied fields change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl CategoryPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            errors.add("title", "this field may not be blank");
        }
        if self.slug.as_deref().is_some_and(|s| s.trim().is_empty()) {
            errors.add("slug", "this field may not be blank");
        }
        errors.into_result()
    }
}

impl From<CategoryRequest> for CategoryPatch {
    fn from(req: CategoryRequest) -> Self {
        let slug = req.resolved_slug();
        Self {
            title: Some(req.title),
            slug: Some(slug),
        }
    }
}

/// slugify
///
/// Lowercase ASCII alphanumerics; every other run of characters becomes a
/// single `-`, with no leading or trailing dash.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// MenuItem
///
/// `category` is the category id; `category_title` is a read-only expansion
/// filled in on reads and ignored on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct MenuItem {
    pub id: i64,
    pub title: String,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "5.00")]
    pub price: Decimal,
    pub featured: bool,
    pub category: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[sqlx(default)]
    pub category_title: Option<String>,
}

/// Decimal places a price may carry; prices are stored as NUMERIC(6, 2).
pub const PRICE_SCALE: u32 = 2;
/// Largest price NUMERIC(6, 2) holds.
pub const MAX_PRICE: Decimal = Decimal::from_parts(999_999, 0, 0, false, PRICE_SCALE);

fn check_price(errors: &mut FieldErrors, price: Decimal) {
    if price <= Decimal::ZERO {
        errors.add("price", "ensure this value is greater than 0");
    } else if price > MAX_PRICE {
        errors.add("price", format!("ensure this value is less than or equal to {MAX_PRICE}"));
    }
    if price.scale() > PRICE_SCALE {
        errors.add(
            "price",
            format!("ensure that there are no more than {PRICE_SCALE} decimal places"),
        );
    }
}

/// MenuItemRequest
///
/// Body of POST and PUT on `/menu-items`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MenuItemRequest {
    pub title: String,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "5.00")]
    pub price: Decimal,
    #[serde(default)]
    pub featured: bool,
    pub category: i64,
}

impl MenuItemRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if self.title.trim().is_empty() {
            errors.add("title", "this field may not be blank");
        }
        check_price(&mut errors, self.price);
        errors.into_result()
    }
}

/// MenuItemPatch
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MenuItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
}

impl MenuItemPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            errors.add("title", "this field may not be blank");
        }
        if let Some(price) = self.price {
            check_price(&mut errors, price);
        }
        errors.into_result()
    }
}

impl From<MenuItemRequest> for MenuItemPatch {
    fn from(req: MenuItemRequest) -> Self {
        Self {
            title: Some(req.title),
            price: Some(req.price),
            featured: Some(req.featured),
            category: Some(req.category),
        }
    }
}

/// MenuItemPage
///
/// Page-number envelope for `GET /menu-items`. `next` and `previous` are page
/// numbers, null at the ends.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MenuItemPage {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<MenuItem>,
}

// --- Cart ---

/// CartLine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CartLine {
    pub id: i64,
    pub user: Uuid,
    pub menu_item: i64,
    pub quantity: i32,
    /// Menu item price at the moment the line was added.
    #[ts(type = "string")]
    #[schema(value_type = String, example = "5.00")]
    pub unit_price: Decimal,
}

impl CartLine {
    /// `None` when the product does not fit a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.unit_price)
    }
}

/// Most units of one menu item a single cart line may hold.
pub const MAX_QUANTITY: i32 = 1000;

/// CreateCartLineRequest
///
/// `user` is accepted so that clients sending it do not fail to parse, but the
/// handler always replaces it with the authenticated identity.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCartLineRequest {
    pub menu_item: i64,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Uuid>,
}

impl CreateCartLineRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        if self.quantity < 1 {
            errors.add("quantity", "ensure this value is greater than or equal to 1");
        } else if self.quantity > MAX_QUANTITY {
            errors.add(
                "quantity",
                format!("ensure this value is less than or equal to {MAX_QUANTITY}"),
            );
        }
        errors.into_result()
    }
}

// --- Orders ---

/// OrderStatus
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OrderStatus {
    #[default]
    Pending,
    Assigned,
    OutForDelivery,
    Delivered,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// OrderLine
///
/// Snapshot of one cart line taken when the order was placed. `menu_item`
/// becomes null if the menu item is later deleted; the snapshot stays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct OrderLine {
    pub id: i64,
    pub order: i64,
    pub menu_item: Option<i64>,
    pub quantity: i32,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "5.00")]
    pub unit_price: Decimal,
}

/// Order
///
/// Serialized with its lines nested under `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Order {
    pub id: i64,
    pub user: Uuid,
    pub delivery_crew: Option<Uuid>,
    pub status: OrderStatus,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "13.00")]
    pub total: Decimal,
    #[ts(type = "string")]
    pub date: DateTime<Utc>,
    pub items: Vec<OrderLine>,
}

/// Largest total `orders.total` (NUMERIC(14, 2)) holds.
pub const MAX_ORDER_TOTAL: Decimal =
    Decimal::from_parts(276_447_231, 23_283, 0, false, PRICE_SCALE);

/// Sum of `quantity * unit_price` over the lines, or `None` when it overflows
/// or exceeds `MAX_ORDER_TOTAL`.
pub fn order_total(lines: &[CartLine]) -> Option<Decimal> {
    lines
        .iter()
        .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.line_total()?))
        .filter(|total| *total <= MAX_ORDER_TOTAL)
}

/// UpdateOrderRequest
///
/// Body of PUT and PATCH on `/orders/{id}`. Which fields a caller may supply
/// depends on their roles. For `delivery_crew`, an absent key leaves the value
/// alone while an explicit `null` unassigns.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateOrderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<Uuid>, nullable)]
    pub delivery_crew: Option<Option<Uuid>>,
}

impl UpdateOrderRequest {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.delivery_crew.is_none()
    }
}

// Wraps whatever was present (including null) in `Some`; `default` covers absence.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// --- Responses ---

/// ManagerMessage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ManagerMessage {
    pub message: String,
}
