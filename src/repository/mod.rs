use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{
        CartLine, Category, CategoryPatch, MAX_ORDER_TOTAL, MenuItem, MenuItemPatch,
        MenuItemRequest, Order, Role, UpdateOrderRequest, User,
    },
    policy::OrderScope,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Store failures, classified so the handler layer can tell a client mistake
/// (duplicate title, dangling reference, record still in use) from an opaque
/// database fault.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("unique constraint violated on {field}")]
    UniqueViolation { field: String },

    #[error("reference in {field} does not resolve")]
    InvalidReference { field: String },

    #[error("{0}")]
    InUse(String),

    /// A computed value does not fit the stored range, e.g. an order total.
    #[error("{field} out of range: {message}")]
    OutOfRange { field: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

fn total_out_of_range() -> RepositoryError {
    RepositoryError::OutOfRange {
        field: "cart".to_string(),
        message: format!("order total exceeds {MAX_ORDER_TOTAL}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuSortField {
    Price,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuOrdering {
    pub field: MenuSortField,
    pub descending: bool,
}

impl MenuOrdering {
    /// Parses `price,-title`-style input. Unknown terms are skipped.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',')
            .filter_map(|term| {
                let term = term.trim();
                let (descending, name) = match term.strip_prefix('-') {
                    Some(rest) => (true, rest),
                    None => (false, term),
                };
                let field = match name {
                    "price" => MenuSortField::Price,
                    "title" => MenuSortField::Title,
                    _ => return None,
                };
                Some(Self { field, descending })
            })
            .collect()
    }
}

/// MenuItemQuery
///
/// A fully resolved menu listing request: filters, ordering and the window to
/// return. Ties (and the no-ordering case) fall back to ascending id.
#[derive(Debug, Clone, Default)]
pub struct MenuItemQuery {
    pub category: Option<i64>,
    pub featured: Option<bool>,
    pub price: Option<Decimal>,
    /// Case-insensitive substring over item title and category title.
    pub search: Option<String>,
    pub ordering: Vec<MenuOrdering>,
    pub offset: u64,
    pub limit: u64,
}

/// NewCartLine
///
/// A cart line ready to persist: the owner is already the authenticated user
/// and the unit price is already snapshotted.
#[derive(Debug, Clone)]
pub struct NewCartLine {
    pub user: Uuid,
    pub menu_item: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Repository
///
/// Persistence contract used by every handler. Implementations must keep
/// `place_order` atomic: either the order, all of its lines and the removal of
/// the consumed cart lines are stored together, or nothing is.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    /// Returns true when the role was newly granted, false if already held.
    async fn add_role(&self, user_id: Uuid, role: Role) -> RepoResult<bool>;

    // --- Categories ---
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>>;
    async fn create_category(&self, title: &str, slug: &str) -> RepoResult<Category>;
    async fn update_category(&self, id: i64, patch: &CategoryPatch)
    -> RepoResult<Option<Category>>;
    /// Fails with `InUse` while menu items still reference the category.
    async fn delete_category(&self, id: i64) -> RepoResult<bool>;

    // --- Menu items ---
    /// Returns the requested window and the total number of matches.
    async fn list_menu_items(&self, query: &MenuItemQuery) -> RepoResult<(Vec<MenuItem>, u64)>;
    async fn get_menu_item(&self, id: i64) -> RepoResult<Option<MenuItem>>;
    async fn create_menu_item(&self, req: &MenuItemRequest) -> RepoResult<MenuItem>;
    async fn update_menu_item(&self, id: i64, patch: &MenuItemPatch)
    -> RepoResult<Option<MenuItem>>;
    async fn delete_menu_item(&self, id: i64) -> RepoResult<bool>;

    // --- Cart (always narrowed to one user) ---
    async fn list_cart_lines(&self, user_id: Uuid) -> RepoResult<Vec<CartLine>>;
    async fn get_cart_line(&self, id: i64, user_id: Uuid) -> RepoResult<Option<CartLine>>;
    async fn add_cart_line(&self, line: NewCartLine) -> RepoResult<CartLine>;
    async fn delete_cart_line(&self, id: i64, user_id: Uuid) -> RepoResult<bool>;

    // --- Orders ---
    async fn list_orders(&self, scope: OrderScope) -> RepoResult<Vec<Order>>;
    async fn get_order(&self, id: i64, scope: OrderScope) -> RepoResult<Option<Order>>;
    /// Converts the user's cart into an order in one transaction.
    /// `None` means the cart was empty and nothing was written.
    async fn place_order(&self, user_id: Uuid) -> RepoResult<Option<Order>>;
    /// Writes only when the order is inside `scope` at write time; `None`
    /// otherwise.
    async fn update_order(
        &self,
        id: i64,
        scope: OrderScope,
        changes: &UpdateOrderRequest,
    ) -> RepoResult<Option<Order>>;
    async fn delete_order(&self, id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;
