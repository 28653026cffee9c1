use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    MenuItemQuery, MenuSortField, NewCartLine, RepoResult, Repository, RepositoryError,
    total_out_of_range,
};
use crate::{
    models::{
        CartLine, Category, CategoryPatch, MenuItem, MenuItemPatch, MenuItemRequest, Order,
        OrderLine, OrderStatus, PRICE_SCALE, Role, UpdateOrderRequest, User, order_total,
    },
    policy::OrderScope,
};

#[derive(Default)]
struct Store {
    last_id: i64,
    users: HashMap<Uuid, User>,
    categories: BTreeMap<i64, Category>,
    // Stored without `category_title`; it is joined in on every read.
    menu_items: BTreeMap<i64, MenuItem>,
    cart_lines: BTreeMap<i64, CartLine>,
    orders: BTreeMap<i64, Order>,
}

impl Store {
    fn allocate_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn expand(&self, item: &MenuItem) -> MenuItem {
        MenuItem {
            category_title: self.categories.get(&item.category).map(|c| c.title.clone()),
            ..item.clone()
        }
    }

    fn title_taken(&self, title: &str, except: Option<i64>) -> bool {
        self.categories
            .values()
            .any(|c| c.title == title && Some(c.id) != except)
    }
}

fn invalid(field: &str) -> RepositoryError {
    RepositoryError::InvalidReference {
        field: field.to_string(),
    }
}

/// Prices are kept at the column scale, as NUMERIC(6, 2) returns them.
fn stored_price(mut price: Decimal) -> Decimal {
    price.rescale(PRICE_SCALE);
    price
}

fn compare(a: &MenuItem, b: &MenuItem, query: &MenuItemQuery) -> Ordering {
    for term in &query.ordering {
        let ord = match term.field {
            MenuSortField::Price => a.price.cmp(&b.price),
            MenuSortField::Title => a.title.cmp(&b.title),
        };
        let ord = if term.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory behind one async lock. It
/// mirrors the constraint behaviour of the Postgres schema (unique titles,
/// required references, cascades) and makes `place_order` atomic by doing all
/// of its work under a single write guard. Used by the test suites and for
/// running the router without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user as the identity provider would.
    pub async fn insert_user(&self, id: Uuid, email: &str, roles: &[Role]) -> User {
        let user = User {
            id,
            email: email.to_string(),
            roles: roles.to_vec(),
        };
        self.store.write().await.users.insert(id, user.clone());
        user
    }

    /// Every cart line regardless of owner, for assertions in tests.
    pub async fn all_cart_lines(&self) -> Vec<CartLine> {
        self.store.read().await.cart_lines.values().cloned().collect()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- Identity ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn add_role(&self, user_id: Uuid, role: Role) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        let user = store.users.get_mut(&user_id).ok_or_else(|| invalid("user"))?;
        if user.roles.contains(&role) {
            return Ok(false);
        }
        user.roles.push(role);
        user.roles.sort();
        Ok(true)
    }

    // --- Categories ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        Ok(self.store.read().await.categories.values().cloned().collect())
    }

    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>> {
        Ok(self.store.read().await.categories.get(&id).cloned())
    }

    async fn create_category(&self, title: &str, slug: &str) -> RepoResult<Category> {
        let mut store = self.store.write().await;
        if store.title_taken(title, None) {
            return Err(RepositoryError::UniqueViolation {
                field: "title".to_string(),
            });
        }
        let category = Category {
            id: store.allocate_id(),
            title: title.to_string(),
            slug: slug.to_string(),
        };
        store.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: i64,
        patch: &CategoryPatch,
    ) -> RepoResult<Option<Category>> {
        let mut store = self.store.write().await;
        if let Some(title) = patch.title.as_deref() {
            if store.title_taken(title, Some(id)) {
                return Err(RepositoryError::UniqueViolation {
                    field: "title".to_string(),
                });
            }
        }
        let Some(category) = store.categories.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = &patch.title {
            category.title.clone_from(title);
        }
        if let Some(slug) = &patch.slug {
            category.slug.clone_from(slug);
        }
        Ok(Some(category.clone()))
    }

    async fn delete_category(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.menu_items.values().any(|m| m.category == id) {
            return Err(RepositoryError::InUse(
                "category is still referenced by other records".to_string(),
            ));
        }
        Ok(store.categories.remove(&id).is_some())
    }

    // --- Menu items ---

    async fn list_menu_items(&self, query: &MenuItemQuery) -> RepoResult<(Vec<MenuItem>, u64)> {
        let store = self.store.read().await;
        let needle = query.search.as_deref().map(str::to_lowercase);

        let mut matches: Vec<MenuItem> = store
            .menu_items
            .values()
            .map(|item| store.expand(item))
            .filter(|item| query.category.is_none_or(|c| item.category == c))
            .filter(|item| query.featured.is_none_or(|f| item.featured == f))
            .filter(|item| query.price.is_none_or(|p| item.price == p))
            .filter(|item| {
                needle.as_deref().is_none_or(|n| {
                    item.title.to_lowercase().contains(n)
                        || item
                            .category_title
                            .as_deref()
                            .is_some_and(|t| t.to_lowercase().contains(n))
                })
            })
            .collect();

        matches.sort_by(|a, b| compare(a, b, query));
        let total = matches.len() as u64;

        let window = matches
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .collect();

        Ok((window, total))
    }

    async fn get_menu_item(&self, id: i64) -> RepoResult<Option<MenuItem>> {
        let store = self.store.read().await;
        Ok(store.menu_items.get(&id).map(|item| store.expand(item)))
    }

    async fn create_menu_item(&self, req: &MenuItemRequest) -> RepoResult<MenuItem> {
        let mut store = self.store.write().await;
        if !store.categories.contains_key(&req.category) {
            return Err(invalid("category"));
        }
        let item = MenuItem {
            id: store.allocate_id(),
            title: req.title.clone(),
            price: stored_price(req.price),
            featured: req.featured,
            category: req.category,
            category_title: None,
        };
        store.menu_items.insert(item.id, item.clone());
        Ok(store.expand(&item))
    }

    async fn update_menu_item(
        &self,
        id: i64,
        patch: &MenuItemPatch,
    ) -> RepoResult<Option<MenuItem>> {
        let mut store = self.store.write().await;
        if let Some(category) = patch.category {
            if !store.categories.contains_key(&category) {
                return Err(invalid("category"));
            }
        }
        let Some(item) = store.menu_items.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = &patch.title {
            item.title.clone_from(title);
        }
        if let Some(price) = patch.price {
            item.price = stored_price(price);
        }
        if let Some(featured) = patch.featured {
            item.featured = featured;
        }
        if let Some(category) = patch.category {
            item.category = category;
        }
        let item = item.clone();
        Ok(Some(store.expand(&item)))
    }

    async fn delete_menu_item(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.menu_items.remove(&id).is_none() {
            return Ok(false);
        }
        store.cart_lines.retain(|_, line| line.menu_item != id);
        for order in store.orders.values_mut() {
            for line in &mut order.items {
                if line.menu_item == Some(id) {
                    line.menu_item = None;
                }
            }
        }
        Ok(true)
    }

    // --- Cart ---

    async fn list_cart_lines(&self, user_id: Uuid) -> RepoResult<Vec<CartLine>> {
        Ok(self
            .store
            .read()
            .await
            .cart_lines
            .values()
            .filter(|line| line.user == user_id)
            .cloned()
            .collect())
    }

    async fn get_cart_line(&self, id: i64, user_id: Uuid) -> RepoResult<Option<CartLine>> {
        Ok(self
            .store
            .read()
            .await
            .cart_lines
            .get(&id)
            .filter(|line| line.user == user_id)
            .cloned())
    }

    async fn add_cart_line(&self, line: NewCartLine) -> RepoResult<CartLine> {
        let mut store = self.store.write().await;
        if !store.users.contains_key(&line.user) {
            return Err(invalid("user"));
        }
        if !store.menu_items.contains_key(&line.menu_item) {
            return Err(invalid("menu_item"));
        }
        let line = CartLine {
            id: store.allocate_id(),
            user: line.user,
            menu_item: line.menu_item,
            quantity: line.quantity,
            unit_price: line.unit_price,
        };
        store.cart_lines.insert(line.id, line.clone());
        Ok(line)
    }

    async fn delete_cart_line(&self, id: i64, user_id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.cart_lines.get(&id).is_some_and(|line| line.user == user_id) {
            store.cart_lines.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    // --- Orders ---

    async fn list_orders(&self, scope: OrderScope) -> RepoResult<Vec<Order>> {
        Ok(self
            .store
            .read()
            .await
            .orders
            .values()
            .filter(|order| scope.includes(order.user, order.delivery_crew))
            .cloned()
            .collect())
    }

    async fn get_order(&self, id: i64, scope: OrderScope) -> RepoResult<Option<Order>> {
        Ok(self
            .store
            .read()
            .await
            .orders
            .get(&id)
            .filter(|order| scope.includes(order.user, order.delivery_crew))
            .cloned())
    }

    async fn place_order(&self, user_id: Uuid) -> RepoResult<Option<Order>> {
        let mut store = self.store.write().await;

        let lines: Vec<CartLine> = store
            .cart_lines
            .values()
            .filter(|line| line.user == user_id)
            .cloned()
            .collect();
        if lines.is_empty() {
            return Ok(None);
        }

        let total = order_total(&lines).ok_or_else(total_out_of_range)?;
        let order_id = store.allocate_id();
        let items = lines
            .iter()
            .map(|line| OrderLine {
                id: store.allocate_id(),
                order: order_id,
                menu_item: Some(line.menu_item),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        let order = Order {
            id: order_id,
            user: user_id,
            delivery_crew: None,
            status: OrderStatus::Pending,
            total,
            date: Utc::now(),
            items,
        };

        store.orders.insert(order.id, order.clone());
        store.cart_lines.retain(|_, line| line.user != user_id);
        Ok(Some(order))
    }

    async fn update_order(
        &self,
        id: i64,
        scope: OrderScope,
        changes: &UpdateOrderRequest,
    ) -> RepoResult<Option<Order>> {
        let mut store = self.store.write().await;
        if let Some(Some(crew)) = changes.delivery_crew {
            if !store.users.contains_key(&crew) {
                return Err(invalid("delivery_crew"));
            }
        }
        let Some(order) = store
            .orders
            .get_mut(&id)
            .filter(|order| scope.includes(order.user, order.delivery_crew))
        else {
            return Ok(None);
        };
        if let Some(status) = changes.status {
            order.status = status;
        }
        if let Some(crew) = changes.delivery_crew {
            order.delivery_crew = crew;
        }
        Ok(Some(order.clone()))
    }

    async fn delete_order(&self, id: i64) -> RepoResult<bool> {
        Ok(self.store.write().await.orders.remove(&id).is_some())
    }
}
