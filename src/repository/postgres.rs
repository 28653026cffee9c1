use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    MenuItemQuery, MenuSortField, NewCartLine, RepoResult, Repository, RepositoryError,
    total_out_of_range,
};
use crate::{
    models::{
        CartLine, Category, CategoryPatch, MenuItem, MenuItemPatch, MenuItemRequest, Order,
        OrderLine, OrderStatus, Role, UpdateOrderRequest, User, order_total,
    },
    policy::OrderScope,
};

const MENU_ITEM_COLUMNS: &str = r#"
    SELECT m.id, m.title, m.price, m.featured, m.category_id AS category, c.title AS category_title
    FROM menu_items m
    JOIN categories c ON c.id = m.category_id
"#;

const CART_LINE_COLUMNS: &str =
    r#"id, user_id AS "user", menu_item_id AS menu_item, quantity, unit_price"#;

const ORDER_LINE_COLUMNS: &str =
    r#"id, order_id AS "order", menu_item_id AS menu_item, quantity, unit_price"#;

const ORDER_COLUMNS: &str = "id, user_id, delivery_crew_id, status, total, date";

/// Raw `orders` row; `status` is stored as text and parsed on the way out.
#[derive(FromRow)]
struct OrderRow {
    id: i64,
    user_id: Uuid,
    delivery_crew_id: Option<Uuid>,
    status: String,
    total: Decimal,
    date: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderLine>) -> RepoResult<Order> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Order {
            id: self.id,
            user: self.user_id,
            delivery_crew: self.delivery_crew_id,
            status,
            total: self.total,
            date: self.date,
            items,
        })
    }
}

/// PostgresRepository
///
/// The `Repository` backed by PostgreSQL. Queries are checked at runtime so
/// the crate builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the lines of the given orders and assembles the nested records,
    /// keeping the row order.
    async fn attach_lines(&self, rows: Vec<OrderRow>) -> RepoResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "SELECT {ORDER_LINE_COLUMNS} FROM order_lines WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<i64, Vec<OrderLine>> = HashMap::new();
        for line in lines {
            by_order.entry(line.order).or_default().push(line);
        }

        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }
}

/// Maps a constraint name from `migrations/` to the request field it guards.
fn constraint_field(constraint: &str) -> &'static str {
    match constraint {
        "categories_title_key" => "title",
        "menu_items_category_fkey" => "category",
        "cart_lines_menu_item_fkey" => "menu_item",
        "cart_lines_user_fkey" | "user_roles_user_fkey" => "user",
        "orders_delivery_crew_fkey" => "delivery_crew",
        _ => "non_field_errors",
    }
}

/// Classifies a failed insert/update.
fn write_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        let field = constraint_field(db.constraint().unwrap_or_default()).to_string();
        if db.is_unique_violation() {
            return RepositoryError::UniqueViolation { field };
        }
        if db.is_foreign_key_violation() {
            return RepositoryError::InvalidReference { field };
        }
    }
    RepositoryError::Database(err)
}

/// Classifies a failed delete; a foreign key violation means the row is still referenced.
fn delete_error(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() {
            return RepositoryError::InUse(format!("{what} is still referenced by other records"));
        }
    }
    RepositoryError::Database(err)
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_menu_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &MenuItemQuery) {
    if let Some(category) = query.category {
        builder.push(" AND m.category_id = ").push_bind(category);
    }
    if let Some(featured) = query.featured {
        builder.push(" AND m.featured = ").push_bind(featured);
    }
    if let Some(price) = query.price {
        builder.push(" AND m.price = ").push_bind(price);
    }
    if let Some(search) = query.search.as_deref() {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (m.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.title ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_order_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: OrderScope) {
    match scope {
        OrderScope::All => {}
        OrderScope::AssignedTo(crew) => {
            builder.push(" AND delivery_crew_id = ").push_bind(crew);
        }
        OrderScope::PlacedBy(user) => {
            builder.push(" AND user_id = ").push_bind(user);
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- Identity ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, email FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(mut user) = user else {
            return Ok(None);
        };

        let roles: Vec<String> =
            sqlx::query_scalar("SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        // Group names this service does not know about are ignored.
        user.roles = roles.iter().filter_map(|r| r.parse::<Role>().ok()).collect();
        Ok(Some(user))
    }

    /// `ON CONFLICT DO NOTHING` keeps the grant idempotent.
    async fn add_role(&self, user_id: Uuid, role: Role) -> RepoResult<bool> {
        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    // --- Categories ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        Ok(
            sqlx::query_as::<_, Category>("SELECT id, title, slug FROM categories ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>> {
        Ok(
            sqlx::query_as::<_, Category>("SELECT id, title, slug FROM categories WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_category(&self, title: &str, slug: &str) -> RepoResult<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (title, slug) VALUES ($1, $2) RETURNING id, title, slug",
        )
        .bind(title)
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)
    }

    async fn update_category(
        &self,
        id: i64,
        patch: &CategoryPatch,
    ) -> RepoResult<Option<Category>> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET title = COALESCE($2, title),
                slug = COALESCE($3, slug)
            WHERE id = $1
            RETURNING id, title, slug
            "#,
        )
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(patch.slug.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)
    }

    async fn delete_category(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| delete_error(e, "category"))?;
        Ok(result.rows_affected() > 0)
    }

    // --- Menu items ---

    async fn list_menu_items(&self, query: &MenuItemQuery) -> RepoResult<(Vec<MenuItem>, u64)> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM menu_items m JOIN categories c ON c.id = m.category_id WHERE TRUE",
        );
        push_menu_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(MENU_ITEM_COLUMNS);
        builder.push(" WHERE TRUE");
        push_menu_filters(&mut builder, query);

        builder.push(" ORDER BY ");
        for term in &query.ordering {
            builder.push(match term.field {
                MenuSortField::Price => "m.price",
                MenuSortField::Title => "m.title",
            });
            builder.push(if term.descending { " DESC, " } else { " ASC, " });
        }
        builder.push("m.id ASC");

        builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let items = builder
            .build_query_as::<MenuItem>()
            .fetch_all(&self.pool)
            .await?;

        Ok((items, u64::try_from(total).unwrap_or_default()))
    }

    async fn get_menu_item(&self, id: i64) -> RepoResult<Option<MenuItem>> {
        Ok(
            sqlx::query_as::<_, MenuItem>(&format!("{MENU_ITEM_COLUMNS} WHERE m.id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Inserts and re-reads through the category join in one statement.
    async fn create_menu_item(&self, req: &MenuItemRequest) -> RepoResult<MenuItem> {
        sqlx::query_as::<_, MenuItem>(
            r#"
            WITH m AS (
                INSERT INTO menu_items (title, price, featured, category_id)
                VALUES ($1, $2, $3, $4)
                RETURNING id, title, price, featured, category_id
            )
            SELECT m.id, m.title, m.price, m.featured, m.category_id AS category, c.title AS category_title
            FROM m JOIN categories c ON c.id = m.category_id
            "#,
        )
        .bind(&req.title)
        .bind(req.price)
        .bind(req.featured)
        .bind(req.category)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)
    }

    async fn update_menu_item(
        &self,
        id: i64,
        patch: &MenuItemPatch,
    ) -> RepoResult<Option<MenuItem>> {
        sqlx::query_as::<_, MenuItem>(
            r#"
            WITH m AS (
                UPDATE menu_items
                SET title = COALESCE($2, title),
                    price = COALESCE($3, price),
                    featured = COALESCE($4, featured),
                    category_id = COALESCE($5, category_id)
                WHERE id = $1
                RETURNING id, title, price, featured, category_id
            )
            SELECT m.id, m.title, m.price, m.featured, m.category_id AS category, c.title AS category_title
            FROM m JOIN categories c ON c.id = m.category_id
            "#,
        )
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(patch.price)
        .bind(patch.featured)
        .bind(patch.category)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)
    }

    /// Cart lines cascade; order lines keep their snapshot with a null reference.
    async fn delete_menu_item(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM menu_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| delete_error(e, "menu item"))?;
        Ok(result.rows_affected() > 0)
    }

    // --- Cart ---

    async fn list_cart_lines(&self, user_id: Uuid) -> RepoResult<Vec<CartLine>> {
        Ok(sqlx::query_as::<_, CartLine>(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_cart_line(&self, id: i64, user_id: Uuid) -> RepoResult<Option<CartLine>> {
        Ok(sqlx::query_as::<_, CartLine>(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn add_cart_line(&self, line: NewCartLine) -> RepoResult<CartLine> {
        sqlx::query_as::<_, CartLine>(&format!(
            "INSERT INTO cart_lines (user_id, menu_item_id, quantity, unit_price) \
             VALUES ($1, $2, $3, $4) RETURNING {CART_LINE_COLUMNS}"
        ))
        .bind(line.user)
        .bind(line.menu_item)
        .bind(line.quantity)
        .bind(line.unit_price)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)
    }

    async fn delete_cart_line(&self, id: i64, user_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Orders ---

    async fn list_orders(&self, scope: OrderScope) -> RepoResult<Vec<Order>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));
        push_order_scope(&mut builder, scope);
        builder.push(" ORDER BY id");

        let rows = builder
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await?;
        self.attach_lines(rows).await
    }

    async fn get_order(&self, id: i64, scope: OrderScope) -> RepoResult<Option<Order>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = "));
        builder.push_bind(id);
        push_order_scope(&mut builder, scope);

        let row = builder
            .build_query_as::<OrderRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(self.attach_lines(row.into_iter().collect()).await?.pop())
    }

    /// place_order
    ///
    /// Runs in one transaction. The cart rows are locked with `FOR UPDATE`, so
    /// a concurrent submit from the same user waits, then finds the rows gone
    /// and sees an empty cart. Any error drops the transaction, which rolls
    /// everything back.
    async fn place_order(&self, user_id: Uuid) -> RepoResult<Option<Order>> {
        let mut tx = self.pool.begin().await?;

        let lines = sqlx::query_as::<_, CartLine>(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE user_id = $1 ORDER BY id FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        if lines.is_empty() {
            tx.rollback().await?;
            return Ok(None);
        }
        let total = order_total(&lines).ok_or_else(total_out_of_range)?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (user_id, status, total) VALUES ($1, $2, $3) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(OrderStatus::Pending.as_str())
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = sqlx::query_as::<_, OrderLine>(&format!(
                "INSERT INTO order_lines (order_id, menu_item_id, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4) RETURNING {ORDER_LINE_COLUMNS}"
            ))
            .bind(row.id)
            .bind(line.menu_item)
            .bind(line.quantity)
            .bind(line.unit_price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        let consumed: Vec<i64> = lines.iter().map(|l| l.id).collect();
        sqlx::query("DELETE FROM cart_lines WHERE id = ANY($1)")
            .bind(&consumed)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        row.into_order(items).map(Some)
    }

    /// The scope check is part of the `WHERE`, so a reassignment that lands
    /// between the handler's read and this write makes it a no-op.
    async fn update_order(
        &self,
        id: i64,
        scope: OrderScope,
        changes: &UpdateOrderRequest,
    ) -> RepoResult<Option<Order>> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE orders SET status = COALESCE(");
        builder
            .push_bind(changes.status.map(OrderStatus::as_str))
            .push(", status), delivery_crew_id = CASE WHEN ")
            .push_bind(changes.delivery_crew.is_some())
            .push(" THEN ")
            .push_bind(changes.delivery_crew.flatten())
            .push(" ELSE delivery_crew_id END WHERE id = ")
            .push_bind(id);
        push_order_scope(&mut builder, scope);
        builder.push(format!(" RETURNING {ORDER_COLUMNS}"));

        let row = builder
            .build_query_as::<OrderRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?;

        Ok(self.attach_lines(row.into_iter().collect()).await?.pop())
    }

    /// Order lines go with the order (ON DELETE CASCADE).
    async fn delete_order(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
