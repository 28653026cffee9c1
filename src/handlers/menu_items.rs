use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    AppState,
    auth::AuthUser,
    config::AppConfig,
    error::{AppError, FieldErrors},
    extract::{ValidJson, ValidQuery},
    models::{MenuItem, MenuItemPage, MenuItemPatch, MenuItemRequest},
    policy::{self, Action, ResourceKind},
    repository::{MenuItemQuery, MenuOrdering},
};

/// MenuItemFilter
///
/// Query parameters accepted by `GET /menu-items`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MenuItemFilter {
    /// Category id.
    pub category: Option<i64>,
    pub featured: Option<bool>,
    /// Exact price match.
    #[param(value_type = Option<String>)]
    pub price: Option<Decimal>,
    /// Case-insensitive match on the item title or its category title.
    pub search: Option<String>,
    /// Comma-separated `price`, `-price`, `title`, `-title`.
    pub ordering: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl MenuItemFilter {
    /// Resolves the filter into a store query plus the effective page and page size.
    pub fn resolve(self, config: &AppConfig) -> Result<(MenuItemQuery, u32, u32), AppError> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::Validation(FieldErrors::single(
                "page",
                "page numbers start at 1",
            )));
        }

        let page_size = match self.page_size {
            None | Some(0) => config.menu_page_size,
            Some(n) => n.min(config.menu_max_page_size),
        };

        let query = MenuItemQuery {
            category: self.category,
            featured: self.featured,
            price: self.price,
            search: self.search.filter(|s| !s.trim().is_empty()),
            ordering: self
                .ordering
                .as_deref()
                .map(MenuOrdering::parse_list)
                .unwrap_or_default(),
            offset: u64::from(page - 1) * u64::from(page_size),
            limit: u64::from(page_size),
        };

        Ok((query, page, page_size))
    }
}

/// list_menu_items
///
/// Any authenticated user. Paginated; asking for a page past the end is a 404
/// (page 1 is always valid, even when empty).
#[utoipa::path(
    get,
    path = "/menu-items",
    params(MenuItemFilter),
    responses(
        (status = 200, description = "One page of menu items", body = MenuItemPage),
        (status = 404, description = "Page out of range")
    )
)]
pub async fn list_menu_items(
    user: AuthUser,
    State(state): State<AppState>,
    ValidQuery(filter): ValidQuery<MenuItemFilter>,
) -> Result<Json<MenuItemPage>, AppError> {
    policy::require(&user, ResourceKind::MenuItem, Action::List, None)?;

    let (query, page, page_size) = filter.resolve(&state.config)?;
    let (results, count) = state.repo.list_menu_items(&query).await?;

    if results.is_empty() && page > 1 {
        return Err(AppError::NotFound("page".to_string()));
    }

    let last_page = count.div_ceil(u64::from(page_size));
    Ok(Json(MenuItemPage {
        count,
        page,
        page_size,
        next: (u64::from(page) < last_page).then(|| page + 1),
        previous: (page > 1).then(|| page - 1),
        results,
    }))
}

#[utoipa::path(
    get,
    path = "/menu-items/{id}",
    params(("id" = i64, Path, description = "Menu item ID")),
    responses(
        (status = 200, description = "Found", body = MenuItem),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_menu_item(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MenuItem>, AppError> {
    policy::require(&user, ResourceKind::MenuItem, Action::Retrieve, None)?;
    state
        .repo
        .get_menu_item(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("menu item".to_string()))
}

/// create_menu_item
///
/// Managers only; the role check runs before the payload is looked at.
#[utoipa::path(
    post,
    path = "/menu-items",
    request_body = MenuItemRequest,
    responses(
        (status = 201, description = "Created", body = MenuItem),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Not a manager")
    )
)]
pub async fn create_menu_item(
    user: AuthUser,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<MenuItemRequest>,
) -> Result<(StatusCode, Json<MenuItem>), AppError> {
    policy::require(&user, ResourceKind::MenuItem, Action::Create, None)?;
    payload.validate()?;

    let item = state.repo.create_menu_item(&payload).await?;
    tracing::info!(menu_item_id = item.id, user_id = %user.id, "menu item created");
    Ok((StatusCode::CREATED, Json(item)))
}

#[utoipa::path(
    put,
    path = "/menu-items/{id}",
    params(("id" = i64, Path, description = "Menu item ID")),
    request_body = MenuItemRequest,
    responses(
        (status = 200, description = "Updated", body = MenuItem),
        (status = 403, description = "Not a manager"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_menu_item(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<MenuItemRequest>,
) -> Result<Json<MenuItem>, AppError> {
    policy::require(&user, ResourceKind::MenuItem, Action::Update, None)?;
    payload.validate()?;
    apply(&state, id, &MenuItemPatch::from(payload)).await
}

#[utoipa::path(
    patch,
    path = "/menu-items/{id}",
    params(("id" = i64, Path, description = "Menu item ID")),
    request_body = MenuItemPatch,
    responses(
        (status = 200, description = "Updated", body = MenuItem),
        (status = 403, description = "Not a manager"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn partial_update_menu_item(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<MenuItemPatch>,
) -> Result<Json<MenuItem>, AppError> {
    policy::require(&user, ResourceKind::MenuItem, Action::PartialUpdate, None)?;
    payload.validate()?;
    apply(&state, id, &payload).await
}

async fn apply(state: &AppState, id: i64, patch: &MenuItemPatch) -> Result<Json<MenuItem>, AppError> {
    let item = state
        .repo
        .update_menu_item(id, patch)
        .await?
        .ok_or_else(|| AppError::NotFound("menu item".to_string()))?;
    tracing::info!(menu_item_id = id, "menu item updated");
    Ok(Json(item))
}

/// delete_menu_item
///
/// Removes the item from every cart; placed orders keep their line snapshots.
#[utoipa::path(
    delete,
    path = "/menu-items/{id}",
    params(("id" = i64, Path, description = "Menu item ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not a manager"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_menu_item(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    policy::require(&user, ResourceKind::MenuItem, Action::Destroy, None)?;
    if state.repo.delete_menu_item(id).await? {
        tracing::info!(menu_item_id = id, user_id = %user.id, "menu item deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("menu item".to_string()))
    }
}
