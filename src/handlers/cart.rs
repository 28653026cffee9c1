use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, FieldErrors},
    extract::ValidJson,
    models::{CartLine, CreateCartLineRequest},
    policy::{self, Action, Ownership, ResourceKind},
    repository::NewCartLine,
};

/// list_cart
///
/// The caller's own cart lines. Other users' lines are never visible.
#[utoipa::path(
    get,
    path = "/cart",
    responses(
        (status = 200, description = "Lines in the caller's cart", body = [CartLine]),
        (status = 403, description = "Not a customer")
    )
)]
pub async fn list_cart(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CartLine>>, AppError> {
    policy::require(&user, ResourceKind::Cart, Action::List, None)?;
    Ok(Json(state.repo.list_cart_lines(user.id).await?))
}

#[utoipa::path(
    get,
    path = "/cart/{id}",
    params(("id" = i64, Path, description = "Cart line ID")),
    responses(
        (status = 200, description = "Found", body = CartLine),
        (status = 404, description = "Not in the caller's cart")
    )
)]
pub async fn get_cart_line(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CartLine>, AppError> {
    policy::require(&user, ResourceKind::Cart, Action::Retrieve, None)?;
    let line = state
        .repo
        .get_cart_line(id, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("cart line".to_string()))?;

    let owner = Ownership {
        owner: line.user,
        assignee: None,
    };
    policy::require(&user, ResourceKind::Cart, Action::Retrieve, Some(&owner))?;
    Ok(Json(line))
}

/// add_to_cart
///
/// Customers only. Whatever `user` the body carries, the line belongs to the
/// caller. The unit price is copied from the menu item as it is right now.
#[utoipa::path(
    post,
    path = "/cart",
    request_body = CreateCartLineRequest,
    responses(
        (status = 201, description = "Added", body = CartLine),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Not a customer")
    )
)]
pub async fn add_to_cart(
    user: AuthUser,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateCartLineRequest>,
) -> Result<(StatusCode, Json<CartLine>), AppError> {
    policy::require(&user, ResourceKind::Cart, Action::Create, None)?;
    payload.validate()?;

    let item = state
        .repo
        .get_menu_item(payload.menu_item)
        .await?
        .ok_or_else(|| {
            AppError::Validation(FieldErrors::single("menu_item", "menu item does not exist"))
        })?;

    if payload.user.is_some_and(|requested| requested != user.id) {
        tracing::debug!(user_id = %user.id, "ignoring user supplied in cart payload");
    }

    let line = state
        .repo
        .add_cart_line(NewCartLine {
            user: user.id,
            menu_item: item.id,
            quantity: payload.quantity,
            unit_price: item.price,
        })
        .await?;

    tracing::info!(cart_line_id = line.id, user_id = %user.id, "cart line added");
    Ok((StatusCode::CREATED, Json(line)))
}

/// remove_from_cart
///
/// A line id that belongs to someone else is reported exactly like a missing one.
#[utoipa::path(
    delete,
    path = "/cart/{id}",
    params(("id" = i64, Path, description = "Cart line ID")),
    responses(
        (status = 204, description = "Removed"),
        (status = 403, description = "Not a customer"),
        (status = 404, description = "Not in the caller's cart")
    )
)]
pub async fn remove_from_cart(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    policy::require(&user, ResourceKind::Cart, Action::Destroy, None)?;
    if state.repo.delete_cart_line(id, user.id).await? {
        tracing::info!(cart_line_id = id, user_id = %user.id, "cart line removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("cart line".to_string()))
    }
}
