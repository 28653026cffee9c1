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
    models::{Order, Role, UpdateOrderRequest},
    policy::{self, Action, Ownership, ResourceKind},
};

/// list_orders
///
/// Managers see every order, delivery crew the orders assigned to them, and
/// everyone else the orders they placed.
#[utoipa::path(
    get,
    path = "/orders",
    responses((status = 200, description = "Orders visible to the caller", body = [Order]))
)]
pub async fn list_orders(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Order>>, AppError> {
    policy::require(&user, ResourceKind::Order, Action::List, None)?;
    Ok(Json(state.repo.list_orders(policy::order_scope(&user)).await?))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = i64, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Found", body = Order),
        (status = 404, description = "Not visible to the caller")
    )
)]
pub async fn get_order(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    policy::require(&user, ResourceKind::Order, Action::Retrieve, None)?;
    state
        .repo
        .get_order(id, policy::order_scope(&user))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("order".to_string()))
}

/// place_order
///
/// Turns the caller's cart into an order. The store does the snapshot, total
/// and cart clearing in one transaction; an empty cart writes nothing.
#[utoipa::path(
    post,
    path = "/orders",
    responses(
        (status = 201, description = "Order placed", body = Order),
        (status = 400, description = "Cart is empty")
    )
)]
pub async fn place_order(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    policy::require(&user, ResourceKind::Order, Action::Create, None)?;

    let order = state
        .repo
        .place_order(user.id)
        .await?
        .ok_or_else(|| AppError::Validation(FieldErrors::single("cart", "cart is empty")))?;

    tracing::info!(
        order_id = order.id,
        user_id = %user.id,
        lines = order.items.len(),
        total = %order.total,
        "order placed"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

/// update_order
///
/// PUT and PATCH behave the same: only the supplied fields change.
#[utoipa::path(
    put,
    path = "/orders/{id}",
    params(("id" = i64, Path, description = "Order ID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Updated", body = Order),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Field outside the caller's grant"),
        (status = 404, description = "Not visible to the caller")
    )
)]
pub async fn update_order(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<UpdateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    apply(&user, &state, id, Action::Update, payload).await
}

#[utoipa::path(
    patch,
    path = "/orders/{id}",
    params(("id" = i64, Path, description = "Order ID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Updated", body = Order),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Field outside the caller's grant"),
        (status = 404, description = "Not visible to the caller")
    )
)]
pub async fn partial_update_order(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<UpdateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    apply(&user, &state, id, Action::PartialUpdate, payload).await
}

async fn apply(
    user: &AuthUser,
    state: &AppState,
    id: i64,
    action: Action,
    payload: UpdateOrderRequest,
) -> Result<Json<Order>, AppError> {
    policy::require(user, ResourceKind::Order, action, None)?;

    // Any field outside the grant rejects the whole request before a read or write.
    let grant = policy::order_field_grant(user);
    if payload.status.is_some() && !grant.status {
        return Err(AppError::Forbidden(
            "Only delivery crew can update order status.".to_string(),
        ));
    }
    if payload.delivery_crew.is_some() && !grant.delivery_crew {
        return Err(AppError::Forbidden(
            "Only managers can assign delivery crew.".to_string(),
        ));
    }
    if payload.is_empty() {
        return Err(AppError::Validation(FieldErrors::single(
            "non_field_errors",
            "no updatable fields supplied",
        )));
    }

    let scope = policy::order_scope(user);
    let current = state
        .repo
        .get_order(id, scope)
        .await?
        .ok_or_else(|| AppError::NotFound("order".to_string()))?;

    let target = Ownership {
        owner: current.user,
        assignee: current.delivery_crew,
    };
    policy::require(user, ResourceKind::Order, action, Some(&target))?;

    if let Some(Some(crew_id)) = payload.delivery_crew {
        let is_crew = state
            .repo
            .get_user(crew_id)
            .await?
            .is_some_and(|u| u.roles.contains(&Role::DeliveryCrew));
        if !is_crew {
            return Err(AppError::Validation(FieldErrors::single(
                "delivery_crew",
                "user is not a member of Delivery Crew",
            )));
        }
    }

    let order = state
        .repo
        .update_order(id, scope, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound("order".to_string()))?;

    tracing::info!(
        order_id = id,
        user_id = %user.id,
        status = order.status.as_str(),
        delivery_crew = ?order.delivery_crew,
        "order updated"
    );
    Ok(Json(order))
}

/// delete_order
///
/// Managers only. The order's lines go with it.
#[utoipa::path(
    delete,
    path = "/orders/{id}",
    params(("id" = i64, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not a manager"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_order(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    policy::require(&user, ResourceKind::Order, Action::Destroy, None)?;
    if state.repo.delete_order(id).await? {
        tracing::info!(order_id = id, user_id = %user.id, "order deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("order".to_string()))
    }
}
