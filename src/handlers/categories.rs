use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    extract::ValidJson,
    models::{Category, CategoryPatch, CategoryRequest},
    policy::{self, Action, ResourceKind},
};

/// list_categories
///
/// Any authenticated user.
#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, description = "All categories", body = [Category]))
)]
pub async fn list_categories(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    policy::require(&user, ResourceKind::Category, Action::List, None)?;
    Ok(Json(state.repo.list_categories().await?))
}

#[utoipa::path(
    get,
    path = "/categories/{id}",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Found", body = Category),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, AppError> {
    policy::require(&user, ResourceKind::Category, Action::Retrieve, None)?;
    state
        .repo
        .get_category(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("category".to_string()))
}

/// create_category
///
/// Managers only. A duplicate title comes back as a validation error on `title`.
#[utoipa::path(
    post,
    path = "/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Not a manager")
    )
)]
pub async fn create_category(
    user: AuthUser,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    policy::require(&user, ResourceKind::Category, Action::Create, None)?;
    payload.validate()?;

    let category = state
        .repo
        .create_category(&payload.title, &payload.resolved_slug())
        .await?;

    tracing::info!(category_id = category.id, user_id = %user.id, "category created");
    Ok((StatusCode::CREATED, Json(category)))
}

/// update_category
///
/// Full replacement (PUT). An omitted slug is re-derived from the new title.
#[utoipa::path(
    put,
    path = "/categories/{id}",
    params(("id" = i64, Path, description = "Category ID")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Updated", body = Category),
        (status = 403, description = "Not a manager"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<CategoryRequest>,
) -> Result<Json<Category>, AppError> {
    policy::require(&user, ResourceKind::Category, Action::Update, None)?;
    payload.validate()?;
    apply(&state, id, &CategoryPatch::from(payload)).await
}

#[utoipa::path(
    patch,
    path = "/categories/{id}",
    params(("id" = i64, Path, description = "Category ID")),
    request_body = CategoryPatch,
    responses(
        (status = 200, description = "Updated", body = Category),
        (status = 403, description = "Not a manager"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn partial_update_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<CategoryPatch>,
) -> Result<Json<Category>, AppError> {
    policy::require(&user, ResourceKind::Category, Action::PartialUpdate, None)?;
    payload.validate()?;
    apply(&state, id, &payload).await
}

async fn apply(state: &AppState, id: i64, patch: &CategoryPatch) -> Result<Json<Category>, AppError> {
    let category = state
        .repo
        .update_category(id, patch)
        .await?
        .ok_or_else(|| AppError::NotFound("category".to_string()))?;
    tracing::info!(category_id = id, "category updated");
    Ok(Json(category))
}

/// delete_category
///
/// Refused with 409 while menu items still belong to the category.
#[utoipa::path(
    delete,
    path = "/categories/{id}",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not a manager"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Still referenced by menu items")
    )
)]
pub async fn delete_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    policy::require(&user, ResourceKind::Category, Action::Destroy, None)?;
    if state.repo.delete_category(id).await? {
        tracing::info!(category_id = id, user_id = %user.id, "category deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("category".to_string()))
    }
}
