use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    models::{ManagerMessage, Role, User},
    policy::{self, Action, ResourceKind},
};

/// assign_delivery_crew
///
/// Adds the user to the Delivery Crew group. Idempotent: 201 when the role is
/// newly granted, 200 when the user already had it.
#[utoipa::path(
    post,
    path = "/users/{id}/assign-to-delivery-crew",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 201, description = "Role granted", body = User),
        (status = 200, description = "User already in Delivery Crew", body = User),
        (status = 403, description = "Not a manager"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn assign_delivery_crew(
    user: AuthUser,
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
) -> Result<(StatusCode, Json<User>), AppError> {
    policy::require(&user, ResourceKind::UserRoleAssignment, Action::Create, None)?;

    if state.repo.get_user(target_id).await?.is_none() {
        return Err(AppError::NotFound("user".to_string()));
    }

    let granted = state.repo.add_role(target_id, Role::DeliveryCrew).await?;
    let updated = state
        .repo
        .get_user(target_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user".to_string()))?;

    if granted {
        tracing::info!(user_id = %target_id, by = %user.id, "assigned to delivery crew");
        Ok((StatusCode::CREATED, Json(updated)))
    } else {
        Ok((StatusCode::OK, Json(updated)))
    }
}

#[utoipa::path(
    get,
    path = "/manager-only",
    responses(
        (status = 200, description = "Manager greeting", body = ManagerMessage),
        (status = 403, description = "Not a manager")
    )
)]
pub async fn manager_only(user: AuthUser) -> Result<Json<ManagerMessage>, AppError> {
    policy::require(&user, ResourceKind::ManagerArea, Action::Retrieve, None)?;
    Ok(Json(ManagerMessage {
        message: "Only Manager should see this.".to_string(),
    }))
}
