//! CRUD endpoints for user-defined categories.

use actix_web::{web, HttpResponse};
use validator::Validate;

use crate::api::auth::AuthedUser;
use crate::api::errors::ApiError;
use crate::api::models::CategoryPayload;
use crate::db;
use crate::services::AppState;

/// GET /api/v1/categories
pub async fn list_categories(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let categories = db::categories::list_for_user(&state.db, user.id).await?;
    Ok(HttpResponse::Ok().json(categories))
}

/// POST /api/v1/categories
pub async fn create_category(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    payload: web::Json<CategoryPayload>,
) -> Result<HttpResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let category =
        db::categories::create(&state.db, user.id, &payload.name, &payload.description).await?;
    Ok(HttpResponse::Created().json(category))
}

/// GET /api/v1/categories/{category_id}
pub async fn get_category(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let category = db::categories::find_for_user(&state.db, path.into_inner(), user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;
    Ok(HttpResponse::Ok().json(category))
}

/// PUT /api/v1/categories/{category_id}
pub async fn update_category(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
    payload: web::Json<CategoryPayload>,
) -> Result<HttpResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let category = db::categories::update_for_user(
        &state.db,
        path.into_inner(),
        user.id,
        &payload.name,
        &payload.description,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;
    Ok(HttpResponse::Ok().json(category))
}

/// DELETE /api/v1/categories/{category_id}
///
/// Emails filed under the category keep existing; their reference is
/// nullified by the store.
pub async fn delete_category(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let deleted = db::categories::delete_for_user(&state.db, path.into_inner(), user.id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Category not found".to_string()));
    }
    Ok(HttpResponse::NoContent().finish())
}
