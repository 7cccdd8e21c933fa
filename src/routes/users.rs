use super::helpers::{require_email, require_text};
use crate::error::ApiError;
use crate::models::{ApiResponse, MessageResponse, NewUser, User, UserWithTeams};
use crate::repository::UserRepository;
use rocket::State;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}

/// Partial update. When `teamIds` is present the user's memberships are
/// replaced with exactly that set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub team_ids: Option<Vec<i32>>,
}

/// Create a user
#[openapi(tag = "Users")]
#[post("/users", data = "<request>")]
pub async fn create_user(
    request: Json<CreateUserRequest>,
    users: &State<UserRepository>,
) -> Result<Created<Json<ApiResponse<User>>>, ApiError> {
    let email = require_email(&request.email)?;
    let name = require_text("name", &request.name)?;

    let user = users.create(NewUser::now(email, name)).await?;
    log::info!("created user {}", user.id);

    let location = format!("/api/users/{}", user.id);
    Ok(Created::new(location).body(Json(ApiResponse::ok(user))))
}

/// List all users
#[openapi(tag = "Users")]
#[get("/users")]
pub async fn list_users(
    users: &State<UserRepository>,
) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    Ok(Json(ApiResponse::ok(users.list().await?)))
}

/// Get a user by id
#[openapi(tag = "Users")]
#[get("/users/<id>")]
pub async fn get_user(
    id: i32,
    users: &State<UserRepository>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    Ok(Json(ApiResponse::ok(users.get_by_id(id).await?)))
}

/// Get a user together with the teams it belongs to
#[openapi(tag = "Users")]
#[get("/users/<id>/teams")]
pub async fn get_user_teams(
    id: i32,
    users: &State<UserRepository>,
) -> Result<Json<ApiResponse<UserWithTeams>>, ApiError> {
    Ok(Json(ApiResponse::ok(users.get_with_teams(id).await?)))
}

/// Update a user, optionally replacing its team memberships
#[openapi(tag = "Users")]
#[put("/users/<id>", data = "<request>")]
pub async fn update_user(
    id: i32,
    request: Json<UpdateUserRequest>,
    users: &State<UserRepository>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let request = request.into_inner();
    let mut user = users.get_by_id(id).await?;

    if let Some(email) = request.email.as_deref() {
        user.email = require_email(email)?;
    }
    if let Some(name) = request.name.as_deref() {
        user.name = require_text("name", name)?;
    }

    let updated = match request.team_ids {
        Some(team_ids) => users.replace_memberships(&user, &team_ids).await?,
        None => users.update(&user).await?,
    };

    Ok(Json(ApiResponse::ok(updated)))
}

/// Delete a user
#[openapi(tag = "Users")]
#[delete("/users/<id>")]
pub async fn delete_user(
    id: i32,
    users: &State<UserRepository>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    users.delete(id).await?;
    log::info!("deleted user {}", id);

    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "User deleted successfully",
    ))))
}
