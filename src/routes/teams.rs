use super::helpers::require_text;
use crate::error::ApiError;
use crate::models::{ApiResponse, MessageResponse, NewTeam, Team};
use crate::repository::TeamRepository;
use rocket::State;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: i32,
}

/// Create a team
#[openapi(tag = "Teams")]
#[post("/teams", data = "<request>")]
pub async fn create_team(
    request: Json<CreateTeamRequest>,
    teams: &State<TeamRepository>,
) -> Result<Created<Json<ApiResponse<Team>>>, ApiError> {
    let title = require_text("title", &request.title)?;
    let description = request.description.trim().to_string();

    let team = teams.create(NewTeam::now(title, description)).await?;
    log::info!("created team {}", team.id);

    let location = format!("/api/teams/{}", team.id);
    Ok(Created::new(location).body(Json(ApiResponse::ok(team))))
}

/// List all teams with their member ids
#[openapi(tag = "Teams")]
#[get("/teams")]
pub async fn list_teams(
    teams: &State<TeamRepository>,
) -> Result<Json<ApiResponse<Vec<Team>>>, ApiError> {
    Ok(Json(ApiResponse::ok(teams.list().await?)))
}

/// Get a team by id
#[openapi(tag = "Teams")]
#[get("/teams/<id>")]
pub async fn get_team(
    id: i32,
    teams: &State<TeamRepository>,
) -> Result<Json<ApiResponse<Team>>, ApiError> {
    Ok(Json(ApiResponse::ok(teams.get_by_id(id).await?)))
}

/// Update a team's title or description
#[openapi(tag = "Teams")]
#[put("/teams/<id>", data = "<request>")]
pub async fn update_team(
    id: i32,
    request: Json<UpdateTeamRequest>,
    teams: &State<TeamRepository>,
) -> Result<Json<ApiResponse<Team>>, ApiError> {
    let mut team = teams.get_by_id(id).await?;

    if let Some(title) = request.title.as_deref() {
        team.title = require_text("title", title)?;
    }
    if let Some(description) = request.description.as_deref() {
        team.description = description.trim().to_string();
    }

    Ok(Json(ApiResponse::ok(teams.update(&team).await?)))
}

/// Delete a team
#[openapi(tag = "Teams")]
#[delete("/teams/<id>")]
pub async fn delete_team(
    id: i32,
    teams: &State<TeamRepository>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    teams.delete(id).await?;
    log::info!("deleted team {}", id);

    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Team deleted successfully",
    ))))
}

/// Add a user to a team
#[openapi(tag = "Teams")]
#[post("/teams/<id>/users", data = "<request>")]
pub async fn add_team_member(
    id: i32,
    request: Json<AddMemberRequest>,
    teams: &State<TeamRepository>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    teams.add_member(id, request.user_id).await?;

    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "User added to team successfully",
    ))))
}
