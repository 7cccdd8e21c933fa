//! Bulk CSV import endpoint.

use crate::error::ApiError;
use crate::import::{FileImportSpec, ImportBatchResult, ImportCoordinator};
use crate::models::ApiResponse;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

/// A batch of base64 encoded CSV files.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportRequest {
    pub files: Vec<FileImportSpec>,
}

/// Import users and teams from CSV files.
///
/// Waits for every file to finish. Per-file and per-row problems are
/// reported in the result; only an empty batch is rejected outright.
#[openapi(tag = "Import")]
#[post("/import", data = "<request>")]
pub async fn import_files(
    request: Json<ImportRequest>,
    importer: &State<ImportCoordinator>,
) -> Result<Json<ApiResponse<ImportBatchResult>>, ApiError> {
    let batch = importer.import_batch(request.into_inner().files).await?;
    Ok(Json(ApiResponse::ok(batch)))
}
