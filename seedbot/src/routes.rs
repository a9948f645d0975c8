use crate::error::AppError;
use crate::status::{ServerStatus, StatusBoard};

use axum::{
    Json,
    extract::{Path, State},
};
use axum_macros::debug_handler;

#[debug_handler]
pub(crate) async fn statuses(State(board): State<StatusBoard>) -> Json<Vec<ServerStatus>> {
    Json(board.statuses())
}

#[debug_handler]
pub(crate) async fn server_status(
    State(board): State<StatusBoard>,
    Path(name): Path<String>,
) -> Result<Json<ServerStatus>, AppError> {
    board
        .get(&name)
        .map(Json)
        .ok_or(AppError::ServerNotFound(name))
}
