use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::{Error, Result};
use crate::middleware::AdminUser;
use crate::models::SeatCategory;
use crate::store::{NewSeat, NewShow};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows", post(create_show))
        .route("/shows/{show_id}", get(get_show))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateShowRequest {
    movie_id: i64,
    #[validate(length(min = 1))]
    theatre: String,
    starts_at: DateTime<Utc>,
    #[validate(range(min = 0.01))]
    price: f64,
    /// Row labels, e.g. ["A", "B", "C"]. Row "A" seats are premium.
    #[validate(length(min = 1, max = 26))]
    rows: Vec<String>,
    #[validate(range(min = 1, max = 50))]
    seats_per_row: u32,
}

/// POST /api/shows (admin)
///
/// Creates a show together with its fixed seat layout in one call; seats
/// never appear or disappear afterwards except through retirement.
async fn create_show(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(req): Json<CreateShowRequest>,
) -> Result<impl IntoResponse> {
    req.validate()
        .map_err(|e| Error::BadRequest(e.to_string()))?;
    if req.starts_at <= Utc::now() {
        return Err(Error::BadRequest(
            "cannot create a show in the past".to_string(),
        ));
    }

    let total_seats = (req.rows.len() as u32 * req.seats_per_row) as i32;
    let show = state
        .stores
        .shows
        .insert(NewShow {
            movie_id: req.movie_id,
            theatre: req.theatre.clone(),
            starts_at: req.starts_at,
            price: req.price,
            total_seats,
        })
        .await?;

    let mut layout = Vec::with_capacity(total_seats as usize);
    for row in &req.rows {
        for number in 1..=req.seats_per_row {
            layout.push(NewSeat {
                seat_number: format!("{row}{number}"),
                row: row.clone(),
                category: if row == "A" {
                    SeatCategory::Premium
                } else {
                    SeatCategory::Normal
                },
            });
        }
    }
    let seats = state.stores.seats.insert_layout(show.id, layout).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "show": show,
            "seatsInitialized": seats.len(),
        })),
    ))
}

/// GET /api/shows/{show_id}
async fn get_show(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let show = state
        .stores
        .shows
        .find(show_id)
        .await?
        .ok_or(Error::NotFound("show"))?;
    Ok((StatusCode::OK, Json(show)))
}
