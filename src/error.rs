use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Error taxonomy for the booking engine.
///
/// `Conflict` and `StaleReservation` are user-actionable ("select seats
/// again"); `Anomaly` is logged and resolved in the paying customer's favor,
/// never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("one or more requested seats are no longer available")]
    Conflict,

    #[error("seat reservation has expired, please select seats again")]
    StaleReservation,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not authorized to access this {0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("inconsistent state: {0}")]
    Anomaly(String),

    #[error("payment gateway unavailable: {0}")]
    Gateway(String),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Error::Conflict | Error::StaleReservation => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Gateway(_) => StatusCode::BAD_GATEWAY,
            Error::Anomaly(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {self:?}");
        }

        let body = Json(json!({ "success": false, "message": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: Error) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn user_actionable_errors_map_to_conflict() {
        assert_eq!(status_of(Error::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_of(Error::StaleReservation), StatusCode::CONFLICT);
    }

    #[test]
    fn lookup_and_access_errors_keep_their_codes() {
        assert_eq!(status_of(Error::NotFound("show")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::Forbidden("booking")), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(Error::BadRequest("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::Gateway("down".to_string())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn anomalies_are_internal_errors() {
        assert_eq!(
            status_of(Error::Anomaly("seat already booked".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
