//! Postgres store adapters.
//!
//! The conditional multi-seat transition is a single `UPDATE ... WHERE`
//! statement with the required-state predicate in the WHERE clause, executed
//! inside a transaction with a row-count check. The database re-validates the
//! predicate at commit time, so a stale wall-clock check on the caller's side
//! can never over-claim a seat.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};

use crate::models::{Booking, BookingStatus, Seat, Show};
use crate::store::{
    BookingStore, NewBooking, NewSeat, NewShow, SeatPatch, SeatPredicate, SeatStore, ShowStore,
    StoreError, StoreResult,
};

const SEAT_COLUMNS: &str =
    r#"id, show_id, seat_number, "row", category, status, reserved_by, reserved_until"#;

const BOOKING_COLUMNS: &str = "id, buyer_id, show_id, movie_id, seat_ids, total_amount, \
                               session_ref, status, ticket_issued, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

enum Bind {
    I64(i64),
    Ids(Vec<i64>),
    Time(DateTime<Utc>),
}

#[derive(Default)]
struct SqlArgs {
    binds: Vec<Bind>,
}

impl SqlArgs {
    fn push(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    fn apply<'q>(
        &'q self,
        mut query: sqlx::query::QueryAs<'q, Postgres, Seat, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Seat, sqlx::postgres::PgArguments> {
        for bind in &self.binds {
            query = match bind {
                Bind::I64(v) => query.bind(*v),
                Bind::Ids(v) => query.bind(v.clone()),
                Bind::Time(v) => query.bind(*v),
            };
        }
        query
    }
}

/// Builds the conditional seat UPDATE shared by the strict and best-effort
/// transition paths. The predicate and patch SQL mirror
/// `SeatPredicate::matches` / `SeatPatch::apply` exactly.
fn seat_update_sql(
    show_id: Option<i64>,
    seat_ids: Option<&[i64]>,
    predicate: SeatPredicate,
    patch: SeatPatch,
    now: DateTime<Utc>,
) -> (String, SqlArgs) {
    let mut args = SqlArgs::default();
    let mut conditions = Vec::new();

    if let Some(show_id) = show_id {
        let p = args.push(Bind::I64(show_id));
        conditions.push(format!("show_id = {p}"));
    }
    if let Some(ids) = seat_ids {
        let p = args.push(Bind::Ids(ids.to_vec()));
        conditions.push(format!("id = ANY({p})"));
    }

    let pred_sql = match predicate {
        SeatPredicate::AvailableOrHeldBy(buyer) => {
            let n = args.push(Bind::Time(now));
            let b = args.push(Bind::I64(buyer));
            format!(
                "(status = 'available' OR (status = 'reserved' AND \
                 (reserved_until IS NULL OR reserved_until <= {n} OR reserved_by = {b})))"
            )
        }
        SeatPredicate::HeldBy(buyer) => {
            let b = args.push(Bind::I64(buyer));
            let n = args.push(Bind::Time(now));
            format!("(status = 'reserved' AND reserved_by = {b} AND reserved_until > {n})")
        }
        SeatPredicate::ReservedBy(buyer) => {
            let b = args.push(Bind::I64(buyer));
            format!("(status = 'reserved' AND reserved_by = {b})")
        }
        SeatPredicate::ReservedExpired => {
            let n = args.push(Bind::Time(now));
            format!(
                "(status = 'reserved' AND (reserved_until IS NULL OR reserved_until <= {n}))"
            )
        }
    };
    conditions.push(pred_sql);

    let set_sql = match patch {
        SeatPatch::Reserve { buyer_id, until } => {
            let b = args.push(Bind::I64(buyer_id));
            let u = args.push(Bind::Time(until));
            let n = args.push(Bind::Time(now));
            // A live re-hold by the same buyer keeps its original deadline.
            format!(
                "status = 'reserved', reserved_by = {b}, reserved_until = CASE \
                 WHEN status = 'reserved' AND reserved_by = {b} AND reserved_until > {n} \
                 THEN reserved_until ELSE {u} END"
            )
        }
        SeatPatch::Release => {
            "status = 'available', reserved_by = NULL, reserved_until = NULL".to_string()
        }
        SeatPatch::Book => {
            "status = 'booked', reserved_by = NULL, reserved_until = NULL".to_string()
        }
    };

    let sql = format!(
        "UPDATE seats SET {set_sql} WHERE {} RETURNING {SEAT_COLUMNS}",
        conditions.join(" AND ")
    );
    (sql, args)
}

fn dedup_ids(seat_ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    seat_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

#[async_trait]
impl SeatStore for PgStore {
    async fn insert_layout(&self, show_id: i64, layout: Vec<NewSeat>) -> StoreResult<Vec<Seat>> {
        let numbers: Vec<String> = layout.iter().map(|s| s.seat_number.clone()).collect();
        let rows: Vec<String> = layout.iter().map(|s| s.row.clone()).collect();
        let categories: Vec<String> = layout
            .iter()
            .map(|s| s.category.as_str().to_string())
            .collect();

        let sql = format!(
            r#"INSERT INTO seats (show_id, seat_number, "row", category, status)
               SELECT $1, n, r, c, 'available'
               FROM UNNEST($2::text[], $3::text[], $4::text[]) AS layout(n, r, c)
               RETURNING {SEAT_COLUMNS}"#
        );
        let seats = sqlx::query_as::<_, Seat>(&sql)
            .bind(show_id)
            .bind(numbers)
            .bind(rows)
            .bind(categories)
            .fetch_all(&self.pool)
            .await?;
        Ok(seats)
    }

    async fn seats_for_show(&self, show_id: i64) -> StoreResult<Vec<Seat>> {
        let sql = format!(
            r#"SELECT {SEAT_COLUMNS} FROM seats WHERE show_id = $1 ORDER BY "row", seat_number"#
        );
        Ok(sqlx::query_as::<_, Seat>(&sql)
            .bind(show_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn seats_by_ids(&self, show_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<Seat>> {
        let sql = format!("SELECT {SEAT_COLUMNS} FROM seats WHERE show_id = $1 AND id = ANY($2)");
        Ok(sqlx::query_as::<_, Seat>(&sql)
            .bind(show_id)
            .bind(dedup_ids(seat_ids))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn try_transition(
        &self,
        show_id: i64,
        seat_ids: &[i64],
        predicate: SeatPredicate,
        patch: SeatPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Seat>> {
        let ids = dedup_ids(seat_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (sql, args) = seat_update_sql(Some(show_id), Some(&ids), predicate, patch, now);
        let mut tx = self.pool.begin().await?;
        let updated = args
            .apply(sqlx::query_as::<_, Seat>(&sql))
            .fetch_all(&mut *tx)
            .await?;

        // Any seat missing from RETURNING failed the predicate (or does not
        // belong to the show): the whole operation is rolled back.
        if updated.len() != ids.len() {
            tx.rollback().await?;
            return Err(StoreError::Rejected);
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn transition_matching(
        &self,
        show_id: Option<i64>,
        seat_ids: Option<&[i64]>,
        predicate: SeatPredicate,
        patch: SeatPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Seat>> {
        let ids = seat_ids.map(dedup_ids);
        if matches!(&ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }
        let (sql, args) = seat_update_sql(show_id, ids.as_deref(), predicate, patch, now);
        Ok(args
            .apply(sqlx::query_as::<_, Seat>(&sql))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_for_show(&self, show_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM seats WHERE show_id = $1")
            .bind(show_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert(&self, booking: NewBooking) -> StoreResult<Booking> {
        let sql = format!(
            "INSERT INTO bookings \
             (buyer_id, show_id, movie_id, seat_ids, total_amount, session_ref, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending') RETURNING {BOOKING_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(booking.buyer_id)
            .bind(booking.show_id)
            .bind(booking.movie_id)
            .bind(booking.seat_ids)
            .bind(booking.total_amount)
            .bind(booking.session_ref)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_session_ref(&self, session_ref: &str) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE session_ref = $1");
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(session_ref)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_session_ref(&self, id: i64, session_ref: &str) -> StoreResult<()> {
        sqlx::query("UPDATE bookings SET session_ref = $2 WHERE id = $1")
            .bind(id)
            .bind(session_ref)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transition_status(
        &self,
        id: i64,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE bookings SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(from)
            .bind(to)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_ticket_issuance(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE bookings SET ticket_issued = TRUE WHERE id = $1 AND ticket_issued = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn pending_for_show(&self, show_id: i64) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE show_id = $1 AND status = 'pending'"
        );
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(show_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn for_buyer(&self, buyer_id: i64) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE buyer_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(buyer_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn show_has_confirmed(&self, show_id: i64) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE show_id = $1 AND status = 'confirmed')",
        )
        .bind(show_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete_for_show(&self, show_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM bookings WHERE show_id = $1")
            .bind(show_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ShowStore for PgStore {
    async fn insert(&self, show: NewShow) -> StoreResult<Show> {
        Ok(sqlx::query_as::<_, Show>(
            "INSERT INTO shows (movie_id, theatre, starts_at, price, total_seats) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, movie_id, theatre, starts_at, price, total_seats",
        )
        .bind(show.movie_id)
        .bind(show.theatre)
        .bind(show.starts_at)
        .bind(show.price)
        .bind(show.total_seats)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Show>> {
        Ok(sqlx::query_as::<_, Show>(
            "SELECT id, movie_id, theatre, starts_at, price, total_seats FROM shows WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn started_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Show>> {
        Ok(sqlx::query_as::<_, Show>(
            "SELECT id, movie_id, theatre, starts_at, price, total_seats \
             FROM shows WHERE starts_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM shows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
