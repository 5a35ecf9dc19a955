use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use tripwise_core::approvals::ApprovalWorkflow;
use tripwise_core::domain::claim::{ClaimKind, ClaimTotals, Currency, TripClaimStatistics};
use tripwise_core::domain::itinerary::{Itinerary, ItineraryItemId, ItineraryKind, ItineraryLeg};
use tripwise_core::domain::trip::{
    NewTrip, TravelCategory, Trip, TripFilter, TripId, TripPatch, TripStatus,
};
use tripwise_core::domain::user::UserId;

use super::{
    begin, commit, date, parse_decimal, parse_optional_date, parse_timestamp, timestamp,
    RepositoryError, TripRepository,
};
use crate::DbPool;

pub struct SqlTripRepository {
    pool: DbPool,
}

impl SqlTripRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Storage layout of one itinerary kind. Cabs name their columns after
/// pick-up and drop-off; only flights carry a return date.
struct LegTable {
    table: &'static str,
    origin: &'static str,
    destination: &'static str,
    date: &'static str,
    return_date: Option<&'static str>,
}

fn leg_table(kind: ItineraryKind) -> LegTable {
    match kind {
        ItineraryKind::Flight => LegTable {
            table: "flights",
            origin: "depart_from",
            destination: "arrive_at",
            date: "departure_date",
            return_date: Some("return_date"),
        },
        ItineraryKind::Bus => LegTable {
            table: "buses",
            origin: "depart_from",
            destination: "arrive_at",
            date: "departure_date",
            return_date: None,
        },
        ItineraryKind::Train => LegTable {
            table: "trains",
            origin: "depart_from",
            destination: "arrive_at",
            date: "departure_date",
            return_date: None,
        },
        ItineraryKind::Cab => LegTable {
            table: "cabs",
            origin: "pick_up_location",
            destination: "drop_off_location",
            date: "pick_up_date",
            return_date: None,
        },
    }
}

#[async_trait::async_trait]
impl TripRepository for SqlTripRepository {
    async fn create(&self, trip: NewTrip) -> Result<Trip, RepositoryError> {
        let trip = trip.validate()?;
        let now = timestamp(Utc::now());

        let mut tx = begin(&self.pool).await?;
        let id = sqlx::query(
            "INSERT INTO trips (name, travel_category, status, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&trip.name)
        .bind(trip.travel_category.as_str())
        .bind(trip.status.as_str())
        .bind(&trip.description)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        let id = TripId(id);

        insert_users(&mut tx, id, &trip.user_ids).await?;
        insert_itinerary(&mut tx, id, &trip.itinerary).await?;

        let created = load_trip(&mut tx, id).await?.ok_or(RepositoryError::not_found("trip", id.0))?;
        commit(tx).await?;

        Ok(created)
    }

    async fn update(&self, id: TripId, patch: TripPatch) -> Result<Trip, RepositoryError> {
        let patch = patch.validate()?;

        let mut tx = begin(&self.pool).await?;
        if !trip_exists(&mut tx, id).await? {
            return Err(RepositoryError::not_found("trip", id.0));
        }

        sqlx::query(
            "UPDATE trips
             SET name = COALESCE(?, name),
                 travel_category = COALESCE(?, travel_category),
                 description = CASE WHEN ? THEN NULLIF(?, '') ELSE description END,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&patch.name)
        .bind(patch.travel_category.map(|category| category.as_str()))
        .bind(patch.description.is_some())
        .bind(&patch.description)
        .bind(timestamp(Utc::now()))
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        if let Some(user_ids) = &patch.user_ids {
            sqlx::query("DELETE FROM trip_users WHERE trip_id = ?")
                .bind(id.0)
                .execute(&mut *tx)
                .await?;
            insert_users(&mut tx, id, user_ids).await?;
        }

        if let Some(itinerary) = &patch.itinerary {
            for kind in ItineraryKind::ALL {
                let layout = leg_table(kind);
                sqlx::query(&format!("DELETE FROM {} WHERE trip_id = ?", layout.table))
                    .bind(id.0)
                    .execute(&mut *tx)
                    .await?;
            }
            insert_itinerary(&mut tx, id, itinerary).await?;
        }

        let updated = load_trip(&mut tx, id).await?.ok_or(RepositoryError::not_found("trip", id.0))?;
        commit(tx).await?;

        Ok(updated)
    }

    async fn find_by_id(&self, id: TripId) -> Result<Option<Trip>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_trip(&mut conn, id).await
    }

    async fn find_all(&self, filter: &TripFilter) -> Result<Vec<Trip>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT id FROM trips WHERE 1 = 1");
        if let Some(user_id) = filter.user_id {
            query
                .push(" AND EXISTS (SELECT 1 FROM trip_users WHERE trip_id = trips.id AND user_id = ")
                .push_bind(user_id.0)
                .push(")");
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(category) = filter.travel_category {
            query.push(" AND travel_category = ").push_bind(category.as_str());
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let mut conn = self.pool.acquire().await?;
        let ids = query
            .build()
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<Result<Vec<_>, _>>()?;

        let mut trips = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(trip) = load_trip(&mut conn, TripId(id)).await? {
                trips.push(trip);
            }
        }
        Ok(trips)
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Trip>, RepositoryError> {
        self.find_all(&TripFilter { user_id: Some(user_id), ..TripFilter::default() }).await
    }

    async fn delete(&self, id: TripId) -> Result<Trip, RepositoryError> {
        let mut tx = begin(&self.pool).await?;
        let trip = load_trip(&mut tx, id).await?.ok_or(RepositoryError::not_found("trip", id.0))?;
        ApprovalWorkflow::check_trip_deletion(trip.status)?;

        sqlx::query("DELETE FROM trips WHERE id = ?").bind(id.0).execute(&mut *tx).await?;
        commit(tx).await?;

        Ok(trip)
    }

    async fn update_status(&self, id: TripId, status: TripStatus) -> Result<Trip, RepositoryError> {
        let mut tx = begin(&self.pool).await?;
        let trip = write_status(&mut tx, id, status).await?;
        commit(tx).await?;
        Ok(trip)
    }

    async fn transition(&self, id: TripId, to: TripStatus) -> Result<Trip, RepositoryError> {
        let mut tx = begin(&self.pool).await?;
        let from = current_status(&mut tx, id).await?;
        ApprovalWorkflow::check_trip_transition(from, to)?;

        let trip = write_status(&mut tx, id, to).await?;
        commit(tx).await?;
        Ok(trip)
    }

    async fn claim_statistics(&self, id: TripId) -> Result<TripClaimStatistics, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        if !trip_exists(&mut conn, id).await? {
            return Err(RepositoryError::not_found("trip", id.0));
        }

        // Amounts are decimal text; summing happens here to keep them exact.
        let mut totals: BTreeMap<(usize, &'static str), ClaimTotals> = BTreeMap::new();
        for (position, kind) in ClaimKind::ALL.into_iter().enumerate() {
            let table = match kind {
                ClaimKind::Expense => "expenses",
                ClaimKind::Advance => "advances",
            };
            let rows = sqlx::query(&format!(
                "SELECT amount, currency FROM {table} WHERE trip_id = ? ORDER BY id"
            ))
            .bind(id.0)
            .fetch_all(&mut *conn)
            .await?;

            for row in rows {
                let amount = parse_decimal("amount", row.try_get("amount")?)?;
                let raw_currency: String = row.try_get("currency")?;
                let currency = Currency::parse(&raw_currency).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown currency `{raw_currency}`"))
                })?;
                let entry = totals.entry((position, currency.as_str())).or_insert(ClaimTotals {
                    kind,
                    currency,
                    count: 0,
                    total: Decimal::ZERO,
                });
                entry.count += 1;
                entry.total += amount;
            }
        }

        Ok(TripClaimStatistics { trip_id: id, totals: totals.into_values().collect() })
    }
}

async fn trip_exists(conn: &mut SqliteConnection, id: TripId) -> Result<bool, RepositoryError> {
    let row = sqlx::query("SELECT 1 FROM trips WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub(crate) async fn current_status(
    conn: &mut SqliteConnection,
    id: TripId,
) -> Result<TripStatus, RepositoryError> {
    let row = sqlx::query("SELECT status FROM trips WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::not_found("trip", id.0))?;
    let raw: String = row.try_get("status")?;
    TripStatus::parse(&raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown trip status `{raw}`")))
}

async fn write_status(
    conn: &mut SqliteConnection,
    id: TripId,
    status: TripStatus,
) -> Result<Trip, RepositoryError> {
    let result = sqlx::query("UPDATE trips SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(timestamp(Utc::now()))
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::not_found("trip", id.0));
    }

    load_trip(conn, id).await?.ok_or(RepositoryError::not_found("trip", id.0))
}

async fn insert_users(
    conn: &mut SqliteConnection,
    id: TripId,
    user_ids: &[UserId],
) -> Result<(), RepositoryError> {
    for user_id in user_ids {
        sqlx::query("INSERT INTO trip_users (trip_id, user_id) VALUES (?, ?)")
            .bind(id.0)
            .bind(user_id.0)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn insert_itinerary(
    conn: &mut SqliteConnection,
    id: TripId,
    itinerary: &Itinerary,
) -> Result<(), RepositoryError> {
    for kind in ItineraryKind::ALL {
        let layout = leg_table(kind);
        let sql = match layout.return_date {
            Some(return_date) => format!(
                "INSERT INTO {} (trip_id, {}, {}, {}, description, {return_date})
                 VALUES (?, ?, ?, ?, ?, ?)",
                layout.table, layout.origin, layout.destination, layout.date
            ),
            None => format!(
                "INSERT INTO {} (trip_id, {}, {}, {}, description) VALUES (?, ?, ?, ?, ?)",
                layout.table, layout.origin, layout.destination, layout.date
            ),
        };

        for leg in itinerary.legs(kind) {
            let mut insert = sqlx::query(&sql)
                .bind(id.0)
                .bind(&leg.origin)
                .bind(&leg.destination)
                .bind(leg.departure_date.map(date))
                .bind(&leg.description);
            if layout.return_date.is_some() {
                insert = insert.bind(leg.return_date.map(date));
            }
            insert.execute(&mut *conn).await?;
        }
    }
    Ok(())
}

/// Reads the trip with its sorted user ids and every itinerary kind ordered by id.
pub(crate) async fn load_trip(
    conn: &mut SqliteConnection,
    id: TripId,
) -> Result<Option<Trip>, RepositoryError> {
    let Some(row) = sqlx::query(
        "SELECT id, name, travel_category, status, description, created_at, updated_at
         FROM trips
         WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let user_ids = sqlx::query("SELECT user_id FROM trip_users WHERE trip_id = ? ORDER BY user_id")
        .bind(id.0)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| row.try_get::<i64, _>("user_id").map(UserId))
        .collect::<Result<Vec<_>, _>>()?;

    let mut itinerary = Itinerary::default();
    for kind in ItineraryKind::ALL {
        let layout = leg_table(kind);
        let sql = format!(
            "SELECT id, {} AS origin, {} AS destination, {} AS departure_date, {} AS return_date,
                    description
             FROM {}
             WHERE trip_id = ?
             ORDER BY id",
            layout.origin,
            layout.destination,
            layout.date,
            layout.return_date.unwrap_or("NULL"),
            layout.table
        );
        let rows = sqlx::query(&sql).bind(id.0).fetch_all(&mut *conn).await?;
        for row in rows {
            itinerary.push(kind, leg_from_row(&row)?);
        }
    }

    trip_from_row(&row, user_ids, itinerary).map(Some)
}

fn trip_from_row(
    row: &SqliteRow,
    user_ids: Vec<UserId>,
    itinerary: Itinerary,
) -> Result<Trip, RepositoryError> {
    let category_raw: String = row.try_get("travel_category")?;
    let travel_category = TravelCategory::parse(&category_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown travel category `{category_raw}`")))?;
    let status_raw: String = row.try_get("status")?;
    let status = TripStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown trip status `{status_raw}`")))?;

    Ok(Trip {
        id: TripId(row.try_get("id")?),
        name: row.try_get("name")?,
        travel_category,
        status,
        description: row.try_get("description")?,
        user_ids,
        itinerary,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn leg_from_row(row: &SqliteRow) -> Result<ItineraryLeg, RepositoryError> {
    Ok(ItineraryLeg {
        id: Some(ItineraryItemId(row.try_get("id")?)),
        origin: row.try_get("origin")?,
        destination: row.try_get("destination")?,
        departure_date: parse_optional_date("departure_date", row.try_get("departure_date")?)?,
        return_date: parse_optional_date("return_date", row.try_get("return_date")?)?,
        description: row.try_get("description")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use tripwise_core::domain::claim::{ClaimKind, Currency};
    use tripwise_core::domain::itinerary::{Itinerary, ItineraryKind, ItineraryLeg};
    use tripwise_core::domain::trip::{
        NewTrip, TravelCategory, TripFilter, TripId, TripPatch, TripStatus,
    };
    use tripwise_core::domain::user::UserId;
    use tripwise_core::errors::DomainError;

    use super::SqlTripRepository;
    use crate::repositories::test_support::{insert_category, insert_user, setup};
    use crate::repositories::{RepositoryError, TripRepository};
    use crate::DbPool;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).expect("valid date")
    }

    fn itinerary(flights: usize, buses: usize, trains: usize, cabs: usize) -> Itinerary {
        let mut itinerary = Itinerary::default();
        for (kind, count) in ItineraryKind::ALL.into_iter().zip([flights, buses, trains, cabs]) {
            for index in 0..count {
                itinerary.push(
                    kind,
                    ItineraryLeg::between(format!("{kind}-from-{index}"), format!("{kind}-to-{index}"))
                        .on(day(10)),
                );
            }
        }
        itinerary
    }

    async fn repo_with_user() -> (DbPool, SqlTripRepository, UserId) {
        let pool = setup().await;
        let user = UserId(insert_user(&pool, "Asha Rao").await);
        (pool.clone(), SqlTripRepository::new(pool), user)
    }

    async fn count(pool: &DbPool, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.expect("count")
    }

    #[tokio::test]
    async fn create_hydrates_users_and_itinerary() {
        let (pool, repo, user) = repo_with_user().await;
        let colleague = UserId(insert_user(&pool, "Vikram Shah").await);

        let mut legs = itinerary(1, 0, 1, 2);
        legs.flights[0].return_date = Some(day(12));

        let trip = repo
            .create(
                NewTrip::new("Client Visit", TravelCategory::Domestic, user)
                    .with_users([colleague, user, colleague])
                    .with_itinerary(legs),
            )
            .await
            .expect("create trip");

        assert_eq!(trip.status, TripStatus::Pending);
        assert_eq!(trip.user_ids, vec![user, colleague]);
        assert_eq!(trip.itinerary.counts(), [1, 0, 1, 2]);
        assert_eq!(trip.itinerary.flights[0].return_date, Some(day(12)));
        assert_eq!(trip.itinerary.cabs[0].origin.as_deref(), Some("cab-from-0"));
        assert!(trip.itinerary.cabs[0].id.is_some());
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM trip_users").await, 2);
    }

    #[tokio::test]
    async fn create_honours_explicit_status() {
        let (_pool, repo, user) = repo_with_user().await;
        let trip = repo
            .create(NewTrip {
                status: Some(TripStatus::Approved),
                ..NewTrip::new("Offsite", TravelCategory::Local, user)
            })
            .await
            .expect("create trip");
        assert_eq!(trip.status, TripStatus::Approved);
    }

    #[tokio::test]
    async fn create_with_unknown_user_leaves_no_trip_behind() {
        let (pool, repo, user) = repo_with_user().await;
        let error = repo
            .create(
                NewTrip::new("Ghost", TravelCategory::Local, user)
                    .with_users([user, UserId(9_999)])
                    .with_itinerary(itinerary(1, 1, 0, 0)),
            )
            .await
            .expect_err("unknown user");

        assert!(matches!(error, RepositoryError::ConstraintViolation(_)));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM trips").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM flights").await, 0);
    }

    #[tokio::test]
    async fn update_replaces_each_itinerary_kind() {
        let (_pool, repo, user) = repo_with_user().await;
        let trip = repo
            .create(
                NewTrip::new("Roadshow", TravelCategory::International, user)
                    .with_itinerary(itinerary(2, 3, 1, 4)),
            )
            .await
            .expect("create trip");

        let updated = repo
            .update(
                trip.id,
                TripPatch { itinerary: Some(itinerary(1, 0, 2, 1)), ..TripPatch::default() },
            )
            .await
            .expect("update trip");
        assert_eq!(updated.itinerary.counts(), [1, 0, 2, 1]);

        let reread = repo.find_by_id(trip.id).await.expect("find").expect("trip exists");
        assert_eq!(reread.itinerary.counts(), [1, 0, 2, 1]);
        assert_eq!(reread.name, "Roadshow");
    }

    #[tokio::test]
    async fn update_patches_scalars_and_replaces_users() {
        let (pool, repo, user) = repo_with_user().await;
        let other = UserId(insert_user(&pool, "Meera Iyer").await);
        let trip = repo
            .create(NewTrip {
                description: Some("Quarterly review".to_string()),
                ..NewTrip::new("Review", TravelCategory::Local, user)
            })
            .await
            .expect("create trip");

        let updated = repo
            .update(
                trip.id,
                TripPatch {
                    name: Some("  Annual Review ".to_string()),
                    description: Some(String::new()),
                    user_ids: Some(vec![other]),
                    ..TripPatch::default()
                },
            )
            .await
            .expect("update trip");

        assert_eq!(updated.name, "Annual Review");
        assert_eq!(updated.description, None);
        assert_eq!(updated.travel_category, TravelCategory::Local);
        assert_eq!(updated.user_ids, vec![other]);
        assert!(updated.updated_at >= trip.updated_at);
    }

    #[tokio::test]
    async fn update_rejects_blank_name_and_missing_trip() {
        let (_pool, repo, user) = repo_with_user().await;
        let trip = repo
            .create(NewTrip::new("Review", TravelCategory::Local, user))
            .await
            .expect("create trip");

        let error = repo
            .update(trip.id, TripPatch { name: Some("  ".to_string()), ..TripPatch::default() })
            .await
            .expect_err("blank name");
        assert!(matches!(
            error,
            RepositoryError::Validation(DomainError::MissingField { field: "name" })
        ));

        let error = repo.update(TripId(404), TripPatch::default()).await.expect_err("missing");
        assert!(matches!(error, RepositoryError::NotFound { entity: "trip", id: 404 }));
    }

    #[tokio::test]
    async fn delete_is_blocked_only_for_approved_trips() {
        let (pool, repo, user) = repo_with_user().await;

        for status in [TripStatus::Pending, TripStatus::Rejected, TripStatus::Finished] {
            let trip = repo
                .create(NewTrip {
                    status: Some(status),
                    ..NewTrip::new("Disposable", TravelCategory::Local, user)
                })
                .await
                .expect("create trip");
            let deleted = repo.delete(trip.id).await.expect("delete trip");
            assert_eq!(deleted.status, status);
        }

        let approved = repo
            .create(NewTrip {
                status: Some(TripStatus::Approved),
                ..NewTrip::new("Keeper", TravelCategory::Local, user)
            })
            .await
            .expect("create trip");
        let error = repo.delete(approved.id).await.expect_err("approved trips stay");
        assert!(matches!(error, RepositoryError::Validation(DomainError::ApprovedTripDeletion)));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM trips").await, 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_itinerary_and_claims() {
        let (pool, repo, user) = repo_with_user().await;
        let category = insert_category(&pool, "Travel").await;
        let trip = repo
            .create(NewTrip {
                status: Some(TripStatus::Finished),
                ..NewTrip::new("Done", TravelCategory::Local, user).with_itinerary(itinerary(1, 1, 1, 1))
            })
            .await
            .expect("create trip");
        sqlx::query(
            "INSERT INTO expenses (user_id, trip_id, category_id, amount, currency, expense_date,
                                   created_at, updated_at)
             VALUES (?, ?, ?, '120.00', 'INR', '2026-02-10', '2026-02-10T00:00:00.000000Z',
                     '2026-02-10T00:00:00.000000Z')",
        )
        .bind(user.0)
        .bind(trip.id.0)
        .bind(category)
        .execute(&pool)
        .await
        .expect("insert expense");

        repo.delete(trip.id).await.expect("delete trip");

        for table in ["trip_users", "flights", "buses", "trains", "cabs", "expenses"] {
            assert_eq!(count(&pool, &format!("SELECT COUNT(*) FROM {table}")).await, 0, "{table}");
        }
    }

    #[tokio::test]
    async fn transition_follows_table_and_update_status_does_not() {
        let (_pool, repo, user) = repo_with_user().await;
        let trip = repo
            .create(NewTrip::new("Summit", TravelCategory::Domestic, user))
            .await
            .expect("create trip");

        let error = repo.transition(trip.id, TripStatus::Finished).await.expect_err("pending");
        assert!(matches!(
            error,
            RepositoryError::Validation(DomainError::TripNotFinishable { from: TripStatus::Pending })
        ));
        let unchanged = repo.find_by_id(trip.id).await.expect("find").expect("exists");
        assert_eq!(unchanged.status, TripStatus::Pending);

        let approved = repo.transition(trip.id, TripStatus::Approved).await.expect("approve");
        assert_eq!(approved.status, TripStatus::Approved);
        let finished = repo.transition(trip.id, TripStatus::Finished).await.expect("finish");
        assert_eq!(finished.status, TripStatus::Finished);

        let reopened = repo.update_status(trip.id, TripStatus::Pending).await.expect("raw write");
        assert_eq!(reopened.status, TripStatus::Pending);

        let error = repo.update_status(TripId(404), TripStatus::Approved).await.expect_err("gone");
        assert!(matches!(error, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn find_all_filters_and_orders_newest_first() {
        let (pool, repo, user) = repo_with_user().await;
        let other = UserId(insert_user(&pool, "Meera Iyer").await);

        let first = repo
            .create(NewTrip::new("First", TravelCategory::Local, user))
            .await
            .expect("create");
        let second = repo
            .create(NewTrip::new("Second", TravelCategory::International, other))
            .await
            .expect("create");
        let third = repo
            .create(NewTrip {
                status: Some(TripStatus::Approved),
                ..NewTrip::new("Third", TravelCategory::Local, user).with_users([user, other])
            })
            .await
            .expect("create");

        let all = repo.find_all(&TripFilter::default()).await.expect("find all");
        let ids: Vec<TripId> = all.iter().map(|trip| trip.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let mine = repo.find_by_user(user).await.expect("by user");
        assert_eq!(mine.iter().map(|trip| trip.id).collect::<Vec<_>>(), vec![third.id, first.id]);

        let approved_local = repo
            .find_all(&TripFilter {
                status: Some(TripStatus::Approved),
                travel_category: Some(TravelCategory::Local),
                ..TripFilter::default()
            })
            .await
            .expect("filtered");
        assert_eq!(approved_local.len(), 1);
        assert_eq!(approved_local[0].user_ids, vec![user, other]);
    }

    #[tokio::test]
    async fn claim_statistics_group_by_kind_and_currency() {
        let (pool, repo, user) = repo_with_user().await;
        let category = insert_category(&pool, "Meals").await;
        let trip = repo
            .create(NewTrip {
                status: Some(TripStatus::Approved),
                ..NewTrip::new("Stats", TravelCategory::Domestic, user)
            })
            .await
            .expect("create trip");

        for (amount, currency) in [("100.50", "INR"), ("49.50", "INR"), ("20.00", "USD")] {
            sqlx::query(
                "INSERT INTO expenses (user_id, trip_id, category_id, amount, currency, expense_date,
                                       created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, '2026-02-10', '2026-02-10T00:00:00.000000Z',
                         '2026-02-10T00:00:00.000000Z')",
            )
            .bind(user.0)
            .bind(trip.id.0)
            .bind(category)
            .bind(amount)
            .bind(currency)
            .execute(&pool)
            .await
            .expect("insert expense");
        }
        sqlx::query(
            "INSERT INTO advances (user_id, trip_id, amount, currency, created_at, updated_at)
             VALUES (?, ?, '5000', 'INR', '2026-02-10T00:00:00.000000Z',
                     '2026-02-10T00:00:00.000000Z')",
        )
        .bind(user.0)
        .bind(trip.id.0)
        .execute(&pool)
        .await
        .expect("insert advance");

        let stats = repo.claim_statistics(trip.id).await.expect("statistics");
        assert_eq!(stats.count(ClaimKind::Expense), 3);
        assert_eq!(stats.count(ClaimKind::Advance), 1);
        assert_eq!(stats.total(ClaimKind::Expense, Currency::Inr), Decimal::new(15000, 2));
        assert_eq!(stats.total(ClaimKind::Expense, Currency::Usd), Decimal::new(2000, 2));
        assert_eq!(stats.total(ClaimKind::Advance, Currency::Usd), Decimal::ZERO);

        let error = repo.claim_statistics(TripId(404)).await.expect_err("missing trip");
        assert!(matches!(error, RepositoryError::NotFound { .. }));
    }
}
