use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tripwise_core::config::LoadOptions;
use tripwise_core::domain::category::{Category, NewCategory};
use tripwise_core::domain::claim::{
    AdvanceDetail, ClaimKind, Currency, NewClaim, NewClaimDetail, NewReceipt,
};
use tripwise_core::domain::itinerary::{Itinerary, ItineraryKind, ItineraryLeg};
use tripwise_core::domain::trip::{NewTrip, TravelCategory, Trip, TripStatus};
use tripwise_core::domain::user::{NewUser, User};
use tripwise_db::TravelService;

use crate::bootstrap::bootstrap;
use crate::commands::{runtime, CommandResult};

const CATEGORIES: [&str; 4] = ["Travel", "Accommodation", "Meals", "Local Conveyance"];

pub fn run() -> CommandResult {
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let app = bootstrap(LoadOptions::default()).await.map_err(|error| {
            let (error_class, exit_code) = error.classify();
            (error_class, error.to_string(), exit_code)
        })?;

        let seeded = seed_dataset(&app.service)
            .await
            .map_err(|error| ("seed_execution", format!("{error:#}"), 5u8));
        app.db_pool.close().await;
        seeded
    });

    match result {
        Ok(summary) => CommandResult::success("seed", summary.render()),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub categories: usize,
    pub trips: Vec<(String, TripStatus)>,
}

impl SeedSummary {
    /// Identical on every run against the same database.
    pub fn render(&self) -> String {
        let trips = self
            .trips
            .iter()
            .map(|(name, status)| format!("  - {name} ({status})"))
            .collect::<Vec<_>>();
        format!(
            "demo dataset ready: {} users, {} categories, {} trips\n{}",
            self.users,
            self.categories,
            self.trips.len(),
            trips.join("\n")
        )
    }
}

/// Find-or-create load of the demo dataset. Trips are matched by name on the
/// lead employee, so claims are only filed when the trip itself is new.
pub async fn seed_dataset(service: &TravelService) -> Result<SeedSummary> {
    let admin = ensure_user(service, NewUser::admin("Finance Admin", "finance.admin@tripwise.test"))
        .await?;
    let asha = ensure_user(service, NewUser::employee("Asha Rao", "asha.rao@tripwise.test")).await?;
    let vikram =
        ensure_user(service, NewUser::employee("Vikram Iyer", "vikram.iyer@tripwise.test")).await?;

    let mut categories = Vec::with_capacity(CATEGORIES.len());
    for name in CATEGORIES {
        categories.push(ensure_category(service, name).await?);
    }
    let [travel, accommodation, meals, conveyance] = [0, 1, 2, 3].map(|index| &categories[index]);

    let mut trips = Vec::new();

    let mut itinerary = Itinerary::default();
    itinerary.push(
        ItineraryKind::Flight,
        ItineraryLeg {
            return_date: Some(day(2026, 2, 12)?),
            ..ItineraryLeg::between("Chennai", "Mumbai").on(day(2026, 2, 10)?)
        },
    );
    itinerary.push(ItineraryKind::Cab, ItineraryLeg::between("Airport", "Client HQ").on(day(2026, 2, 10)?));
    let client_visit = NewTrip {
        status: Some(TripStatus::Approved),
        description: Some("Quarterly review with the Mumbai client".to_string()),
        ..NewTrip::new("Client Visit - Mumbai", TravelCategory::Domestic, asha.id)
            .with_users([asha.id, vikram.id])
            .with_itinerary(itinerary)
    };
    if let Some(trip) = ensure_trip(service, &asha, client_visit, &mut trips).await? {
        let flight = service
            .create_claim(
                expense(
                    NewClaim::expense(asha.id, trip.id, Decimal::new(12_450, 0), Currency::Inr, travel.id),
                    "Return flight",
                    day(2026, 2, 10)?,
                )
                .with_receipt(NewReceipt::new(
                    "flight-invoice.pdf",
                    "application/pdf",
                    b"%PDF-1.4 demo flight invoice".to_vec(),
                )),
            )
            .await
            .context("filing client visit flight expense")?;
        service
            .approve_claim(ClaimKind::Expense, flight.id, admin.id)
            .await
            .context("approving client visit flight expense")?;
        service
            .create_claim(expense(
                NewClaim::expense(asha.id, trip.id, Decimal::new(1_850, 0), Currency::Inr, meals.id),
                "Team dinner",
                day(2026, 2, 11)?,
            ))
            .await
            .context("filing client visit meal expense")?;
        service
            .create_claim(advance(
                NewClaim::advance(vikram.id, trip.id, Decimal::new(5_000, 0), Currency::Inr),
                "Bank Transfer",
                "NEFT-20260205-01",
            ))
            .await
            .context("filing client visit advance")?;
    }

    let mut itinerary = Itinerary::default();
    itinerary.push(ItineraryKind::Train, ItineraryLeg::between("Mumbai", "Pune").on(day(2026, 3, 4)?));
    let vendor_audit = NewTrip::new("Vendor Audit - Pune", TravelCategory::Domestic, vikram.id)
        .with_itinerary(itinerary);
    ensure_trip(service, &vikram, vendor_audit, &mut trips).await?;

    let offsite = NewTrip {
        status: Some(TripStatus::Rejected),
        description: Some("Team offsite outside the travel window".to_string()),
        ..NewTrip::new("Team Offsite - Goa", TravelCategory::Domestic, asha.id)
    };
    ensure_trip(service, &asha, offsite, &mut trips).await?;

    let mut itinerary = Itinerary::default();
    itinerary.push(
        ItineraryKind::Flight,
        ItineraryLeg {
            return_date: Some(day(2026, 1, 18)?),
            ..ItineraryLeg::between("Chennai", "Singapore").on(day(2026, 1, 14)?)
        },
    );
    itinerary.push(ItineraryKind::Bus, ItineraryLeg::between("Hotel", "Expo Centre").on(day(2026, 1, 15)?));
    let summit = NewTrip {
        status: Some(TripStatus::Approved),
        ..NewTrip::new("Tech Summit - Singapore", TravelCategory::International, vikram.id)
            .with_itinerary(itinerary)
    };
    if let Some(trip) = ensure_trip(service, &vikram, summit, &mut trips).await? {
        let hotel = service
            .create_claim(expense(
                NewClaim::expense(vikram.id, trip.id, Decimal::new(64_000, 2), Currency::Usd, accommodation.id),
                "Hotel, four nights",
                day(2026, 1, 18)?,
            ))
            .await
            .context("filing summit hotel expense")?;
        let taxi = service
            .create_claim(expense(
                NewClaim::expense(vikram.id, trip.id, Decimal::new(4_250, 2), Currency::Usd, conveyance.id),
                "Airport taxi",
                day(2026, 1, 14)?,
            ))
            .await
            .context("filing summit taxi expense")?;
        let cash = service
            .create_claim(advance(
                NewClaim::advance(vikram.id, trip.id, Decimal::new(300, 0), Currency::Usd),
                "Forex Card",
                "FX-20260110-07",
            ))
            .await
            .context("filing summit advance")?;

        service
            .approve_claims(ClaimKind::Expense, &[hotel.id, taxi.id], admin.id)
            .await
            .context("approving summit expenses")?;
        service
            .approve_claim(ClaimKind::Advance, cash.id, admin.id)
            .await
            .context("approving summit advance")?;
        let finished = service.finish_trip(trip.id).await.context("finishing summit trip")?;
        if let Some(entry) = trips.last_mut() {
            entry.1 = finished.status;
        }
    }

    Ok(SeedSummary { users: 3, categories: categories.len(), trips })
}

async fn ensure_user(service: &TravelService, user: NewUser) -> Result<User> {
    if let Some(existing) = service
        .user_by_email(&user.email)
        .await
        .with_context(|| format!("looking up user `{}`", user.email))?
    {
        return Ok(existing);
    }
    let email = user.email.clone();
    service.create_user(user).await.with_context(|| format!("creating user `{email}`"))
}

async fn ensure_category(service: &TravelService, name: &str) -> Result<Category> {
    if let Some(existing) = service
        .category_by_name(name)
        .await
        .with_context(|| format!("looking up category `{name}`"))?
    {
        return Ok(existing);
    }
    service
        .create_category(NewCategory::named(name))
        .await
        .with_context(|| format!("creating category `{name}`"))
}

/// Returns the trip only when it was created by this call.
async fn ensure_trip(
    service: &TravelService,
    owner: &User,
    trip: NewTrip,
    seen: &mut Vec<(String, TripStatus)>,
) -> Result<Option<Trip>> {
    let existing = service
        .trips_for_user(owner.id)
        .await
        .with_context(|| format!("listing trips for `{}`", owner.email))?
        .into_iter()
        .find(|candidate| candidate.name == trip.name);
    if let Some(existing) = existing {
        seen.push((existing.name, existing.status));
        return Ok(None);
    }

    let name = trip.name.clone();
    let created = service.create_trip(trip).await.with_context(|| format!("creating trip `{name}`"))?;
    seen.push((created.name.clone(), created.status));
    Ok(Some(created))
}

fn expense(mut claim: NewClaim, title: &str, expense_date: NaiveDate) -> NewClaim {
    if let NewClaimDetail::Expense(detail) = &mut claim.detail {
        detail.title = Some(title.to_string());
        detail.expense_date = Some(expense_date);
    }
    claim
}

fn advance(mut claim: NewClaim, paid_through: &str, reference_id: &str) -> NewClaim {
    claim.detail = NewClaimDetail::Advance(AdvanceDetail {
        paid_through: Some(paid_through.to_string()),
        reference_id: Some(reference_id.to_string()),
        notes: None,
    });
    claim
}

fn day(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .with_context(|| format!("invalid seed date {year}-{month:02}-{day:02}"))
}

#[cfg(test)]
mod tests {
    use tripwise_core::domain::claim::{ClaimFilter, ClaimKind, ClaimStatus};
    use tripwise_core::domain::trip::{TripFilter, TripStatus};
    use tripwise_db::{connect_with_settings, migrations, TravelService};

    use super::seed_dataset;

    async fn service() -> TravelService {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        TravelService::new(pool)
    }

    #[tokio::test]
    async fn seeding_twice_leaves_one_copy_of_everything() {
        let service = service().await;

        let first = seed_dataset(&service).await.expect("first seed");
        let second = seed_dataset(&service).await.expect("second seed");
        assert_eq!(first, second);
        assert_eq!(first.render(), second.render());

        assert_eq!(service.trips(&TripFilter::default()).await.expect("trips").len(), 4);
        assert_eq!(service.categories().await.expect("categories").len(), 4);
        let expenses =
            service.claims(ClaimKind::Expense, &ClaimFilter::default()).await.expect("expenses");
        assert_eq!(expenses.len(), 4);
        let advances =
            service.claims(ClaimKind::Advance, &ClaimFilter::default()).await.expect("advances");
        assert_eq!(advances.len(), 2);
    }

    #[tokio::test]
    async fn dataset_covers_every_trip_status() {
        let service = service().await;
        let summary = seed_dataset(&service).await.expect("seed");

        let mut statuses = summary.trips.iter().map(|(_, status)| *status).collect::<Vec<_>>();
        statuses.sort_by_key(|status| status.as_str());
        assert_eq!(
            statuses,
            vec![TripStatus::Approved, TripStatus::Finished, TripStatus::Pending, TripStatus::Rejected]
        );

        let pending = service
            .claims(
                ClaimKind::Expense,
                &ClaimFilter { status: Some(ClaimStatus::Pending), ..ClaimFilter::default() },
            )
            .await
            .expect("pending expenses");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount.to_string(), "1850");
    }
}
