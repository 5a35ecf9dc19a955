use std::time::Instant;

use anyhow::{bail, ensure, Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use tripwise_core::config::{AppConfig, LoadOptions};
use tripwise_core::domain::category::{CategoryId, NewCategory};
use tripwise_core::domain::claim::{ClaimKind, ClaimStatus, Currency, NewClaim, NewReceipt};
use tripwise_core::domain::itinerary::{Itinerary, ItineraryKind, ItineraryLeg};
use tripwise_core::domain::trip::{NewTrip, TravelCategory, TripId, TripStatus};
use tripwise_core::domain::user::{NewUser, UserId};
use tripwise_core::errors::DomainError;
use tripwise_db::{connect_with_config, migrations, RepositoryError, TravelService};

use crate::commands::CommandResult;

const SMOKE_USER_EMAIL: &str = "smoke.check@tripwise.test";
const SMOKE_ADMIN_EMAIL: &str = "smoke.admin@tripwise.test";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(passed("config_validation", elapsed_ms, "configuration loaded and validated"));
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(failed("config_validation", elapsed_ms, error.to_string()));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("lifecycle_scenario"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(failed(
                "db_connectivity",
                0,
                format!("failed to initialize async runtime: {error}"),
            ));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("lifecycle_scenario"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let db_started = Instant::now();
    let pool = match runtime.block_on(connect_with_config(&config.database)) {
        Ok(pool) => {
            checks.push(passed(
                "db_connectivity",
                elapsed_since(db_started),
                format!("connected using `{}`", config.database.url),
            ));
            pool
        }
        Err(error) => {
            checks.push(failed(
                "db_connectivity",
                elapsed_since(db_started),
                format!("failed to connect: {error}"),
            ));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("lifecycle_scenario"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let migration_started = Instant::now();
    match runtime.block_on(migrations::run_pending(&pool)) {
        Ok(()) => checks.push(passed(
            "migration_visibility",
            elapsed_since(migration_started),
            "migrations are visible and executable",
        )),
        Err(error) => {
            checks.push(failed(
                "migration_visibility",
                elapsed_since(migration_started),
                format!("migration execution failed: {error}"),
            ));
            checks.push(skipped("lifecycle_scenario"));
            runtime.block_on(pool.close());
            return finalize_report(checks, elapsed_since(started));
        }
    }

    let scenario_started = Instant::now();
    let service = TravelService::new(pool.clone());
    let scenario = runtime.block_on(lifecycle_scenario(&service));
    runtime.block_on(pool.close());
    checks.push(match scenario {
        Ok(message) => passed("lifecycle_scenario", elapsed_since(scenario_started), message),
        Err(error) => {
            failed("lifecycle_scenario", elapsed_since(scenario_started), format!("{error:#}"))
        }
    });

    finalize_report(checks, elapsed_since(started))
}

/// Walks a trip from creation to finish and removes it again, so repeated
/// runs leave only the smoke users and category behind.
async fn lifecycle_scenario(service: &TravelService) -> Result<String> {
    let employee = match service.user_by_email(SMOKE_USER_EMAIL).await? {
        Some(user) => user,
        None => service.create_user(NewUser::employee("Smoke Check", SMOKE_USER_EMAIL)).await?,
    };
    let admin = match service.user_by_email(SMOKE_ADMIN_EMAIL).await? {
        Some(user) => user,
        None => service.create_user(NewUser::admin("Smoke Admin", SMOKE_ADMIN_EMAIL)).await?,
    };
    let category = match service.category_by_name("Travel").await? {
        Some(category) => category,
        None => service.create_category(NewCategory::named("Travel")).await?,
    };

    let mut itinerary = Itinerary::default();
    itinerary.push(ItineraryKind::Flight, ItineraryLeg::between("Chennai", "Mumbai"));
    itinerary.push(ItineraryKind::Cab, ItineraryLeg::between("Airport", "Client HQ"));
    let trip = service
        .create_trip(
            NewTrip::new("Client Visit", TravelCategory::Domestic, employee.id).with_itinerary(itinerary),
        )
        .await
        .context("creating trip")?;
    ensure!(trip.status == TripStatus::Pending, "new trip started as `{}`", trip.status);

    let outcome = claim_flow(service, trip.id, employee.id, admin.id, category.id).await;
    let cleanup = service.delete_trip(trip.id).await;
    outcome?;
    cleanup.context("removing smoke trip")?;

    Ok(format!("trip {} created, approved, claimed against, finished and removed", trip.id.0))
}

async fn claim_flow(
    service: &TravelService,
    trip_id: TripId,
    employee: UserId,
    admin: UserId,
    category: CategoryId,
) -> Result<()> {
    service.set_trip_status(trip_id, TripStatus::Approved).await.context("approving trip")?;

    let expense = service
        .create_claim(
            NewClaim::expense(employee, trip_id, Decimal::new(4_500, 0), Currency::Inr, category)
                .with_receipt(NewReceipt::new("receipt.txt", "text/plain", b"smoke".to_vec())),
        )
        .await
        .context("filing expense")?;

    let trip = service.finish_trip(trip_id).await.context("finishing trip")?;
    ensure!(trip.status == TripStatus::Finished, "finish left trip as `{}`", trip.status);

    match service
        .create_claim(NewClaim::advance(employee, trip_id, Decimal::new(1_000, 0), Currency::Inr))
        .await
    {
        Err(RepositoryError::Validation(DomainError::TripFinished { .. })) => {}
        Err(error) => bail!("late advance failed for the wrong reason: {error}"),
        Ok(claim) => bail!("finished trip accepted advance {}", claim.id.0),
    }

    let approved = service
        .approve_claim(ClaimKind::Expense, expense.id, admin)
        .await
        .context("approving expense after finish")?;
    ensure!(approved.status == ClaimStatus::Approved, "expense ended as `{}`", approved.status);
    Ok(())
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn elapsed_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn passed(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message: message.into() }
}

fn failed(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message: message.into() }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}

#[cfg(test)]
mod tests {
    use tripwise_core::domain::trip::TripFilter;
    use tripwise_db::{connect_with_settings, migrations, TravelService};

    use super::{failed, finalize_report, lifecycle_scenario, passed, skipped};

    #[tokio::test]
    async fn scenario_cleans_up_after_itself() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let service = TravelService::new(pool);

        lifecycle_scenario(&service).await.expect("first run");
        lifecycle_scenario(&service).await.expect("second run reuses users and category");

        assert!(service.trips(&TripFilter::default()).await.expect("trips").is_empty());
        assert_eq!(service.categories().await.expect("categories").len(), 1);
    }

    #[test]
    fn any_failed_check_fails_the_report() {
        let result = finalize_report(
            vec![
                passed("config_validation", 1, "ok"),
                failed("db_connectivity", 2, "refused"),
                skipped("migration_visibility"),
            ],
            3,
        );
        assert_eq!(result.exit_code, 6);

        let mut lines = result.output.lines();
        assert_eq!(lines.next(), Some("smoke: 1/3 checks passed in 3ms"));
        let report: serde_json::Value =
            serde_json::from_str(lines.next().expect("json line")).expect("valid json");
        assert_eq!(report["status"], "fail");
        assert_eq!(report["checks"][2]["status"], "skipped");
    }
}
