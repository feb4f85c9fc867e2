//! Repository round-trips against a real Postgres.
//!
//! Requires `DATABASE_URL`; run with `cargo test -- --ignored`.

use sqlx::PgPool;
use time::macros::{date, datetime};

use eventscout::application::repos::{
    ClaimOutcome, EventQueryFilter, EventsRepo, ExecutionsRepo, PageWindow,
};
use eventscout::domain::signature::ScrapeQuery;
use eventscout::domain::types::ExecutionStatus;
use eventscout::infra::db::PostgresRepositories;

fn query() -> ScrapeQuery {
    ScrapeQuery {
        cities: vec!["Milano".to_string(), "Monza".to_string()],
        radius_km: Some(15.0),
        center_lat: Some(45.4642),
        center_lng: Some(9.19),
        date_from: Some(date!(2026 - 01 - 09)),
        date_to: Some(date!(2026 - 12 - 31)),
    }
}

async fn seed_events(pool: &PgPool) {
    sqlx::query(
        "INSERT INTO events \
         (title, description, category, date_start, location_name, latitude, longitude) VALUES \
         ('Jazz night', 'Live 100% acoustic', 'music', '2026-03-01T20:00:00Z', \
          'Milano Blue Note', 45.4842, 9.1867), \
         ('Autodromo open day', NULL, 'sport', '2026-03-02T09:00:00Z', 'Monza', 45.6156, 9.2811), \
         ('Old fair', NULL, 'music', '2025-12-01T10:00:00Z', 'Milano', NULL, NULL), \
         ('Lake walk', 'Guided tour', NULL, '2026-03-05T08:00:00Z', 'Como', 45.8081, 9.0852)",
    )
    .execute(pool)
    .await
    .expect("seed events");
}

fn filter() -> EventQueryFilter {
    EventQueryFilter {
        search: None,
        category: None,
        starts_from: datetime!(2026-01-01 0:00 UTC),
        starts_until: None,
        locations: Vec::new(),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn claim_is_exclusive_while_in_flight(pool: PgPool) {
    let repos = PostgresRepositories::new(pool.clone());
    let query = query();
    let signature = query.signature();

    let first = repos
        .claim_pending(&signature, &query)
        .await
        .expect("first claim");
    let ClaimOutcome::Claimed(record) = first else {
        panic!("first claim should win");
    };
    assert_eq!(record.status, ExecutionStatus::Pending);
    assert_eq!(record.location.as_deref(), Some("Milano, Monza"));

    let second = repos
        .claim_pending(&signature, &query)
        .await
        .expect("second claim");
    assert_eq!(second, ClaimOutcome::Contended);

    sqlx::query(
        "UPDATE workflow_executions SET status = 'failed', error_message = 'boom' WHERE id = $1",
    )
    .bind(record.id)
    .execute(&pool)
    .await
    .expect("mark failed");

    let third = repos
        .claim_pending(&signature, &query)
        .await
        .expect("third claim");
    let ClaimOutcome::Claimed(rearmed) = third else {
        panic!("settled record should be claimable");
    };
    assert_eq!(rearmed.id, record.id);
    assert_eq!(rearmed.error_message, None);

    let forced = repos
        .upsert_pending(&signature, &query)
        .await
        .expect("unconditional upsert");
    assert_eq!(forced.id, record.id);

    let found = repos
        .find_by_hash(&signature)
        .await
        .expect("lookup")
        .expect("record present");
    assert_eq!(found.cities, query.cities);
    assert_eq!(found.date_to, Some(date!(2026 - 12 - 31)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn event_filters_are_applied_store_side(pool: PgPool) {
    seed_events(&pool).await;
    let repos = PostgresRepositories::new(pool);

    let all = repos.list_events(&filter(), None).await.expect("list");
    assert_eq!(
        all.iter().map(|event| event.title.as_str()).collect::<Vec<_>>(),
        vec!["Jazz night", "Autodromo open day", "Lake walk"]
    );
    assert_eq!(all[0].latitude, Some(45.4842));

    let by_category = EventQueryFilter {
        category: Some("MUSIC".to_string()),
        ..filter()
    };
    assert_eq!(repos.count_events(&by_category).await.expect("count"), 1);

    let literal_percent = EventQueryFilter {
        search: Some("100%".to_string()),
        ..filter()
    };
    assert_eq!(repos.count_events(&literal_percent).await.expect("count"), 1);

    let by_city = EventQueryFilter {
        locations: vec!["milano".to_string(), "monza".to_string()],
        ..filter()
    };
    let page = repos
        .list_events(
            &by_city,
            Some(PageWindow {
                limit: 1,
                offset: 1,
            }),
        )
        .await
        .expect("page");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].title, "Autodromo open day");

    let until_march_second = EventQueryFilter {
        starts_until: Some(datetime!(2026-03-02 9:00 UTC)),
        ..filter()
    };
    assert_eq!(
        repos.count_events(&until_march_second).await.expect("count"),
        2
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn categories_are_grouped_and_sorted(pool: PgPool) {
    seed_events(&pool).await;
    let repos = PostgresRepositories::new(pool);

    let categories = repos.list_categories().await.expect("categories");
    let names: Vec<(&str, u64)> = categories
        .iter()
        .map(|category| (category.name.as_str(), category.count))
        .collect();

    assert_eq!(names, vec![("music", 2), ("sport", 1)]);
}
