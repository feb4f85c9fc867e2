use std::{process, sync::Arc};

use eventscout::{
    application::{
        catalog::QueryExecutor,
        error::AppError,
        refresh::{ManualRefreshError, RefreshOrchestrator, WatchOutcome},
        repos::{EventsRepo, ExecutionsRepo, StoreHealth},
        search::{EventSearchService, RefreshCommand},
        workflow::WorkflowTrigger,
    },
    cache::ResultCache,
    config,
    domain::signature::parse_date,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
        workflow::WebhookTrigger,
    },
};
use eventscout_api_types::RefreshResponse;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Refresh(args) => run_refresh(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let shutdown = CancellationToken::new();
    let search = build_search_service(repositories.clone(), &settings, shutdown.clone())?;

    let state = ApiState {
        search,
        health: repositories as Arc<dyn StoreHealth>,
        limits: settings.catalog.limits,
    };

    serve_http(&settings, state, shutdown).await
}

async fn run_refresh(
    settings: config::Settings,
    args: config::RefreshArgs,
) -> Result<(), AppError> {
    let command = RefreshCommand {
        cities: (!args.cities.is_empty()).then_some(args.cities),
        date_from: args
            .date_from
            .as_deref()
            .map(|raw| parse_date("date-from", raw))
            .transpose()?,
        date_to: args
            .date_to
            .as_deref()
            .map(|raw| parse_date("date-to", raw))
            .transpose()?,
        wait: args.wait,
    };

    let repositories = init_repositories(&settings).await?;
    let search = build_search_service(repositories, &settings, CancellationToken::new())?;

    info!(target = "eventscout::refresh_cmd", wait = command.wait, "Starting manual refresh");
    let refresh = search.refresh(command).await.map_err(|err| match err {
        ManualRefreshError::Repo(repo) => AppError::from(repo),
        other => AppError::unexpected(other.to_string()),
    })?;

    let execution_id = refresh.execution_id.to_string();
    let response = match refresh.completion {
        None => RefreshResponse::ok("Data refresh triggered successfully", execution_id),
        Some(WatchOutcome::Completed(record)) => {
            info!(
                target = "eventscout::refresh_cmd",
                event_count = record.event_count,
                "Refresh completed"
            );
            RefreshResponse::ok("Data refresh completed successfully", execution_id)
        }
        Some(outcome) => {
            warn!(
                target = "eventscout::refresh_cmd",
                outcome = outcome.label(),
                "Refresh did not complete while waiting"
            );
            let mut response = RefreshResponse::failed(format!("workflow {}", outcome.label()));
            response.execution_id = Some(execution_id);
            response
        }
    };

    let rendered = serde_json::to_string_pretty(&response)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_search_service(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
    shutdown: CancellationToken,
) -> Result<Arc<EventSearchService>, AppError> {
    let executions: Arc<dyn ExecutionsRepo> = repositories.clone();
    let events: Arc<dyn EventsRepo> = repositories;

    if settings.workflow.webhook_url.is_none() {
        warn!(
            target = "eventscout::startup",
            "workflow.webhook_url is not configured; refresh triggers will fail"
        );
    }
    let trigger: Arc<dyn WorkflowTrigger> =
        Arc::new(WebhookTrigger::new(&settings.workflow).map_err(AppError::from)?);

    let orchestrator = Arc::new(RefreshOrchestrator::new(
        executions,
        trigger,
        settings.refresh,
        shutdown,
    ));
    let cities = settings.catalog.recognized_cities.clone();
    let executor = Arc::new(QueryExecutor::new(events.clone(), cities.clone()));
    let results = settings
        .result_cache
        .enabled
        .then(|| Arc::new(ResultCache::new(&settings.result_cache)));

    Ok(Arc::new(EventSearchService::new(
        orchestrator,
        executor,
        events,
        results,
        cities,
    )))
}

async fn serve_http(
    settings: &config::Settings,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "eventscout::startup",
        addr = %settings.server.addr,
        "HTTP server listening"
    );

    let stop = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
    });

    tokio::select! {
        joined = &mut server => return server_result(joined),
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(target = "eventscout::shutdown", error = %err, "failed to listen for ctrl-c");
            }
            info!(target = "eventscout::shutdown", "Shutdown requested");
            shutdown.cancel();
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            warn!(
                target = "eventscout::shutdown",
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "Graceful shutdown timed out; aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}
