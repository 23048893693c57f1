use std::{process, sync::Arc};

use feedcache::{
    application::{
        error::AppError,
        indexer::{IndexScope, MemberIndexer},
        repos::{BackingStore, CacheStore},
        rng::RngSource,
        sampling::{SamplingPolicy, SamplingService},
    },
    config,
    domain::record::FeedId,
    infra::{
        db::PostgresStore,
        error::InfraError,
        http::{self, ErrorStatusPolicy, HttpState},
        redis::RedisCache,
        telemetry,
    },
};
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
        config::Command::Reindex(args) => run_reindex(settings, args).await,
    }
}

struct Stores {
    database: PostgresStore,
    cache: RedisCache,
}

async fn connect_stores(settings: &config::Settings) -> Result<Stores, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresStore::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let cache = RedisCache::connect(&settings.redis.url)
        .await
        .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?;

    info!(
        target = "feedcache::startup",
        max_connections = settings.database.max_connections.get(),
        redis_url = %settings.redis.url,
        "stores connected"
    );

    Ok(Stores {
        database: PostgresStore::new(pool),
        cache,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let stores = connect_stores(&settings).await?;
    let database = stores.database.clone();

    let store: Arc<dyn BackingStore> = Arc::new(stores.database);
    let cache: Arc<dyn CacheStore> = Arc::new(stores.cache);
    let sampling = SamplingService::new(
        store,
        cache.clone(),
        SamplingPolicy::from(&settings.sampling),
        RngSource::new(settings.sampling.rng_seed),
    );
    let state = HttpState::new(
        Arc::new(sampling),
        cache,
        ErrorStatusPolicy::from(&settings.http),
    );

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "feedcache::startup",
        addr = %settings.server.addr,
        typed_error_status = settings.http.typed_error_status,
        seeded = settings.sampling.rng_seed.is_some(),
        "listening"
    );

    let result = axum::serve(listener, http::build_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    database.close().await;
    result
}

async fn run_reindex(settings: config::Settings, args: config::ReindexArgs) -> Result<(), AppError> {
    let scope = if args.all {
        IndexScope::All
    } else if args.feeds.is_empty() {
        return Err(AppError::validation("reindex requires --all or at least one --feed"));
    } else {
        IndexScope::Feeds(args.feeds.into_iter().map(FeedId::new).collect())
    };

    let stores = connect_stores(&settings).await?;
    let database = stores.database.clone();
    let indexer = MemberIndexer::new(Arc::new(stores.database), Arc::new(stores.cache));

    let result = indexer.rebuild(&scope).await;
    database.close().await;

    let reports = result.map_err(|err| AppError::unexpected(format!("reindex failed: {err}")))?;
    let indexed: usize = reports.iter().map(|report| report.indexed).sum();
    let skipped: usize = reports.iter().map(|report| report.skipped).sum();
    let removed: usize = reports.iter().map(|report| report.removed).sum();
    info!(
        target = "feedcache::reindex",
        feeds = reports.len(),
        indexed,
        skipped,
        removed,
        "reindex finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target = "feedcache::shutdown", "received ctrl-c, draining"),
        Err(err) => {
            warn!(
                target = "feedcache::shutdown",
                error = %err,
                "failed to listen for ctrl-c; serving until the process is killed"
            );
            std::future::pending::<()>().await;
        }
    }
}
