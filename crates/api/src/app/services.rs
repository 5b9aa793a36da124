//! Service wiring: adapters (Postgres when a database URL is configured,
//! in-memory otherwise), services, plugins and the job queue.

use std::sync::Arc;

use anyhow::Context as _;
use sqlx::PgPool;
use tracing::info;

use firelancer_events::{EventEnvelope, InMemoryEventBus};
use firelancer_infra::collections::{
    CollectionPlugin, CollectionRepository, CollectionService, InMemoryCollectionRepository,
    PostgresCollectionRepository,
};
use firelancer_infra::config::FirelancerConfig;
use firelancer_infra::db;
use firelancer_infra::job_posts::{
    AssetRepository, FacetValueRepository, InMemoryAssetRepository, InMemoryFacetValueRepository,
    InMemoryJobPostRepository, JobPostEventBus, JobPostRepository, JobPostService, PostgresAssetRepository,
    PostgresFacetValueRepository, PostgresJobPostRepository,
};
use firelancer_infra::job_queue::{
    ErrorHandlers, InMemoryJobBufferStorage, InMemoryJobQueueStrategy, JobBufferStorageStrategy,
    JobQueueService, JobQueueStrategy, PostgresJobBufferStorage, PostgresJobQueueStrategy, PostgresJobStore,
    TracingErrorHandler,
};
use firelancer_infra::plugin::{Plugin, PluginContext, bootstrap_plugins, configure_plugins};
use firelancer_job_posts::JobPostEvent;
use firelancer_search::{
    InMemorySearchIndex, JobPostSearchService, PostgresSearchStrategy, ProfileSearchService, SearchIndexStore,
    SearchIndexer, SearchPlugin, SearchService, SearchStrategy,
};

const MAX_DB_CONNECTIONS: u32 = 10;

/// Everything the route handlers reach.
pub struct AppServices {
    pub config: Arc<FirelancerConfig>,
    pub job_posts: Arc<JobPostService>,
    pub facet_values: Arc<dyn FacetValueRepository>,
    pub collections: Arc<CollectionService>,
    pub search: Arc<SearchService>,
    pub indexer: Arc<SearchIndexer>,
    pub job_queue: Arc<JobQueueService>,
    pub plugins: Arc<PluginContext>,
}

impl AppServices {
    pub fn error_handlers(&self) -> &ErrorHandlers {
        self.job_queue.error_handlers()
    }

    /// Stop the queues, then the plugin event workers.
    pub async fn shutdown(&self) {
        if let Err(e) = self.job_queue.stop().await {
            tracing::warn!(error = %e, "job queues did not stop cleanly");
        }
        let plugins = self.plugins.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || plugins.shutdown()).await {
            tracing::warn!(error = %e, "plugin workers did not stop cleanly");
        }
    }
}

struct Adapters {
    posts: Arc<dyn JobPostRepository>,
    facet_values: Arc<dyn FacetValueRepository>,
    assets: Arc<dyn AssetRepository>,
    collections: Arc<dyn CollectionRepository>,
    search_strategy: Arc<dyn SearchStrategy>,
    search_store: Arc<dyn SearchIndexStore>,
    queue_strategy: Arc<dyn JobQueueStrategy>,
    buffer_storage: Arc<dyn JobBufferStorageStrategy>,
}

fn in_memory_adapters(config: &FirelancerConfig) -> Adapters {
    let index = Arc::new(InMemorySearchIndex::new(config.search.min_term_length));
    Adapters {
        posts: Arc::new(InMemoryJobPostRepository::new()),
        facet_values: Arc::new(InMemoryFacetValueRepository::new()),
        assets: Arc::new(InMemoryAssetRepository::new()),
        collections: Arc::new(InMemoryCollectionRepository::new()),
        search_strategy: index.clone(),
        search_store: index,
        queue_strategy: Arc::new(InMemoryJobQueueStrategy::in_memory(config.job_queue.polling.clone())),
        buffer_storage: Arc::new(InMemoryJobBufferStorage::new()),
    }
}

async fn postgres_adapters(config: &FirelancerConfig, database_url: &str) -> anyhow::Result<Adapters> {
    let pool: PgPool = db::connect(database_url, MAX_DB_CONNECTIONS)
        .await
        .context("failed to connect to postgres")?;
    db::ensure_schema(&pool).await.context("failed to create infra schema")?;
    firelancer_search::db::ensure_schema(&pool)
        .await
        .context("failed to create search schema")?;

    let search = Arc::new(PostgresSearchStrategy::with_min_term_length(
        pool.clone(),
        config.search.min_term_length,
    ));
    Ok(Adapters {
        posts: Arc::new(PostgresJobPostRepository::new(pool.clone())),
        facet_values: Arc::new(PostgresFacetValueRepository::new(pool.clone())),
        assets: Arc::new(PostgresAssetRepository::new(pool.clone())),
        collections: Arc::new(PostgresCollectionRepository::new(pool.clone())),
        search_strategy: search.clone(),
        search_store: search,
        queue_strategy: Arc::new(PostgresJobQueueStrategy::new(
            PostgresJobStore::new(pool.clone()),
            config.job_queue.polling.clone(),
        )),
        buffer_storage: Arc::new(PostgresJobBufferStorage::new(pool)),
    })
}

/// Build every service, bootstrap the plugins and start the job queues.
///
/// Must run inside a multi-threaded runtime: plugin event workers block on
/// their own threads.
pub async fn build_services(mut config: FirelancerConfig) -> anyhow::Result<AppServices> {
    let adapters = match config.db.url.clone() {
        Some(url) => postgres_adapters(&config, &url).await?,
        None => {
            info!("DATABASE_URL not set; using in-memory adapters");
            in_memory_adapters(&config)
        }
    };

    let events: Arc<InMemoryEventBus<EventEnvelope<JobPostEvent>>> = Arc::new(InMemoryEventBus::new());
    let events: Arc<JobPostEventBus> = events;

    let job_posts = Arc::new(JobPostService::new(
        adapters.posts.clone(),
        adapters.facet_values.clone(),
        adapters.assets.clone(),
        events.clone(),
        config.job_posts.process.clone(),
    ));
    let collections = Arc::new(CollectionService::new(adapters.collections.clone(), job_posts.clone()));

    let indexer = Arc::new(SearchIndexer::new(
        Arc::new(JobPostSearchService::new(
            adapters.search_store.clone(),
            adapters.posts.clone(),
            adapters.facet_values.clone(),
            adapters.collections.clone(),
        )),
        Arc::new(ProfileSearchService::new(adapters.search_store.clone())),
    ));
    let search = Arc::new(SearchService::new(adapters.search_strategy.clone()));

    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(CollectionPlugin::new(collections.clone(), config.search.buffer_updates)),
        Arc::new(SearchPlugin::new(indexer.clone())),
    ];
    configure_plugins(&plugins, &mut config);
    let config = Arc::new(config);

    let job_queue = Arc::new(JobQueueService::new(
        adapters.queue_strategy,
        adapters.buffer_storage,
        ErrorHandlers::new(vec![Arc::new(TracingErrorHandler)]),
        config.job_queue.service.clone(),
    ));

    let plugin_ctx = Arc::new(PluginContext::new(
        config.clone(),
        job_queue.clone(),
        events,
        adapters.posts,
    ));
    bootstrap_plugins(&plugins, &plugin_ctx).await?;
    job_queue.start().await.context("failed to start job queues")?;
    info!(
        queues = job_queue.get_job_queues()?.len(),
        workers = plugin_ctx.worker_count(),
        "services ready"
    );

    Ok(AppServices {
        config,
        job_posts,
        facet_values: adapters.facet_values,
        collections,
        search,
        indexer,
        job_queue,
        plugins: plugin_ctx,
    })
}
