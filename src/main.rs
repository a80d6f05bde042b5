use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lumio::catalog::ShotCatalog;
use lumio::config::Config;
use lumio::http::{self, AppState};
use lumio::render::{FilterRenderer, PixelRenderer};
use lumio::state::{KeyValueStore, Library, SqliteStore};
use lumio::upstream::{GeminiImageEditor, HttpShotSearch, ImageEditor, RetryPolicy, SemanticSearch};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lumio=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Open the persistent store and load the library
    let store = SqliteStore::open(&config.database_path(), config.storage_quota_bytes)?;
    let library = Library::open(Box::new(store) as Box<dyn KeyValueStore>)?;

    let catalog = ShotCatalog::load_or_empty(&config.catalog_path)?;

    let editor = config.image_edit.as_ref().map(|edit| {
        Arc::new(GeminiImageEditor::new(
            &edit.endpoint,
            &edit.model,
            &edit.token,
            config.upstream_timeout,
        )) as Arc<dyn ImageEditor>
    });
    if editor.is_none() {
        tracing::warn!("LUMIO_IMAGE_EDIT_URL/TOKEN not set, /api/edit-image will fail");
    }

    let search = config.shot_search.as_ref().map(|search| {
        Arc::new(HttpShotSearch::new(
            &search.endpoint,
            &search.token,
            config.upstream_timeout,
        )) as Arc<dyn SemanticSearch>
    });
    if search.is_none() {
        tracing::warn!("LUMIO_SHOT_SEARCH_URL/TOKEN not set, semantic search is disabled");
    }

    let renderer: Arc<dyn FilterRenderer> = Arc::new(PixelRenderer::new(
        config.public_dir.clone(),
        config.upstream_timeout,
    ));

    let state = AppState {
        library: Arc::new(Mutex::new(library)),
        renderer,
        editor,
        search,
        catalog: Arc::new(catalog),
        public_dir: config.public_dir.clone(),
        retry: RetryPolicy::default(),
    };
    let app = http::router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, data_dir = %config.data_dir.display(), "lumio listening");
    axum::serve(listener, app).await?;
    Ok(())
}
