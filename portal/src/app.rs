//! Service wiring: one entity store shared by every portal service.

use crate::archive::{ArchiveManager, ArchiveSweeper};
use crate::config::{Config, QrConfig, StoreBackend};
use crate::lifecycle::{LifecycleEnvironment, LifecycleManager};
use crate::notify::{Notifier, TracingNotifier};
use crate::qr::{QrVerificationService, TokenSigner};
use crate::assignment::SectionAssignmentService;
use crate::store::{EntityStore, InMemoryEntityStore};
use crate::types::ActorId;
use records_core::environment::{Clock, SystemClock};
use std::sync::Arc;

/// The portal's services, sharing one store, clock and notifier.
#[derive(Clone, Debug)]
pub struct PortalServices {
    /// Request lifecycle
    pub lifecycle: LifecycleManager,
    /// Sections and enrollment assignment
    pub sections: SectionAssignmentService,
    /// Archive and restore
    pub archive: ArchiveManager,
    /// Pickup tokens
    pub qr: QrVerificationService,
}

impl PortalServices {
    /// Wire the services around `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        qr: &QrConfig,
    ) -> Self {
        let lifecycle = LifecycleManager::new(store, LifecycleEnvironment::new(clock, notifier));
        Self {
            sections: SectionAssignmentService::new(lifecycle.clone()),
            archive: ArchiveManager::new(lifecycle.clone()),
            qr: QrVerificationService::new(
                lifecycle.clone(),
                TokenSigner::new(&qr.signing_secret),
                qr.lookup_timeout(),
                qr.token_ttl(),
            ),
            lifecycle,
        }
    }

    /// Services over a fresh in-memory store, with the system clock and
    /// log-only notifications.
    #[must_use]
    pub fn in_memory(qr: &QrConfig) -> Self {
        Self::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(SystemClock),
            Arc::new(TracingNotifier::new()),
            qr,
        )
    }

    /// Services over the store `config` selects.
    ///
    /// The `PostgreSQL` backend connects and migrates before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or migrated, or if
    /// `postgres` is selected in a build without the `postgres` feature.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn EntityStore> = match config.store.backend {
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory entity store; records are lost on restart");
                Arc::new(InMemoryEntityStore::new())
            },
            StoreBackend::Postgres => connect_postgres(config).await?,
        };

        Ok(Self::new(
            store,
            Arc::new(SystemClock),
            Arc::new(TracingNotifier::new()),
            &config.qr,
        ))
    }

    /// The shared entity store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        self.lifecycle.store()
    }

    /// Start the background archive sweep, if `config` enables it.
    #[must_use]
    pub fn spawn_sweeper(&self, config: &Config) -> Option<ArchiveSweeper> {
        let interval = config.archive.sweep_interval()?;
        Some(ArchiveSweeper::spawn(
            self.archive.clone(),
            interval,
            ActorId::new(config.archive.sweep_actor.clone()),
        ))
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &Config) -> anyhow::Result<Arc<dyn EntityStore>> {
    use crate::store::PostgresEntityStore;
    use std::time::Duration;

    let store = PostgresEntityStore::connect(
        &config.store.database_url,
        config.store.max_connections,
        Duration::from_secs(config.store.connect_timeout),
    )
    .await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
#[allow(clippy::unused_async)]
async fn connect_postgres(_config: &Config) -> anyhow::Result<Arc<dyn EntityStore>> {
    anyhow::bail!("STORE_BACKEND=postgres requires building with the `postgres` feature")
}
