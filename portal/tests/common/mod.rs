//! Shared fixtures for the portal integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{DateTime, Utc};
use records_core::version::Version;
use records_portal::config::{Config, QrConfig};
use records_portal::notify::RecordingNotifier;
use records_portal::store::StoreFuture;
use records_portal::{
    ActorId, EntityStore, EntityStoreError, InMemoryEntityStore, NewRequest, NewSection,
    PickupTokenRecord, PortalServices, Request, RequestFilter, RequestId, RequestKind, Section,
    SectionId, SubjectId,
};
use records_testing::{ManualClock, test_time};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

const UP: u8 = 0;
const DOWN: u8 = 1;
const HANGING: u8 = 2;
const SLOW_ACKS: u8 = 3;

/// Delay between a committed token mark and its acknowledgement in
/// [`FlakyStore::slow_acks`] mode.
pub const SLOW_ACK: Duration = Duration::from_millis(500);

/// In-memory store that can be switched off, made to hang, or made to
/// acknowledge token marks late.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryEntityStore,
    mode: AtomicU8,
}

impl FlakyStore {
    pub fn go_down(&self) {
        self.mode.store(DOWN, Ordering::SeqCst);
    }

    pub fn hang(&self) {
        self.mode.store(HANGING, Ordering::SeqCst);
    }

    /// Token marks commit immediately but report back after [`SLOW_ACK`].
    pub fn slow_acks(&self) {
        self.mode.store(SLOW_ACKS, Ordering::SeqCst);
    }

    pub fn come_back(&self) {
        self.mode.store(UP, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), EntityStoreError> {
        match self.mode.load(Ordering::SeqCst) {
            DOWN => Err(EntityStoreError::Unavailable("connection refused".to_string())),
            HANGING => std::future::pending().await,
            _ => Ok(()),
        }
    }
}

impl EntityStore for FlakyStore {
    fn insert_request(&self, request: Request) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.insert_request(request).await
        })
    }

    fn get_request(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.get_request(id).await
        })
    }

    fn update_request(&self, expected: Version, request: Request) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.update_request(expected, request).await
        })
    }

    fn list_requests(&self, filter: RequestFilter) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.list_requests(filter).await
        })
    }

    fn insert_section(&self, section: Section) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.insert_section(section).await
        })
    }

    fn get_section(&self, id: SectionId) -> StoreFuture<'_, Option<Section>> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.get_section(id).await
        })
    }

    fn list_sections(&self) -> StoreFuture<'_, Vec<Section>> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.list_sections().await
        })
    }

    fn enrolled_count(&self, section_id: SectionId) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.enrolled_count(section_id).await
        })
    }

    fn section_roster(&self, section_id: SectionId) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.section_roster(section_id).await
        })
    }

    fn assign_section(
        &self,
        expected: Version,
        request: Request,
        section_id: SectionId,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.assign_section(expected, request, section_id).await
        })
    }

    fn save_pickup_token(&self, record: PickupTokenRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.save_pickup_token(record).await
        })
    }

    fn get_pickup_token(&self, request_id: RequestId) -> StoreFuture<'_, Option<PickupTokenRecord>> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.get_pickup_token(request_id).await
        })
    }

    fn mark_token_verified(
        &self,
        request_id: RequestId,
        checksum: String,
        at: DateTime<Utc>,
        by: ActorId,
    ) -> StoreFuture<'_, PickupTokenRecord> {
        Box::pin(async move {
            self.gate().await?;
            let marked = self
                .inner
                .mark_token_verified(request_id, checksum, at, by)
                .await;
            if self.mode.load(Ordering::SeqCst) == SLOW_ACKS {
                tokio::time::sleep(SLOW_ACK).await;
            }
            marked
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.gate().await?;
            self.inner.ping().await
        })
    }
}

/// Portal services over a [`FlakyStore`] with a manual clock.
pub struct Harness {
    pub services: PortalServices,
    pub store: Arc<FlakyStore>,
    pub clock: ManualClock,
    pub notifier: RecordingNotifier,
}

pub fn qr_config() -> QrConfig {
    QrConfig {
        signing_secret: "integration-secret".to_string(),
        lookup_timeout_ms: 200,
        token_ttl_days: 30,
    }
}

pub fn harness() -> Harness {
    let store = Arc::new(FlakyStore::default());
    let clock = ManualClock::new(test_time());
    let notifier = RecordingNotifier::new();
    let services = PortalServices::new(
        Arc::clone(&store) as Arc<dyn EntityStore>,
        Arc::new(clock.clone()),
        Arc::new(notifier.clone()),
        &qr_config(),
    );
    Harness {
        services,
        store,
        clock,
        notifier,
    }
}

/// Services over a plain in-memory store, as the server builds them.
pub fn in_memory_services() -> PortalServices {
    PortalServices::in_memory(&Config::default().qr)
}

pub fn admin() -> ActorId {
    ActorId::new("Admin")
}

pub fn document(subject: &str) -> NewRequest {
    NewRequest {
        subject: SubjectId::new(subject),
        kind: RequestKind::Document,
        message: None,
        document_type: Some("Form 137".to_string()),
        purpose: Some("Transfer".to_string()),
        grade_level: None,
    }
}

pub fn enrollment(subject: &str, grade: &str) -> NewRequest {
    NewRequest {
        subject: SubjectId::new(subject),
        kind: RequestKind::Enrollment,
        message: None,
        document_type: None,
        purpose: None,
        grade_level: Some(grade.to_string()),
    }
}

pub fn inquiry(subject: &str, message: &str) -> NewRequest {
    NewRequest {
        subject: SubjectId::new(subject),
        kind: RequestKind::Inquiry,
        message: Some(message.to_string()),
        document_type: None,
        purpose: None,
        grade_level: None,
    }
}

pub async fn approved(services: &PortalServices, new: NewRequest) -> Request {
    let submitted = services.lifecycle.submit(new).await.unwrap();
    services
        .lifecycle
        .approve(submitted.id, submitted.version, admin(), None)
        .await
        .unwrap()
}

pub async fn section(services: &PortalServices, name: &str, grade: &str, capacity: u32) -> Section {
    services
        .sections
        .create_section(NewSection {
            name: name.to_string(),
            grade_level: grade.to_string(),
            adviser: None,
            capacity: Some(capacity),
        })
        .await
        .unwrap()
}

/// Wait until `check` holds, polling the detached effect tasks.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within one second");
}
