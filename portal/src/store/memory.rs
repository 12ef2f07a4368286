//! In-memory entity store.
//!
//! Every entity lives behind one `tokio::sync::RwLock`. Reads share the lock;
//! each write (including the count-then-write of a section assignment) runs
//! entirely under the writer guard, which makes the writer lock the
//! serialization point for both version checks and capacity checks.

use super::{EntityStore, EntityStoreError, StoreFuture};
use crate::types::{
    ActorId, PickupTokenRecord, Request, RequestFilter, RequestId, Section, SectionId,
};
use chrono::{DateTime, Utc};
use records_core::version::Version;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    requests: HashMap<RequestId, Request>,
    sections: HashMap<SectionId, Section>,
    tokens: HashMap<RequestId, PickupTokenRecord>,
}

impl Tables {
    fn enrolled_in(&self, section: &Section) -> u32 {
        let count = self
            .requests
            .values()
            .filter(|request| request.occupies(section))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn section(&self, id: SectionId) -> Result<&Section, EntityStoreError> {
        self.sections
            .get(&id)
            .ok_or_else(|| EntityStoreError::section_not_found(id))
    }

    fn check_version(&self, id: RequestId, expected: Version) -> Result<(), EntityStoreError> {
        let stored = self
            .requests
            .get(&id)
            .ok_or_else(|| EntityStoreError::request_not_found(id))?;
        if stored.version != expected {
            return Err(EntityStoreError::VersionConflict {
                expected,
                actual: stored.version,
            });
        }
        Ok(())
    }
}

/// Entity store backed by process memory.
///
/// Cloning is cheap and clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryEntityStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for InMemoryEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEntityStore").finish_non_exhaustive()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn insert_request(&self, request: Request) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if tables.requests.contains_key(&request.id) {
                return Err(EntityStoreError::Duplicate(format!(
                    "request {} already exists",
                    request.id
                )));
            }
            tables.requests.insert(request.id, request);
            Ok(())
        })
    }

    fn get_request(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move { Ok(self.tables.read().await.requests.get(&id).cloned()) })
    }

    fn update_request(&self, expected: Version, request: Request) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            tables.check_version(request.id, expected)?;
            tables.requests.insert(request.id, request);
            Ok(())
        })
    }

    fn list_requests(&self, filter: RequestFilter) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut requests: Vec<Request> = tables
                .requests
                .values()
                .filter(|request| filter.matches(request))
                .cloned()
                .collect();
            filter.sort(&mut requests);
            Ok(requests)
        })
    }

    fn insert_section(&self, section: Section) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let taken = tables
                .sections
                .values()
                .any(|s| s.name == section.name && s.grade_level == section.grade_level);
            if taken {
                return Err(EntityStoreError::Duplicate(format!(
                    "section {} already exists in {}",
                    section.name, section.grade_level
                )));
            }
            tables.sections.insert(section.id, section);
            Ok(())
        })
    }

    fn get_section(&self, id: SectionId) -> StoreFuture<'_, Option<Section>> {
        Box::pin(async move { Ok(self.tables.read().await.sections.get(&id).cloned()) })
    }

    fn list_sections(&self) -> StoreFuture<'_, Vec<Section>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut sections: Vec<Section> = tables.sections.values().cloned().collect();
            sections.sort_by(|a, b| {
                a.grade_level
                    .cmp(&b.grade_level)
                    .then_with(|| a.name.cmp(&b.name))
            });
            Ok(sections)
        })
    }

    fn enrolled_count(&self, section_id: SectionId) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let section = tables.section(section_id)?;
            Ok(tables.enrolled_in(section))
        })
    }

    fn section_roster(&self, section_id: SectionId) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let section = tables.section(section_id)?;
            let mut roster: Vec<Request> = tables
                .requests
                .values()
                .filter(|request| request.occupies(section))
                .cloned()
                .collect();
            roster.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
            Ok(roster)
        })
    }

    fn assign_section(
        &self,
        expected: Version,
        request: Request,
        section_id: SectionId,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let section = tables.section(section_id)?;
            let enrolled = tables.enrolled_in(section);
            if enrolled >= section.capacity {
                return Err(EntityStoreError::CapacityExceeded {
                    section: section.name.clone(),
                    capacity: section.capacity,
                    enrolled,
                });
            }
            tables.check_version(request.id, expected)?;
            tables.requests.insert(request.id, request);
            Ok(())
        })
    }

    fn save_pickup_token(&self, record: PickupTokenRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if tables
                .tokens
                .get(&record.request_id)
                .is_some_and(PickupTokenRecord::is_verified)
            {
                return Err(EntityStoreError::AlreadyUsed(record.request_id));
            }
            tables.tokens.insert(record.request_id, record);
            Ok(())
        })
    }

    fn get_pickup_token(&self, request_id: RequestId) -> StoreFuture<'_, Option<PickupTokenRecord>> {
        Box::pin(async move { Ok(self.tables.read().await.tokens.get(&request_id).cloned()) })
    }

    fn mark_token_verified(
        &self,
        request_id: RequestId,
        checksum: String,
        at: DateTime<Utc>,
        by: ActorId,
    ) -> StoreFuture<'_, PickupTokenRecord> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let record = tables
                .tokens
                .get_mut(&request_id)
                .ok_or_else(|| EntityStoreError::NotFound {
                    resource: "Pickup token",
                    id: request_id.to_string(),
                })?;
            if record.checksum != checksum {
                return Err(EntityStoreError::TokenMismatch(request_id));
            }
            if record.is_verified() {
                return Err(EntityStoreError::AlreadyUsed(request_id));
            }
            record.verified_at = Some(at);
            record.verified_by = Some(by);
            Ok(record.clone())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::grade::GradeLevel;
    use crate::types::{RequestKind, RequestStatus, SubjectId};

    fn section(capacity: u32) -> Section {
        Section {
            id: SectionId::new(),
            name: "Rizal".to_string(),
            grade_level: GradeLevel::parse("7").unwrap(),
            adviser: Some("Ms. Santos".to_string()),
            capacity,
            created_at: Utc::now(),
        }
    }

    fn approved_enrollment() -> Request {
        let now = Utc::now();
        Request {
            id: RequestId::new(),
            subject: SubjectId::new("stu"),
            kind: RequestKind::Enrollment,
            status: RequestStatus::Approved,
            message: None,
            replies: Vec::new(),
            document_type: None,
            purpose: None,
            grade_level: Some(GradeLevel::parse("7").unwrap()),
            section: None,
            rejection_reason: None,
            review: None,
            completed_at: None,
            picked_up_by: None,
            archive: None,
            created_at: now,
            updated_at: now,
            version: Version::new(1),
        }
    }

    fn enrolled_copy(request: &Request, section: &Section) -> Request {
        let mut next = request.clone();
        next.status = RequestStatus::Enrolled;
        next.section = Some(section.name.clone());
        next.version = request.version.next();
        next
    }

    #[tokio::test]
    async fn update_rejects_stale_version() {
        let store = InMemoryEntityStore::new();
        let request = approved_enrollment();
        store.insert_request(request.clone()).await.unwrap();

        let mut bumped = request.clone();
        bumped.version = Version::new(2);
        store.update_request(Version::new(1), bumped.clone()).await.unwrap();

        let result = store.update_request(Version::new(1), bumped).await;
        assert_eq!(
            result,
            Err(EntityStoreError::VersionConflict {
                expected: Version::new(1),
                actual: Version::new(2),
            })
        );
    }

    #[tokio::test]
    async fn assignment_stops_at_capacity() {
        let store = InMemoryEntityStore::new();
        let section = section(1);
        store.insert_section(section.clone()).await.unwrap();

        let first = approved_enrollment();
        let second = approved_enrollment();
        store.insert_request(first.clone()).await.unwrap();
        store.insert_request(second.clone()).await.unwrap();

        store
            .assign_section(first.version, enrolled_copy(&first, &section), section.id)
            .await
            .unwrap();
        let result = store
            .assign_section(second.version, enrolled_copy(&second, &section), section.id)
            .await;

        assert!(matches!(
            result,
            Err(EntityStoreError::CapacityExceeded { enrolled: 1, capacity: 1, .. })
        ));
        assert_eq!(store.enrolled_count(section.id).await.unwrap(), 1);
        let untouched = store.get_request(second.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn duplicate_section_name_in_same_grade_is_rejected() {
        let store = InMemoryEntityStore::new();
        store.insert_section(section(40)).await.unwrap();
        let result = store.insert_section(section(40)).await;
        assert!(matches!(result, Err(EntityStoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn token_is_verified_once() {
        let store = InMemoryEntityStore::new();
        let request_id = RequestId::new();
        store
            .save_pickup_token(PickupTokenRecord {
                request_id,
                checksum: "abc".to_string(),
                issued_at: Utc::now(),
                verified_at: None,
                verified_by: None,
            })
            .await
            .unwrap();

        let mismatch = store
            .mark_token_verified(request_id, "xyz".into(), Utc::now(), ActorId::new("Admin"))
            .await;
        assert_eq!(mismatch, Err(EntityStoreError::TokenMismatch(request_id)));

        let verified = store
            .mark_token_verified(request_id, "abc".into(), Utc::now(), ActorId::new("Admin"))
            .await
            .unwrap();
        assert!(verified.is_verified());

        let again = store
            .mark_token_verified(request_id, "abc".into(), Utc::now(), ActorId::new("Admin"))
            .await;
        assert_eq!(again, Err(EntityStoreError::AlreadyUsed(request_id)));

        let reissue = store
            .save_pickup_token(PickupTokenRecord {
                request_id,
                checksum: "def".to_string(),
                issued_at: Utc::now(),
                verified_at: None,
                verified_by: None,
            })
            .await;
        assert_eq!(reissue, Err(EntityStoreError::AlreadyUsed(request_id)));
    }
}
