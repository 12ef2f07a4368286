//! Section assignment: completing an enrollment by placing the student in a
//! capacity-bounded section.

use crate::error::{PortalError, Result};
use crate::grade::GradeLevel;
use crate::lifecycle::{LifecycleAction, LifecycleManager, LifecycleState, refused};
use crate::store::EntityStore;
use crate::types::{
    ActorId, DEFAULT_SECTION_CAPACITY, NewSection, Request, RequestId, Section, SectionId,
    SectionWithCount,
};
use records_core::environment::Clock;
use records_core::version::Version;
use std::sync::Arc;

/// Section management and enrollment assignment.
#[derive(Clone, Debug)]
pub struct SectionAssignmentService {
    lifecycle: LifecycleManager,
}

impl SectionAssignmentService {
    /// Create the service on top of the lifecycle manager.
    #[must_use]
    pub const fn new(lifecycle: LifecycleManager) -> Self {
        Self { lifecycle }
    }

    fn store(&self) -> &Arc<dyn EntityStore> {
        self.lifecycle.store()
    }

    /// Assign an approved enrollment to `section_id`.
    ///
    /// The lifecycle checks (kind, status, grade, version) run against the
    /// current record; the store then recounts the section and writes the
    /// enrolled record atomically.
    ///
    /// # Errors
    ///
    /// - [`PortalError::CapacityExceeded`] if the section is full; the
    ///   enrollment is left untouched
    /// - [`PortalError::InvalidTransition`] unless the request is an approved
    ///   enrollment
    /// - [`PortalError::Validation`] if the section is for another grade
    /// - [`PortalError::VersionConflict`] if `expected_version` is stale
    /// - [`PortalError::NotFound`] for an unknown request or section
    #[tracing::instrument(skip(self))]
    pub async fn assign_section(
        &self,
        request_id: RequestId,
        section_id: SectionId,
        expected_version: Version,
        actor: ActorId,
    ) -> Result<Request> {
        let section = self.section(section_id).await?;
        let current = self.lifecycle.get(request_id).await?;
        let stored_version = current.version;

        let (enrolled, effects) = self.lifecycle.plan(
            LifecycleState::loaded(current),
            LifecycleAction::AssignSection {
                expected_version,
                section,
                actor,
            },
        )?;

        self.store()
            .assign_section(stored_version, enrolled.clone(), section_id)
            .await
            .map_err(|e| refused("assign_section", e.into()))?;

        self.lifecycle.committed("assign_section", &enrolled, effects);
        Ok(enrolled)
    }

    /// Sections for a grade level, each with its live enrolled count.
    ///
    /// `level` is normalized first, so `"7"`, `"grade 7"` and `"Grade 7"`
    /// all find the same sections.
    ///
    /// # Errors
    ///
    /// [`PortalError::Validation`] for a blank level; store failures.
    pub async fn sections_for_grade(&self, level: &str) -> Result<Vec<SectionWithCount>> {
        let grade = GradeLevel::parse(level)?;
        let sections = self.store().list_sections().await?;

        let mut matching = Vec::new();
        for section in sections.into_iter().filter(|s| s.grade_level == grade) {
            matching.push(self.with_count(section).await?);
        }
        Ok(matching)
    }

    /// Every section with its live enrolled count.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn list_sections(&self) -> Result<Vec<SectionWithCount>> {
        let sections = self.store().list_sections().await?;
        let mut listed = Vec::with_capacity(sections.len());
        for section in sections {
            listed.push(self.with_count(section).await?);
        }
        Ok(listed)
    }

    /// Create a section.
    ///
    /// # Errors
    ///
    /// [`PortalError::Validation`] for a blank name or grade, a zero capacity,
    /// or a name already used in the same grade.
    #[tracing::instrument(skip(self))]
    pub async fn create_section(&self, new: NewSection) -> Result<Section> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(PortalError::validation("Section name is required"));
        }
        let capacity = new.capacity.unwrap_or(DEFAULT_SECTION_CAPACITY);
        if capacity == 0 {
            return Err(PortalError::validation("Capacity must be positive"));
        }

        let section = Section {
            id: SectionId::new(),
            name: name.to_string(),
            grade_level: GradeLevel::parse(&new.grade_level)?,
            adviser: new
                .adviser
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            capacity,
            created_at: self.lifecycle.clock().now(),
        };

        self.store().insert_section(section.clone()).await?;
        tracing::info!(
            section_id = %section.id,
            name = %section.name,
            grade = %section.grade_level,
            capacity,
            "Section created"
        );
        Ok(section)
    }

    /// Enrolled, non-archived students of one section.
    ///
    /// # Errors
    ///
    /// [`PortalError::NotFound`] for an unknown section.
    pub async fn roster(&self, section_id: SectionId) -> Result<Vec<Request>> {
        Ok(self.store().section_roster(section_id).await?)
    }

    async fn section(&self, id: SectionId) -> Result<Section> {
        self.store()
            .get_section(id)
            .await?
            .ok_or_else(|| PortalError::NotFound {
                resource: "Section",
                id: id.to_string(),
            })
    }

    async fn with_count(&self, section: Section) -> Result<SectionWithCount> {
        let enrolled_count = self.store().enrolled_count(section.id).await?;
        Ok(SectionWithCount {
            section,
            enrolled_count,
        })
    }
}
