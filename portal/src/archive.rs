//! Archive manager: moving terminal records in and out of the archived view.
//!
//! Archiving never changes a record's status. The archive stamp alone decides
//! which view a record belongs to, so restoring simply drops the stamp.

use crate::error::{PortalError, Result};
use crate::lifecycle::{LifecycleAction, LifecycleManager, LifecycleState, refused};
use crate::types::{
    ActorId, ArchiveStamp, Request, RequestFilter, RequestId, RequestKind, RequestStatus, SectionId,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Stamp `request` as archived by `actor` at `at`.
///
/// # Errors
///
/// [`PortalError::InvalidTransition`] if the record is already archived or
/// its status is not terminal.
pub fn archive_record(request: &mut Request, actor: &ActorId, at: DateTime<Utc>) -> Result<()> {
    if request.is_archived() {
        return Err(PortalError::invalid(format!(
            "request {} is already archived",
            request.id
        )));
    }
    if !request.status.is_terminal() {
        return Err(PortalError::invalid(format!(
            "cannot archive a {} {}; only rejected, completed or enrolled records are archived",
            request.status, request.kind
        )));
    }
    request.archive = Some(ArchiveStamp {
        at,
        by: actor.clone(),
    });
    Ok(())
}

/// Drop the archive stamp; the status is left as it was.
///
/// # Errors
///
/// [`PortalError::NotArchived`] if the record is not archived.
pub fn restore_record(request: &mut Request) -> Result<()> {
    if request.archive.take().is_none() {
        return Err(PortalError::NotArchived(request.id));
    }
    Ok(())
}

/// Manual and bulk archive operations.
#[derive(Clone, Debug)]
pub struct ArchiveManager {
    lifecycle: LifecycleManager,
}

impl ArchiveManager {
    /// Create an archive manager on top of the lifecycle manager.
    #[must_use]
    pub const fn new(lifecycle: LifecycleManager) -> Self {
        Self { lifecycle }
    }

    /// Archive one terminal record.
    ///
    /// # Errors
    ///
    /// [`PortalError::InvalidTransition`] for non-terminal or already archived
    /// records; [`PortalError::NotFound`].
    #[tracing::instrument(skip(self))]
    pub async fn archive(&self, id: RequestId, actor: ActorId) -> Result<Request> {
        self.lifecycle
            .execute(id, LifecycleAction::Archive { actor })
            .await
    }

    /// Return an archived record to the active view.
    ///
    /// A restored enrollment takes its seat back, so it goes through the same
    /// capacity-checked write as a section assignment.
    ///
    /// # Errors
    ///
    /// [`PortalError::NotArchived`] if it is not archived;
    /// [`PortalError::CapacityExceeded`] if its section filled up meanwhile;
    /// [`PortalError::NotFound`].
    #[tracing::instrument(skip(self))]
    pub async fn restore(&self, id: RequestId) -> Result<Request> {
        let current = self.lifecycle.get(id).await?;
        let expected = current.version;
        let (restored, effects) = self
            .lifecycle
            .plan(LifecycleState::loaded(current), LifecycleAction::Restore)?;

        let store = self.lifecycle.store();
        let written = match self.seat_of(&restored).await? {
            Some(section_id) => {
                store
                    .assign_section(expected, restored.clone(), section_id)
                    .await
            },
            None => store.update_request(expected, restored.clone()).await,
        };
        written.map_err(|e| refused("restore", e.into()))?;

        self.lifecycle.committed("restore", &restored, effects);
        Ok(restored)
    }

    /// Section an enrolled record would occupy once active again.
    async fn seat_of(&self, request: &Request) -> Result<Option<SectionId>> {
        if request.kind != RequestKind::Enrollment || request.status != RequestStatus::Enrolled {
            return Ok(None);
        }
        let sections = self.lifecycle.store().list_sections().await?;
        Ok(sections
            .into_iter()
            .find(|section| request.occupies(section))
            .map(|section| section.id))
    }

    /// Archive every active, terminal-complete record of `kind`.
    ///
    /// Records that changed since the listing (version conflict) or are no
    /// longer archivable are skipped. Running it twice archives nothing the
    /// second time.
    ///
    /// # Errors
    ///
    /// Store failures while listing or writing.
    #[tracing::instrument(skip(self))]
    pub async fn bulk_archive_completed(&self, kind: RequestKind, actor: ActorId) -> Result<usize> {
        let candidates = self
            .lifecycle
            .list(RequestFilter {
                kind,
                status: Some(kind.completed_status()),
                ..RequestFilter::active(kind)
            })
            .await?;

        let mut archived = 0;
        for request in candidates {
            let action = LifecycleAction::Archive {
                actor: actor.clone(),
            };
            match self.lifecycle.execute(request.id, action).await {
                Ok(_) => archived += 1,
                Err(PortalError::VersionConflict { .. } | PortalError::InvalidTransition(_)) => {
                    tracing::debug!(request_id = %request.id, "Skipping record changed since listing");
                },
                Err(error) => return Err(error),
            }
        }

        tracing::info!(kind = %kind, archived, "Bulk archive finished");
        Ok(archived)
    }
}

/// Background task that periodically runs [`ArchiveManager::bulk_archive_completed`]
/// for every kind.
#[derive(Debug)]
pub struct ArchiveSweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ArchiveSweeper {
    /// Start sweeping every `interval`. The first sweep runs after one full
    /// interval.
    #[must_use]
    pub fn spawn(manager: ArchiveManager, interval: Duration, actor: ActorId) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for kind in RequestKind::ALL {
                            match manager.bulk_archive_completed(kind, actor.clone()).await {
                                Ok(count) => {
                                    metrics::counter!("portal.archive.swept", "kind" => kind.as_str())
                                        .increment(u64::try_from(count).unwrap_or(u64::MAX));
                                },
                                Err(error) => {
                                    tracing::error!(kind = %kind, error = %error, "Archive sweep failed");
                                },
                            }
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Archive sweeper stopped");
        });

        tracing::info!(interval_secs = interval.as_secs(), "Archive sweeper started");
        Self { shutdown, handle }
    }

    /// Stop the sweeper and wait for an in-flight sweep to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.handle.await {
            tracing::warn!(error = %error, "Archive sweeper task ended abnormally");
        }
    }
}
