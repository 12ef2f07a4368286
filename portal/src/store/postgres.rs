//! `PostgreSQL` entity store.
//!
//! Requests of every kind, sections and pickup tokens live in three tables
//! created by [`PostgresEntityStore::migrate`]; inquiry replies are a JSONB
//! column on the request row. Version checks are part of the `UPDATE`
//! predicate; a section assignment or an enrollment restore runs in a
//! transaction that holds a row lock on the section while it recounts and
//! writes.
//!
//! # Example
//!
//! ```no_run
//! use records_portal::store::PostgresEntityStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresEntityStore::connect(
//!     "postgres://localhost/records",
//!     10,
//!     Duration::from_secs(30),
//! )
//! .await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use super::{EntityStore, EntityStoreError, StoreFuture};
use crate::grade::GradeLevel;
use crate::types::{
    ActorId, ArchiveStamp, ArchiveView, PickupTokenRecord, Reply, Request, RequestFilter,
    RequestId, Review, Section, SectionId, SubjectId,
};
use chrono::{DateTime, Utc};
use records_core::version::Version;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS requests (
        id UUID PRIMARY KEY,
        subject_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        message TEXT,
        replies JSONB NOT NULL DEFAULT '[]',
        document_type TEXT,
        purpose TEXT,
        grade_level TEXT,
        section TEXT,
        rejection_reason TEXT,
        review_notes TEXT,
        reviewed_by TEXT,
        reviewed_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        picked_up_by TEXT,
        archived_at TIMESTAMPTZ,
        archived_by TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        version BIGINT NOT NULL
    )
    ",
    "ALTER TABLE requests ADD COLUMN IF NOT EXISTS message TEXT",
    "ALTER TABLE requests ADD COLUMN IF NOT EXISTS replies JSONB NOT NULL DEFAULT '[]'",
    r"
    CREATE INDEX IF NOT EXISTS requests_section_idx
        ON requests (section, grade_level)
        WHERE status = 'enrolled' AND archived_at IS NULL
    ",
    r"
    CREATE TABLE IF NOT EXISTS sections (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        grade_level TEXT NOT NULL,
        adviser TEXT,
        capacity INTEGER NOT NULL CHECK (capacity > 0),
        created_at TIMESTAMPTZ NOT NULL,
        UNIQUE (name, grade_level)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS pickup_tokens (
        request_id UUID PRIMARY KEY,
        checksum TEXT NOT NULL,
        issued_at TIMESTAMPTZ NOT NULL,
        verified_at TIMESTAMPTZ,
        verified_by TEXT
    )
    ",
];

const REQUEST_COLUMNS: &str = "id, subject_id, kind, status, document_type, purpose, \
     grade_level, section, rejection_reason, review_notes, reviewed_by, reviewed_at, \
     completed_at, picked_up_by, archived_at, archived_by, created_at, updated_at, version, \
     message, replies";

const ENROLLED_COUNT: &str = "SELECT COUNT(*) FROM requests \
     WHERE kind = 'enrollment' AND status = 'enrolled' AND archived_at IS NULL \
     AND section = $1 AND grade_level = $2";

/// Entity store backed by a `PostgreSQL` connection pool.
#[derive(Clone, Debug)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::Unavailable`] if no connection can be established.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, EntityStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(|e| EntityStoreError::Unavailable(e.to_string()))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns the database error if a statement fails.
    pub async fn migrate(&self) -> Result<(), EntityStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        tracing::debug!("Entity store schema is up to date");
        Ok(())
    }

    async fn stored_version(&self, id: RequestId) -> Result<Option<Version>, EntityStoreError> {
        let row = sqlx::query("SELECT version FROM requests WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(|row| row.try_get::<i64, _>("version").map_err(map_decode).and_then(version_from_db))
            .transpose()
    }

    async fn conflict_for(&self, id: RequestId, expected: Version) -> EntityStoreError {
        match self.stored_version(id).await {
            Ok(Some(actual)) => EntityStoreError::VersionConflict { expected, actual },
            Ok(None) => EntityStoreError::request_not_found(id),
            Err(error) => error,
        }
    }
}

fn map_sqlx(error: sqlx::Error) -> EntityStoreError {
    match &error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => EntityStoreError::Unavailable(error.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            EntityStoreError::Duplicate(db.message().to_string())
        },
        _ => {
            tracing::error!(error = %error, "Entity store query failed");
            EntityStoreError::Database(error.to_string())
        },
    }
}

fn map_decode(error: sqlx::Error) -> EntityStoreError {
    EntityStoreError::Serialization(error.to_string())
}

fn version_to_db(version: Version) -> Result<i64, EntityStoreError> {
    i64::try_from(version.value())
        .map_err(|_| EntityStoreError::Serialization(format!("version {version} out of range")))
}

fn version_from_db(value: i64) -> Result<Version, EntityStoreError> {
    u64::try_from(value)
        .map(Version::new)
        .map_err(|_| EntityStoreError::Serialization(format!("negative version {value}")))
}

fn request_from_row(row: &PgRow) -> Result<Request, EntityStoreError> {
    let kind: String = row.try_get("kind").map_err(map_decode)?;
    let status: String = row.try_get("status").map_err(map_decode)?;
    let grade_level: Option<String> = row.try_get("grade_level").map_err(map_decode)?;
    let reviewed_by: Option<String> = row.try_get("reviewed_by").map_err(map_decode)?;
    let reviewed_at: Option<DateTime<Utc>> = row.try_get("reviewed_at").map_err(map_decode)?;
    let archived_at: Option<DateTime<Utc>> = row.try_get("archived_at").map_err(map_decode)?;
    let archived_by: Option<String> = row.try_get("archived_by").map_err(map_decode)?;
    let Json(replies): Json<Vec<Reply>> = row.try_get("replies").map_err(map_decode)?;

    let review = match (reviewed_by, reviewed_at) {
        (Some(by), Some(at)) => Some(Review {
            notes: row.try_get("review_notes").map_err(map_decode)?,
            by: ActorId::new(by),
            at,
        }),
        _ => None,
    };
    let archive = archived_at.map(|at| ArchiveStamp {
        at,
        by: ActorId::new(archived_by.unwrap_or_default()),
    });

    Ok(Request {
        id: RequestId::from_uuid(row.try_get::<Uuid, _>("id").map_err(map_decode)?),
        subject: SubjectId::new(row.try_get::<String, _>("subject_id").map_err(map_decode)?),
        kind: kind.parse().map_err(EntityStoreError::Serialization)?,
        status: status.parse().map_err(EntityStoreError::Serialization)?,
        message: row.try_get("message").map_err(map_decode)?,
        replies,
        document_type: row.try_get("document_type").map_err(map_decode)?,
        purpose: row.try_get("purpose").map_err(map_decode)?,
        grade_level: grade_level.map(GradeLevel::from_normalized),
        section: row.try_get("section").map_err(map_decode)?,
        rejection_reason: row.try_get("rejection_reason").map_err(map_decode)?,
        review,
        completed_at: row.try_get("completed_at").map_err(map_decode)?,
        picked_up_by: row.try_get("picked_up_by").map_err(map_decode)?,
        archive,
        created_at: row.try_get("created_at").map_err(map_decode)?,
        updated_at: row.try_get("updated_at").map_err(map_decode)?,
        version: version_from_db(row.try_get("version").map_err(map_decode)?)?,
    })
}

fn section_from_row(row: &PgRow) -> Result<Section, EntityStoreError> {
    let capacity: i32 = row.try_get("capacity").map_err(map_decode)?;
    Ok(Section {
        id: SectionId::from_uuid(row.try_get::<Uuid, _>("id").map_err(map_decode)?),
        name: row.try_get("name").map_err(map_decode)?,
        grade_level: GradeLevel::from_normalized(
            row.try_get::<String, _>("grade_level").map_err(map_decode)?,
        ),
        adviser: row.try_get("adviser").map_err(map_decode)?,
        capacity: u32::try_from(capacity)
            .map_err(|_| EntityStoreError::Serialization(format!("invalid capacity {capacity}")))?,
        created_at: row.try_get("created_at").map_err(map_decode)?,
    })
}

fn token_from_row(row: &PgRow) -> Result<PickupTokenRecord, EntityStoreError> {
    let verified_by: Option<String> = row.try_get("verified_by").map_err(map_decode)?;
    Ok(PickupTokenRecord {
        request_id: RequestId::from_uuid(row.try_get::<Uuid, _>("request_id").map_err(map_decode)?),
        checksum: row.try_get("checksum").map_err(map_decode)?,
        issued_at: row.try_get("issued_at").map_err(map_decode)?,
        verified_at: row.try_get("verified_at").map_err(map_decode)?,
        verified_by: verified_by.map(ActorId::new),
    })
}

fn count_from_row(row: &PgRow) -> Result<u32, EntityStoreError> {
    let count: i64 = row.try_get(0).map_err(map_decode)?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Version-checked full-row update, shared by plain updates and assignments.
fn update_query<'q>(
    request: &'q Request,
    expected: i64,
    version: i64,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r"
        UPDATE requests SET
            status = $3, document_type = $4, purpose = $5, grade_level = $6,
            section = $7, rejection_reason = $8, review_notes = $9, reviewed_by = $10,
            reviewed_at = $11, completed_at = $12, picked_up_by = $13,
            archived_at = $14, archived_by = $15, updated_at = $16, version = $17,
            replies = $18
        WHERE id = $1 AND version = $2
        ",
    )
    .bind(request.id.as_uuid())
    .bind(expected)
    .bind(request.status.as_str())
    .bind(request.document_type.as_deref())
    .bind(request.purpose.as_deref())
    .bind(request.grade_level.as_ref().map(GradeLevel::as_str))
    .bind(request.section.as_deref())
    .bind(request.rejection_reason.as_deref())
    .bind(request.review.as_ref().and_then(|r| r.notes.as_deref()))
    .bind(request.review.as_ref().map(|r| r.by.as_str()))
    .bind(request.review.as_ref().map(|r| r.at))
    .bind(request.completed_at)
    .bind(request.picked_up_by.as_deref())
    .bind(request.archived_at())
    .bind(request.archived_by().map(ActorId::as_str))
    .bind(request.updated_at)
    .bind(version)
    .bind(Json(&request.replies))
}

impl EntityStore for PostgresEntityStore {
    fn insert_request(&self, request: Request) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let version = version_to_db(request.version)?;
            sqlx::query(&format!(
                "INSERT INTO requests ({REQUEST_COLUMNS}) VALUES \
                 ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, \
                 $20, $21)"
            ))
            .bind(request.id.as_uuid())
            .bind(request.subject.as_str())
            .bind(request.kind.as_str())
            .bind(request.status.as_str())
            .bind(request.document_type.as_deref())
            .bind(request.purpose.as_deref())
            .bind(request.grade_level.as_ref().map(GradeLevel::as_str))
            .bind(request.section.as_deref())
            .bind(request.rejection_reason.as_deref())
            .bind(request.review.as_ref().and_then(|r| r.notes.as_deref()))
            .bind(request.review.as_ref().map(|r| r.by.as_str()))
            .bind(request.review.as_ref().map(|r| r.at))
            .bind(request.completed_at)
            .bind(request.picked_up_by.as_deref())
            .bind(request.archived_at())
            .bind(request.archived_by().map(ActorId::as_str))
            .bind(request.created_at)
            .bind(request.updated_at)
            .bind(version)
            .bind(request.message.as_deref())
            .bind(Json(&request.replies))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(())
        })
    }

    fn get_request(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            row.as_ref().map(request_from_row).transpose()
        })
    }

    fn update_request(&self, expected: Version, request: Request) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = update_query(&request, version_to_db(expected)?, version_to_db(request.version)?)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(self.conflict_for(request.id, expected).await);
            }
            Ok(())
        })
    }

    fn list_requests(&self, filter: RequestFilter) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let (archived, order) = match filter.view {
                ArchiveView::Active => ("archived_at IS NULL", "created_at DESC"),
                ArchiveView::Archived => ("archived_at IS NOT NULL", "archived_at DESC"),
            };
            let rows = sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM requests \
                 WHERE kind = $1 AND ($2::TEXT IS NULL OR status = $2) AND {archived} \
                 ORDER BY {order}"
            ))
            .bind(filter.kind.as_str())
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

            rows.iter().map(request_from_row).collect()
        })
    }

    fn insert_section(&self, section: Section) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let capacity = i32::try_from(section.capacity).map_err(|_| {
                EntityStoreError::Serialization(format!("capacity {} out of range", section.capacity))
            })?;
            sqlx::query(
                "INSERT INTO sections (id, name, grade_level, adviser, capacity, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(section.id.as_uuid())
            .bind(&section.name)
            .bind(section.grade_level.as_str())
            .bind(section.adviser.as_deref())
            .bind(capacity)
            .bind(section.created_at)
            .execute(&self.pool)
            .await
            .map_err(|error| match map_sqlx(error) {
                EntityStoreError::Duplicate(_) => EntityStoreError::Duplicate(format!(
                    "section {} already exists in {}",
                    section.name, section.grade_level
                )),
                other => other,
            })?;
            Ok(())
        })
    }

    fn get_section(&self, id: SectionId) -> StoreFuture<'_, Option<Section>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM sections WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            row.as_ref().map(section_from_row).transpose()
        })
    }

    fn list_sections(&self) -> StoreFuture<'_, Vec<Section>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT * FROM sections ORDER BY grade_level, name")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
            rows.iter().map(section_from_row).collect()
        })
    }

    fn enrolled_count(&self, section_id: SectionId) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let section = self
                .get_section(section_id)
                .await?
                .ok_or_else(|| EntityStoreError::section_not_found(section_id))?;
            let row = sqlx::query(ENROLLED_COUNT)
                .bind(&section.name)
                .bind(section.grade_level.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
            count_from_row(&row)
        })
    }

    fn section_roster(&self, section_id: SectionId) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let section = self
                .get_section(section_id)
                .await?
                .ok_or_else(|| EntityStoreError::section_not_found(section_id))?;
            let rows = sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM requests \
                 WHERE kind = 'enrollment' AND status = 'enrolled' AND archived_at IS NULL \
                 AND section = $1 AND grade_level = $2 ORDER BY completed_at"
            ))
            .bind(&section.name)
            .bind(section.grade_level.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
            rows.iter().map(request_from_row).collect()
        })
    }

    fn assign_section(
        &self,
        expected: Version,
        request: Request,
        section_id: SectionId,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

            let row = sqlx::query("SELECT * FROM sections WHERE id = $1 FOR UPDATE")
                .bind(section_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx)?
                .ok_or_else(|| EntityStoreError::section_not_found(section_id))?;
            let section = section_from_row(&row)?;

            let count_row = sqlx::query(ENROLLED_COUNT)
                .bind(&section.name)
                .bind(section.grade_level.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            let enrolled = count_from_row(&count_row)?;
            if enrolled >= section.capacity {
                return Err(EntityStoreError::CapacityExceeded {
                    section: section.name,
                    capacity: section.capacity,
                    enrolled,
                });
            }

            let result = update_query(&request, version_to_db(expected)?, version_to_db(request.version)?)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            if result.rows_affected() == 0 {
                drop(tx);
                return Err(self.conflict_for(request.id, expected).await);
            }

            tx.commit().await.map_err(map_sqlx)?;
            Ok(())
        })
    }

    fn save_pickup_token(&self, record: PickupTokenRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO pickup_tokens (request_id, checksum, issued_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (request_id) DO UPDATE
                    SET checksum = EXCLUDED.checksum, issued_at = EXCLUDED.issued_at
                    WHERE pickup_tokens.verified_at IS NULL
                ",
            )
            .bind(record.request_id.as_uuid())
            .bind(&record.checksum)
            .bind(record.issued_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(EntityStoreError::AlreadyUsed(record.request_id));
            }
            Ok(())
        })
    }

    fn get_pickup_token(&self, request_id: RequestId) -> StoreFuture<'_, Option<PickupTokenRecord>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM pickup_tokens WHERE request_id = $1")
                .bind(request_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            row.as_ref().map(token_from_row).transpose()
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
            let row = sqlx::query(
                r"
                UPDATE pickup_tokens SET verified_at = $3, verified_by = $4
                WHERE request_id = $1 AND checksum = $2 AND verified_at IS NULL
                RETURNING *
                ",
            )
            .bind(request_id.as_uuid())
            .bind(&checksum)
            .bind(at)
            .bind(by.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

            if let Some(row) = row {
                return token_from_row(&row);
            }

            match self.get_pickup_token(request_id).await? {
                None => Err(EntityStoreError::NotFound {
                    resource: "Pickup token",
                    id: request_id.to_string(),
                }),
                Some(record) if record.checksum != checksum => {
                    Err(EntityStoreError::TokenMismatch(request_id))
                },
                Some(_) => Err(EntityStoreError::AlreadyUsed(request_id)),
            }
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(())
        })
    }
}
