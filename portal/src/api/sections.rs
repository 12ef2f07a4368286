//! Section endpoints.
//!
//! - POST /api/sections - Create a section
//! - GET /api/sections - List sections with enrolled counts
//! - GET /api/sections/grade/:level - Sections for a grade (`7`, `grade 7`, `Grade 7`)
//! - GET /api/sections/:id/roster - Enrolled students of a section

use super::dto::{RequestSummary, summaries};
use crate::server::state::AppState;
use crate::types::{NewSection, Section, SectionId, SectionWithCount};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use records_web::WebResult;

/// Create a section. Capacity defaults to 40.
pub async fn create_section(
    State(state): State<AppState>,
    Json(body): Json<NewSection>,
) -> WebResult<(StatusCode, Json<Section>)> {
    let section = state.services.sections.create_section(body).await?;
    Ok((StatusCode::CREATED, Json(section)))
}

/// List every section.
pub async fn list_sections(
    State(state): State<AppState>,
) -> WebResult<Json<Vec<SectionWithCount>>> {
    Ok(Json(state.services.sections.list_sections().await?))
}

/// Sections for one grade level.
pub async fn sections_for_grade(
    State(state): State<AppState>,
    Path(level): Path<String>,
) -> WebResult<Json<Vec<SectionWithCount>>> {
    Ok(Json(state.services.sections.sections_for_grade(&level).await?))
}

/// Enrolled, non-archived students of a section.
pub async fn section_roster(
    State(state): State<AppState>,
    Path(id): Path<SectionId>,
) -> WebResult<Json<Vec<RequestSummary>>> {
    let roster = state.services.sections.roster(id).await?;
    Ok(Json(summaries(roster)))
}
