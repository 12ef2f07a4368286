//! Section capacity under concurrent assignment.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{admin, approved, enrollment, harness, section};
use records_portal::{PortalError, RequestStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assignments_never_overfill_a_section() {
    const CAPACITY: u32 = 4;
    const CONTENDERS: usize = 12;

    let h = harness();
    let rizal = section(&h.services, "Rizal", "Grade 7", CAPACITY).await;

    let mut candidates = Vec::with_capacity(CONTENDERS);
    for i in 0..CONTENDERS {
        candidates.push(approved(&h.services, enrollment(&format!("2025-{i:04}"), "7")).await);
    }

    let handles: Vec<_> = candidates
        .into_iter()
        .map(|request| {
            let sections = h.services.sections.clone();
            let section_id = rizal.id;
            tokio::spawn(async move {
                sections
                    .assign_section(request.id, section_id, request.version, admin())
                    .await
            })
        })
        .collect();

    let mut enrolled = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(request) => {
                assert_eq!(request.status, RequestStatus::Enrolled);
                assert_eq!(request.section.as_deref(), Some("Rizal"));
                enrolled += 1;
            },
            Err(PortalError::CapacityExceeded { capacity, .. }) => {
                assert_eq!(capacity, CAPACITY);
                full += 1;
            },
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(enrolled, CAPACITY as usize);
    assert_eq!(full, CONTENDERS - CAPACITY as usize);

    let listed = h.services.sections.sections_for_grade("7").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].enrolled_count, CAPACITY);
    assert_eq!(
        h.services.sections.roster(rizal.id).await.unwrap().len(),
        CAPACITY as usize
    );
}

#[tokio::test]
async fn last_seat_goes_to_the_first_assignment() {
    let h = harness();
    let bonifacio = section(&h.services, "Bonifacio", "grade 7", 40).await;

    for i in 0..39 {
        let request = approved(&h.services, enrollment(&format!("2024-1{i:03}"), "Grade 7")).await;
        h.services
            .sections
            .assign_section(request.id, bonifacio.id, request.version, admin())
            .await
            .unwrap();
    }

    let submitted = h
        .services
        .lifecycle
        .submit(enrollment("2024-2000", "7"))
        .await
        .unwrap();
    assert_eq!(submitted.grade_level.as_ref().unwrap().as_str(), "Grade 7");
    let last = h
        .services
        .lifecycle
        .approve(submitted.id, submitted.version, admin(), None)
        .await
        .unwrap();

    let enrolled = h
        .services
        .sections
        .assign_section(last.id, bonifacio.id, last.version, admin())
        .await
        .unwrap();
    assert_eq!(enrolled.status, RequestStatus::Enrolled);

    let counts = h.services.sections.sections_for_grade("Grade 7").await.unwrap();
    assert_eq!(counts[0].enrolled_count, 40);
    assert_eq!(counts[0].remaining(), 0);

    let late = approved(&h.services, enrollment("2024-2001", "7")).await;
    let refused = h
        .services
        .sections
        .assign_section(late.id, bonifacio.id, late.version, admin())
        .await;
    assert!(matches!(
        refused,
        Err(PortalError::CapacityExceeded { capacity: 40, enrolled: 40, .. })
    ));

    let untouched = h.services.lifecycle.get(late.id).await.unwrap();
    assert_eq!(untouched, late);
}

#[tokio::test]
async fn section_must_match_the_enrollment_grade() {
    let h = harness();
    let grade8 = section(&h.services, "Mabini", "8", 40).await;
    let request = approved(&h.services, enrollment("2024-3000", "7")).await;

    let result = h
        .services
        .sections
        .assign_section(request.id, grade8.id, request.version, admin())
        .await;
    assert!(matches!(result, Err(PortalError::Validation(_))));
    assert_eq!(h.services.sections.roster(grade8.id).await.unwrap().len(), 0);
}

#[tokio::test]
async fn pending_enrollments_cannot_take_a_seat() {
    let h = harness();
    let grade7 = section(&h.services, "Luna", "7", 40).await;
    let pending = h
        .services
        .lifecycle
        .submit(enrollment("2024-4000", "7"))
        .await
        .unwrap();

    let result = h
        .services
        .sections
        .assign_section(pending.id, grade7.id, pending.version, admin())
        .await;
    assert!(matches!(result, Err(PortalError::InvalidTransition(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_assignments_of_one_enrollment_commit_once() {
    let h = harness();
    let request = approved(&h.services, enrollment("2024-5000", "7")).await;
    let mut section_ids = Vec::new();
    for name in ["Aguinaldo", "Del Pilar", "Silang"] {
        section_ids.push(section(&h.services, name, "7", 40).await.id);
    }

    let handles: Vec<_> = section_ids
        .into_iter()
        .map(|section_id| {
            let sections = h.services.sections.clone();
            let (id, version) = (request.id, request.version);
            tokio::spawn(async move {
                sections
                    .assign_section(id, section_id, version, admin())
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(PortalError::VersionConflict { .. } | PortalError::InvalidTransition(_)) => {},
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(committed, 1);

    let sections = h.services.sections.list_sections().await.unwrap();
    let seats: u32 = sections.iter().map(|s| s.enrolled_count).sum();
    assert_eq!(seats, 1);
}

#[tokio::test]
async fn section_names_are_unique_per_grade() {
    let h = harness();
    section(&h.services, "Rizal", "7", 40).await;
    section(&h.services, "Rizal", "8", 40).await;

    let duplicate = h
        .services
        .sections
        .create_section(records_portal::NewSection {
            name: "Rizal".to_string(),
            grade_level: "Grade 7".to_string(),
            adviser: None,
            capacity: None,
        })
        .await;
    assert!(matches!(duplicate, Err(PortalError::Validation(_))));

    let zero = h
        .services
        .sections
        .create_section(records_portal::NewSection {
            name: "Jacinto".to_string(),
            grade_level: "7".to_string(),
            adviser: None,
            capacity: Some(0),
        })
        .await;
    assert!(matches!(zero, Err(PortalError::Validation(_))));
}

#[tokio::test]
async fn restored_enrollment_needs_a_free_seat() {
    let h = harness();
    let bonifacio = section(&h.services, "Bonifacio", "7", 1).await;

    let first = approved(&h.services, enrollment("2024-6000", "7")).await;
    let first = h
        .services
        .sections
        .assign_section(first.id, bonifacio.id, first.version, admin())
        .await
        .unwrap();
    h.services.archive.archive(first.id, admin()).await.unwrap();

    let second = approved(&h.services, enrollment("2024-6001", "7")).await;
    h.services
        .sections
        .assign_section(second.id, bonifacio.id, second.version, admin())
        .await
        .unwrap();

    let restored = h.services.archive.restore(first.id).await;
    assert!(matches!(
        restored,
        Err(PortalError::CapacityExceeded { capacity: 1, enrolled: 1, .. })
    ));
    assert!(h.services.lifecycle.get(first.id).await.unwrap().is_archived());
    let roster = h.services.sections.roster(bonifacio.id).await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].id, second.id);

    h.services.archive.archive(second.id, admin()).await.unwrap();
    let back = h.services.archive.restore(first.id).await.unwrap();
    assert!(!back.is_archived());
    assert_eq!(back.status, RequestStatus::Enrolled);
    assert_eq!(h.services.sections.roster(bonifacio.id).await.unwrap().len(), 1);
}
