// src/services/reset_service.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        account::{Account, Role},
        reset::{ConsentStatus, ResetRequest, ResetStatus, ResetSummary},
    },
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// The destructive reset unlocks only when a round exists and every homeroom teacher approved.
pub fn is_reset_enabled(consents: &[ResetRequest]) -> bool {
    !consents.is_empty() && consents.iter().all(|c| c.status == ConsentStatus::Approved)
}

pub async fn list_consents(db_pool: &SqlitePool) -> AppResult<Vec<ResetRequest>> {
    let consents = sqlx::query_as::<_, ResetRequest>(
        r#"
        SELECT r.id, r.teacher_id, a.name AS teacher_name, r.requested_by, r.status,
               r.created_at, r.responded_at
        FROM reset_requests r
        JOIN accounts a ON a.id = r.teacher_id
        ORDER BY a.name ASC
        "#,
    )
    .fetch_all(db_pool)
    .await?;
    Ok(consents)
}

pub async fn status(db_pool: &SqlitePool) -> AppResult<ResetStatus> {
    let consents = list_consents(db_pool).await?;
    let enabled = is_reset_enabled(&consents);
    Ok(ResetStatus { consents, enabled })
}

/// Starts a new round: one pending consent per active homeroom teacher.
pub async fn initiate(db_pool: &SqlitePool, admin: &Account) -> AppResult<ResetStatus> {
    let mut tx = db_pool.begin().await?;
    sqlx::query("DELETE FROM reset_requests").execute(&mut *tx).await?;

    let teacher_ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM accounts WHERE role = 'homeroom_teacher' AND status = 'active'",
    )
    .fetch_all(&mut *tx)
    .await?;

    let now = Utc::now();
    for teacher_id in &teacher_ids {
        sqlx::query(
            r#"
            INSERT INTO reset_requests (id, teacher_id, requested_by, status, created_at)
            VALUES (?1, ?2, ?3, 'pending', ?4)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(teacher_id)
        .bind(&admin.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!("🔁 Reset round started by {} ({} consents requested).", admin.name, teacher_ids.len());
    status(db_pool).await
}

pub async fn respond(db_pool: &SqlitePool, teacher: &Account, approve: bool) -> AppResult<ResetStatus> {
    if teacher.role != Role::HomeroomTeacher {
        return Err(AppError::Forbidden("담임교사만 초기화에 동의할 수 있습니다.".to_string()));
    }
    let decision = if approve { ConsentStatus::Approved } else { ConsentStatus::Rejected };

    let rows = sqlx::query("UPDATE reset_requests SET status = ?1, responded_at = ?2 WHERE teacher_id = ?3")
        .bind(decision)
        .bind(Utc::now())
        .bind(&teacher.id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if rows == 0 {
        return Err(AppError::NotFound("진행 중인 초기화 요청이 없습니다.".to_string()));
    }

    tracing::info!("Reset consent from {}: {:?}", teacher.name, decision);
    status(db_pool).await
}

/// Wipes merit data for a new term. Refused unless every consent is approved.
pub async fn execute(db_pool: &SqlitePool, admin: &Account, include_students: bool) -> AppResult<ResetSummary> {
    if !admin.is_admin() {
        return Err(AppError::Forbidden("관리자만 초기화할 수 있습니다.".to_string()));
    }
    let mut tx = db_pool.begin().await?;
    // First statement is a write, so the consent check and the wipe share one write lock.
    let consents_cleared = sqlx::query(
        r#"
        DELETE FROM reset_requests
        WHERE EXISTS (SELECT 1 FROM reset_requests)
          AND NOT EXISTS (SELECT 1 FROM reset_requests WHERE status != 'approved')
        "#,
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if consents_cleared == 0 {
        tracing::warn!("Reset refused: consents incomplete.");
        return Err(AppError::Conflict(
            "모든 담임교사의 동의가 필요합니다.".to_string(),
        ));
    }

    let records_deleted = sqlx::query("DELETE FROM merit_records").execute(&mut *tx).await?.rows_affected();
    let requests_deleted = sqlx::query("DELETE FROM merit_requests").execute(&mut *tx).await?.rows_affected();
    sqlx::query("UPDATE accounts SET cumulative_score = 0, updated_at = ?1 WHERE role = 'student'")
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    let students_deleted = if include_students {
        sqlx::query("DELETE FROM accounts WHERE role = 'student'")
            .execute(&mut *tx)
            .await?
            .rows_affected()
    } else {
        0
    };
    tx.commit().await?;

    tracing::warn!(
        "💥 Data reset by {}: {} records, {} requests, {} students removed.",
        admin.name,
        records_deleted,
        requests_deleted,
        students_deleted
    );
    Ok(ResetSummary {
        records_deleted,
        requests_deleted,
        students_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        models::merit::MeritKind,
        services::{account_service, account_service::tests as fixtures, merit_service},
    };

    #[tokio::test]
    async fn reset_requires_every_homeroom_consent() {
        let pool = db::test_pool().await;
        let admin = fixtures::admin(&pool).await;
        let a = fixtures::teacher(&pool, "a@school.kr", Role::HomeroomTeacher).await;
        let b = fixtures::teacher(&pool, "b@school.kr", Role::HomeroomTeacher).await;
        fixtures::teacher(&pool, "sub@school.kr", Role::SubjectTeacher).await;
        let kid = fixtures::student(&pool, "10101", 1, 1, 1).await;
        merit_service::award(&pool, &admin, &kid.id, MeritKind::Merit, 2, "선행").await.unwrap();

        assert!(matches!(execute(&pool, &admin, false).await, Err(AppError::Conflict(_))));

        let round = initiate(&pool, &admin).await.unwrap();
        assert_eq!(round.consents.len(), 2);
        assert!(!round.enabled);

        let after_a = respond(&pool, &a, true).await.unwrap();
        assert!(!after_a.enabled);
        assert!(matches!(execute(&pool, &admin, false).await, Err(AppError::Conflict(_))));

        let after_b_reject = respond(&pool, &b, false).await.unwrap();
        assert!(!after_b_reject.enabled);

        let after_b = respond(&pool, &b, true).await.unwrap();
        assert!(after_b.enabled);

        let summary = execute(&pool, &admin, false).await.unwrap();
        assert_eq!(summary.records_deleted, 1);
        assert_eq!(summary.students_deleted, 0);

        let kid = account_service::find_by_id(&pool, &kid.id).await.unwrap().unwrap();
        assert_eq!(kid.cumulative_score, 0);
        assert!(status(&pool).await.unwrap().consents.is_empty());
    }

    #[tokio::test]
    async fn withdrawn_consent_blocks_reset_and_keeps_the_round() {
        let pool = db::test_pool().await;
        let admin = fixtures::admin(&pool).await;
        let a = fixtures::teacher(&pool, "a@school.kr", Role::HomeroomTeacher).await;
        let b = fixtures::teacher(&pool, "b@school.kr", Role::HomeroomTeacher).await;
        let kid = fixtures::student(&pool, "10101", 1, 1, 1).await;
        merit_service::award(&pool, &admin, &kid.id, MeritKind::Merit, 2, "선행").await.unwrap();

        initiate(&pool, &admin).await.unwrap();
        respond(&pool, &a, true).await.unwrap();
        assert!(respond(&pool, &b, true).await.unwrap().enabled);
        respond(&pool, &b, false).await.unwrap();

        assert!(matches!(execute(&pool, &admin, true).await, Err(AppError::Conflict(_))));

        let round = status(&pool).await.unwrap();
        assert_eq!(round.consents.len(), 2);
        assert!(!round.enabled);
        assert_eq!(merit_service::records_of_student(&pool, &kid.id).await.unwrap().len(), 1);
        assert!(account_service::find_by_id(&pool, &kid.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn new_school_year_reset_removes_students() {
        let pool = db::test_pool().await;
        let admin = fixtures::admin(&pool).await;
        let hr = fixtures::teacher(&pool, "hr@school.kr", Role::HomeroomTeacher).await;
        let sub = fixtures::teacher(&pool, "sub@school.kr", Role::SubjectTeacher).await;
        let first = fixtures::student(&pool, "10101", 1, 1, 1).await;
        let second = fixtures::student(&pool, "10102", 1, 1, 2).await;
        fixtures::student(&pool, "10103", 1, 1, 3).await;

        merit_service::award(&pool, &admin, &first.id, MeritKind::Merit, 3, "봉사 활동").await.unwrap();
        merit_service::award(&pool, &sub, &second.id, MeritKind::Demerit, 1, "지각").await.unwrap();

        initiate(&pool, &admin).await.unwrap();
        respond(&pool, &hr, true).await.unwrap();

        let summary = execute(&pool, &admin, true).await.unwrap();
        assert_eq!(summary.records_deleted, 1);
        assert_eq!(summary.requests_deleted, 1);
        assert_eq!(summary.students_deleted, 3);

        assert!(account_service::list_students(&pool, None, None).await.unwrap().is_empty());
        // Staff accounts stay.
        assert!(account_service::find_by_id(&pool, &hr.id).await.unwrap().is_some());
        assert!(account_service::find_by_id(&pool, &admin.id).await.unwrap().is_some());
        assert!(status(&pool).await.unwrap().consents.is_empty());
    }

    #[tokio::test]
    async fn only_homeroom_teachers_in_the_round_can_respond() {
        let pool = db::test_pool().await;
        let sub = fixtures::teacher(&pool, "sub@school.kr", Role::SubjectTeacher).await;
        let hr = fixtures::teacher(&pool, "hr@school.kr", Role::HomeroomTeacher).await;

        assert!(matches!(respond(&pool, &sub, true).await, Err(AppError::Forbidden(_))));
        assert!(matches!(respond(&pool, &hr, true).await, Err(AppError::NotFound(_))));
    }

    #[test]
    fn empty_round_is_not_enabled() {
        assert!(!is_reset_enabled(&[]));
    }
}
