// src/services/merit_service.rs
//! Merit/demerit awards and the request → approval workflow.
//!
//! Every write that can change a student's score recomputes `cumulative_score`
//! from `merit_records` inside the same transaction; nothing else writes it.
use crate::{
    error::{AppError, AppResult},
    models::{
        account::{Account, Role},
        merit::{
            AwardOutcome, MeritKind, MeritReason, MeritRecord, MeritRequest, RecordWithStudent,
            RequestStatus, ScoreSummary, MAX_POINTS,
        },
    },
    services::{account_service, class_service},
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardRoute {
    /// Written as a record right away.
    Direct,
    /// Queued as a pending request for the homeroom teacher.
    Request,
}

/// Who may apply points directly: admins, and the homeroom teacher of the student.
pub fn route_award(actor_role: Role, is_homeroom_of_student: bool) -> AppResult<AwardRoute> {
    match actor_role {
        Role::SuperAdmin => Ok(AwardRoute::Direct),
        Role::HomeroomTeacher if is_homeroom_of_student => Ok(AwardRoute::Direct),
        Role::HomeroomTeacher | Role::SubjectTeacher => Ok(AwardRoute::Request),
        Role::Student => Err(AppError::Forbidden("학생은 상벌점을 부여할 수 없습니다.".to_string())),
    }
}

/// Returns the signed point value to store.
pub fn validate_award(kind: MeritKind, magnitude: i64, reason: &str) -> AppResult<i64> {
    if !(1..=MAX_POINTS).contains(&magnitude) {
        return Err(AppError::Validation(format!(
            "점수는 1점 이상 {}점 이하로 입력해 주세요.",
            MAX_POINTS
        )));
    }
    if reason.trim().is_empty() {
        return Err(AppError::Validation("사유를 입력해 주세요.".to_string()));
    }
    Ok(kind.signed(magnitude))
}

pub fn cumulative_score(records: &[MeritRecord]) -> i64 {
    records.iter().map(|r| r.points).sum()
}

pub fn summarize(records: &[MeritRecord]) -> ScoreSummary {
    let (merit_total, demerit_total) = records.iter().fold((0, 0), |(merit, demerit), r| {
        if r.points >= 0 {
            (merit + r.points, demerit)
        } else {
            (merit, demerit - r.points)
        }
    });
    ScoreSummary {
        merit_total,
        demerit_total,
        net: cumulative_score(records),
    }
}

/// Derives the score from the record set and stores it on the account.
pub async fn recompute_score(conn: &mut SqliteConnection, student_id: &str) -> AppResult<i64> {
    let score: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(points), 0) FROM merit_records WHERE student_id = ?1")
        .bind(student_id)
        .fetch_one(&mut *conn)
        .await?;

    sqlx::query("UPDATE accounts SET cumulative_score = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(score)
        .bind(Utc::now())
        .bind(student_id)
        .execute(&mut *conn)
        .await?;

    tracing::debug!("Cumulative score of {} recomputed: {}", student_id, score);
    Ok(score)
}

struct NewRecord<'a> {
    student_id: &'a str,
    kind: MeritKind,
    points: i64,
    reason: &'a str,
    created_by: &'a str,
    created_by_name: &'a str,
    processed_by: &'a str,
    request_id: Option<&'a str>,
}

async fn insert_record(conn: &mut SqliteConnection, new: NewRecord<'_>) -> AppResult<MeritRecord> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO merit_records (id, student_id, kind, points, reason, created_by, created_by_name,
                                   processed_by, request_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&id)
    .bind(new.student_id)
    .bind(new.kind)
    .bind(new.points)
    .bind(new.reason.trim())
    .bind(new.created_by)
    .bind(new.created_by_name)
    .bind(new.processed_by)
    .bind(new.request_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::from_unique(e, "이미 처리된 요청입니다."))?;

    let record = sqlx::query_as::<_, MeritRecord>("SELECT * FROM merit_records WHERE id = ?1")
        .bind(&id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(record)
}

/// Applies points directly or files a request, depending on who is asking.
pub async fn award(
    db_pool: &SqlitePool,
    actor: &Account,
    student_id: &str,
    kind: MeritKind,
    magnitude: i64,
    reason: &str,
) -> AppResult<AwardOutcome> {
    let points = validate_award(kind, magnitude, reason)?;
    let student = account_service::find_student(db_pool, student_id).await?;
    let is_homeroom = actor.role == Role::HomeroomTeacher
        && class_service::is_homeroom_of(db_pool, &actor.id, &student).await?;

    match route_award(actor.role, is_homeroom)? {
        AwardRoute::Direct => {
            let mut tx = db_pool.begin().await?;
            let record = insert_record(
                &mut *tx,
                NewRecord {
                    student_id: &student.id,
                    kind,
                    points,
                    reason,
                    created_by: &actor.id,
                    created_by_name: &actor.name,
                    processed_by: &actor.id,
                    request_id: None,
                },
            )
            .await?;
            let cumulative_score = recompute_score(&mut *tx, &student.id).await?;
            tx.commit().await?;

            tracing::info!(
                "✅ {} {} point(s) to {} by {} (score now {}).",
                kind.label(),
                points,
                student.name,
                actor.name,
                cumulative_score
            );
            Ok(AwardOutcome::Recorded { record, cumulative_score })
        }
        AwardRoute::Request => {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO merit_requests (id, student_id, requester_id, requester_name, kind, points,
                                            reason, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)
                "#,
            )
            .bind(&id)
            .bind(&student.id)
            .bind(&actor.id)
            .bind(&actor.name)
            .bind(kind)
            .bind(points)
            .bind(reason.trim())
            .bind(Utc::now())
            .execute(db_pool)
            .await?;

            tracing::info!("📨 {} requested {} {} for {}.", actor.name, kind.label(), points, student.name);
            Ok(AwardOutcome::Requested {
                request: find_request(db_pool, &id).await?,
            })
        }
    }
}

pub async fn find_request(db_pool: &SqlitePool, request_id: &str) -> AppResult<MeritRequest> {
    sqlx::query_as::<_, MeritRequest>("SELECT * FROM merit_requests WHERE id = ?1")
        .bind(request_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("요청을 찾을 수 없습니다.".to_string()))
}

/// Loads a pending request and checks the approver owns the student.
async fn decidable_request(db_pool: &SqlitePool, approver: &Account, request_id: &str) -> AppResult<MeritRequest> {
    let request = find_request(db_pool, request_id).await?;
    if request.status != RequestStatus::Pending {
        return Err(AppError::Conflict("이미 처리된 요청입니다.".to_string()));
    }
    if approver.is_admin() {
        return Ok(request);
    }
    let student = account_service::find_student(db_pool, &request.student_id).await?;
    if approver.role == Role::HomeroomTeacher && class_service::is_homeroom_of(db_pool, &approver.id, &student).await? {
        Ok(request)
    } else {
        tracing::warn!("{} tried to decide request {} for a student outside their class", approver.name, request_id);
        Err(AppError::Forbidden("담임 학생의 요청만 처리할 수 있습니다.".to_string()))
    }
}

/// Approves a pending request: exactly one record, same signed points, score recomputed.
pub async fn approve_request(
    db_pool: &SqlitePool,
    approver: &Account,
    request_id: &str,
) -> AppResult<(MeritRecord, i64)> {
    let request = decidable_request(db_pool, approver, request_id).await?;

    let mut tx = db_pool.begin().await?;
    let updated = sqlx::query(
        r#"
        UPDATE merit_requests
        SET status = 'approved', processed_by = ?1, processed_at = ?2
        WHERE id = ?3 AND status = 'pending'
        "#,
    )
    .bind(&approver.id)
    .bind(Utc::now())
    .bind(request_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if updated == 0 {
        return Err(AppError::Conflict("이미 처리된 요청입니다.".to_string()));
    }

    let record = insert_record(
        &mut *tx,
        NewRecord {
            student_id: &request.student_id,
            kind: request.kind,
            points: request.points,
            reason: &request.reason,
            created_by: &request.requester_id,
            created_by_name: &request.requester_name,
            processed_by: &approver.id,
            request_id: Some(&request.id),
        },
    )
    .await?;
    let score = recompute_score(&mut *tx, &request.student_id).await?;
    tx.commit().await?;

    tracing::info!("✅ Request {} approved by {} (score now {}).", request_id, approver.name, score);
    Ok((record, score))
}

pub async fn reject_request(
    db_pool: &SqlitePool,
    approver: &Account,
    request_id: &str,
    reason: Option<&str>,
) -> AppResult<MeritRequest> {
    decidable_request(db_pool, approver, request_id).await?;
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());

    let updated = sqlx::query(
        r#"
        UPDATE merit_requests
        SET status = 'rejected', processed_by = ?1, processed_at = ?2, reject_reason = ?3
        WHERE id = ?4 AND status = 'pending'
        "#,
    )
    .bind(&approver.id)
    .bind(Utc::now())
    .bind(reason)
    .bind(request_id)
    .execute(db_pool)
    .await?
    .rows_affected();
    if updated == 0 {
        return Err(AppError::Conflict("이미 처리된 요청입니다.".to_string()));
    }

    tracing::info!("❌ Request {} rejected by {}.", request_id, approver.name);
    find_request(db_pool, request_id).await
}

/// Pending requests an approver can act on: all for admins, own class for homeroom teachers.
pub async fn pending_requests_for(db_pool: &SqlitePool, approver: &Account) -> AppResult<Vec<MeritRequest>> {
    let requests = match approver.role {
        Role::SuperAdmin => {
            sqlx::query_as::<_, MeritRequest>(
                "SELECT * FROM merit_requests WHERE status = 'pending' ORDER BY created_at ASC",
            )
            .fetch_all(db_pool)
            .await?
        }
        Role::HomeroomTeacher => {
            sqlx::query_as::<_, MeritRequest>(
                r#"
                SELECT r.* FROM merit_requests r
                JOIN accounts s ON s.id = r.student_id
                JOIN classes c ON c.grade = s.grade AND c.class_number = s.class_number
                WHERE r.status = 'pending' AND c.homeroom_teacher_id = ?1
                ORDER BY r.created_at ASC
                "#,
            )
            .bind(&approver.id)
            .fetch_all(db_pool)
            .await?
        }
        _ => Vec::new(),
    };
    Ok(requests)
}

pub async fn requests_by(db_pool: &SqlitePool, requester_id: &str) -> AppResult<Vec<MeritRequest>> {
    let requests = sqlx::query_as::<_, MeritRequest>(
        "SELECT * FROM merit_requests WHERE requester_id = ?1 ORDER BY created_at DESC",
    )
    .bind(requester_id)
    .fetch_all(db_pool)
    .await?;
    Ok(requests)
}

pub async fn records_of_student(db_pool: &SqlitePool, student_id: &str) -> AppResult<Vec<MeritRecord>> {
    let records = sqlx::query_as::<_, MeritRecord>(
        "SELECT * FROM merit_records WHERE student_id = ?1 ORDER BY created_at DESC",
    )
    .bind(student_id)
    .fetch_all(db_pool)
    .await?;
    Ok(records)
}

/// Records joined with student names, optionally limited to one class.
pub async fn records_with_students(
    db_pool: &SqlitePool,
    grade: Option<i64>,
    class_number: Option<i64>,
) -> AppResult<Vec<RecordWithStudent>> {
    let records = sqlx::query_as::<_, RecordWithStudent>(
        r#"
        SELECT m.id, m.student_id, s.student_code, s.name AS student_name, m.kind, m.points,
               m.reason, m.created_by_name, p.name AS processed_by_name, m.created_at
        FROM merit_records m
        JOIN accounts s ON s.id = m.student_id
        LEFT JOIN accounts p ON p.id = m.processed_by
        WHERE (?1 IS NULL OR s.grade = ?1) AND (?2 IS NULL OR s.class_number = ?2)
        ORDER BY m.created_at DESC
        "#,
    )
    .bind(grade)
    .bind(class_number)
    .fetch_all(db_pool)
    .await?;
    Ok(records)
}

/// Admin correction. Returns the student's recomputed score.
pub async fn delete_record(db_pool: &SqlitePool, record_id: &str) -> AppResult<(MeritRecord, i64)> {
    let mut tx = db_pool.begin().await?;
    let record = sqlx::query_as::<_, MeritRecord>("SELECT * FROM merit_records WHERE id = ?1")
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("기록을 찾을 수 없습니다.".to_string()))?;

    sqlx::query("DELETE FROM merit_records WHERE id = ?1")
        .bind(record_id)
        .execute(&mut *tx)
        .await?;
    let score = recompute_score(&mut *tx, &record.student_id).await?;
    tx.commit().await?;

    tracing::info!("🗑️ Record {} deleted (score of {} now {}).", record_id, record.student_id, score);
    Ok((record, score))
}

pub async fn list_reasons(db_pool: &SqlitePool) -> AppResult<Vec<MeritReason>> {
    let reasons = sqlx::query_as::<_, MeritReason>("SELECT * FROM merit_reasons ORDER BY kind ASC, reason ASC")
        .fetch_all(db_pool)
        .await?;
    Ok(reasons)
}

pub async fn create_reason(
    db_pool: &SqlitePool,
    kind: MeritKind,
    reason: &str,
    default_points: i64,
) -> AppResult<MeritReason> {
    validate_award(kind, default_points, reason)?;
    let id = sqlx::query("INSERT INTO merit_reasons (kind, reason, default_points) VALUES (?1, ?2, ?3)")
        .bind(kind)
        .bind(reason.trim())
        .bind(default_points)
        .execute(db_pool)
        .await
        .map_err(|e| AppError::from_unique(e, "이미 등록된 사유입니다."))?
        .last_insert_rowid();

    let created = sqlx::query_as::<_, MeritReason>("SELECT * FROM merit_reasons WHERE id = ?1")
        .bind(id)
        .fetch_one(db_pool)
        .await?;
    Ok(created)
}

pub async fn delete_reason(db_pool: &SqlitePool, reason_id: i64) -> AppResult<()> {
    let rows = sqlx::query("DELETE FROM merit_reasons WHERE id = ?1")
        .bind(reason_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if rows == 0 {
        return Err(AppError::NotFound("사유를 찾을 수 없습니다.".to_string()));
    }
    Ok(())
}
