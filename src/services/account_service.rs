// src/services/account_service.rs
use crate::{
    config::BootstrapAdmin,
    error::{AppError, AppResult},
    models::account::{Account, AccountStatus, ImportSummary, Role, StudentRow},
    services::auth_service,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Input for a teacher account, from self sign-up or the admin console.
#[derive(Debug, Clone)]
pub struct NewTeacher {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub subject: Option<String>,
}

pub async fn find_by_id(db_pool: &SqlitePool, account_id: &str) -> AppResult<Option<Account>> {
    tracing::debug!("Looking up account by id: {}", account_id);
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?1")
        .bind(account_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(account)
}

/// Login ids compare case-insensitively (the column is `COLLATE NOCASE`).
pub async fn find_by_login_id(db_pool: &SqlitePool, login_id: &str) -> AppResult<Option<Account>> {
    tracing::debug!("Looking up account by login id: {}", login_id);
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE login_id = ?1")
        .bind(login_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(account)
}

pub async fn find_student(db_pool: &SqlitePool, student_id: &str) -> AppResult<Account> {
    match find_by_id(db_pool, student_id).await? {
        Some(account) if account.role == Role::Student => Ok(account),
        _ => Err(AppError::NotFound("학생을 찾을 수 없습니다.".to_string())),
    }
}

pub async fn list_teachers(db_pool: &SqlitePool) -> AppResult<Vec<Account>> {
    let teachers = sqlx::query_as::<_, Account>(
        r#"
        SELECT * FROM accounts
        WHERE role IN ('homeroom_teacher', 'subject_teacher')
        ORDER BY status ASC, name ASC
        "#,
    )
    .fetch_all(db_pool)
    .await?;
    tracing::debug!("Found {} teachers.", teachers.len());
    Ok(teachers)
}

/// Students ordered by grade, class and number, optionally narrowed to one grade / class.
pub async fn list_students(
    db_pool: &SqlitePool,
    grade: Option<i64>,
    class_number: Option<i64>,
) -> AppResult<Vec<Account>> {
    let students = sqlx::query_as::<_, Account>(
        r#"
        SELECT * FROM accounts
        WHERE role = 'student'
          AND (?1 IS NULL OR grade = ?1)
          AND (?2 IS NULL OR class_number = ?2)
        ORDER BY grade ASC, class_number ASC, student_number ASC
        "#,
    )
    .bind(grade)
    .bind(class_number)
    .fetch_all(db_pool)
    .await?;
    Ok(students)
}

pub async fn register_teacher(
    db_pool: &SqlitePool,
    teacher: NewTeacher,
    status: AccountStatus,
) -> AppResult<Account> {
    if !teacher.role.is_teacher() {
        return Err(AppError::Validation("교사 계정 유형을 선택해 주세요.".to_string()));
    }
    let email = teacher.email.trim().to_lowercase();
    if !email.contains('@') || teacher.name.trim().is_empty() {
        return Err(AppError::Validation("이메일과 이름을 확인해 주세요.".to_string()));
    }
    auth_service::validate_new_password(&teacher.password)?;

    let password_hash = auth_service::hash_password(&teacher.password).await?;
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let subject = teacher
        .subject
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    sqlx::query(
        r#"
        INSERT INTO accounts (id, login_id, password_hash, name, role, status, email, subject, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?2, ?7, ?8, ?8)
        "#,
    )
    .bind(&id)
    .bind(&email)
    .bind(&password_hash)
    .bind(teacher.name.trim())
    .bind(teacher.role)
    .bind(status)
    .bind(&subject)
    .bind(now)
    .execute(db_pool)
    .await
    .map_err(|e| AppError::from_unique(e, "이미 등록된 이메일입니다."))?;

    tracing::info!("✅ Teacher account '{}' created ({:?}).", email, status);
    find_by_id(db_pool, &id).await?.ok_or(AppError::InternalServerError)
}

/// Admin-created teachers skip the approval queue.
pub async fn create_teacher(db_pool: &SqlitePool, teacher: NewTeacher) -> AppResult<Account> {
    register_teacher(db_pool, teacher, AccountStatus::Active).await
}

/// Approves, deactivates or reactivates a teacher account.
pub async fn set_status(
    db_pool: &SqlitePool,
    account_id: &str,
    status: AccountStatus,
) -> AppResult<Account> {
    let account = find_by_id(db_pool, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("계정을 찾을 수 없습니다.".to_string()))?;
    if !account.role.is_teacher() {
        return Err(AppError::Validation(
            "교사 계정만 상태를 변경할 수 있습니다.".to_string(),
        ));
    }

    sqlx::query("UPDATE accounts SET status = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(status)
        .bind(Utc::now())
        .bind(account_id)
        .execute(db_pool)
        .await?;

    tracing::info!("Account '{}' status -> {:?}", account.login_id, status);
    find_by_id(db_pool, account_id).await?.ok_or(AppError::InternalServerError)
}

pub async fn change_password(
    db_pool: &SqlitePool,
    account_id: &str,
    current_password: &str,
    new_password: &str,
) -> AppResult<()> {
    let account = find_by_id(db_pool, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("계정을 찾을 수 없습니다.".to_string()))?;
    if !auth_service::verify_password(current_password, &account.password_hash).await? {
        return Err(AppError::InvalidCredentials);
    }
    reset_password(db_pool, account_id, new_password).await
}

/// Sets a new password without checking the old one (admin action).
pub async fn reset_password(db_pool: &SqlitePool, account_id: &str, new_password: &str) -> AppResult<()> {
    auth_service::validate_new_password(new_password)?;
    let new_hash = auth_service::hash_password(new_password).await?;

    let rows_affected = sqlx::query("UPDATE accounts SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(&new_hash)
        .bind(Utc::now())
        .bind(account_id)
        .execute(db_pool)
        .await?
        .rows_affected();

    if rows_affected == 0 {
        tracing::warn!("Password change failed: account '{}' not found.", account_id);
        return Err(AppError::NotFound("계정을 찾을 수 없습니다.".to_string()));
    }
    tracing::info!("✅ Password updated for account {}", account_id);
    Ok(())
}

/// Deletes a teacher or student. Records and requests of a student cascade.
pub async fn delete_account(db_pool: &SqlitePool, account_id: &str) -> AppResult<Account> {
    let account = find_by_id(db_pool, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("계정을 찾을 수 없습니다.".to_string()))?;
    if account.is_admin() {
        return Err(AppError::Forbidden("관리자 계정은 삭제할 수 없습니다.".to_string()));
    }

    sqlx::query("DELETE FROM accounts WHERE id = ?1")
        .bind(account_id)
        .execute(db_pool)
        .await?;
    tracing::info!("🗑️ Account '{}' deleted.", account.login_id);
    Ok(account)
}

/// Creates the configured super admin when the database has none yet.
pub async fn ensure_bootstrap_admin(db_pool: &SqlitePool, admin: &BootstrapAdmin) -> AppResult<bool> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE role = 'super_admin'")
        .fetch_one(db_pool)
        .await?;
    if existing > 0 {
        return Ok(false);
    }

    let password_hash = auth_service::hash_password(&admin.password).await?;
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO accounts (id, login_id, password_hash, name, role, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 'super_admin', 'active', ?5, ?5)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&admin.login_id)
    .bind(&password_hash)
    .bind(&admin.name)
    .bind(now)
    .execute(db_pool)
    .await?;

    tracing::info!("👤 Bootstrap super admin '{}' created.", admin.login_id);
    Ok(true)
}

/// First password of an imported student: YYMMDD of the birth date, else the 학번.
pub fn initial_student_password(row: &StudentRow) -> String {
    let digits: String = row
        .birth_date
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    match digits.len() {
        8 => digits[2..].to_string(),
        6 => digits,
        _ => row.student_code.clone(),
    }
}

/// Hashes the first password of every row whose 학번 is not registered yet.
/// Runs outside any transaction; the hashes are computed concurrently on the blocking pool.
async fn hash_new_student_passwords(
    db_pool: &SqlitePool,
    rows: &[StudentRow],
) -> AppResult<HashMap<String, String>> {
    let existing: HashSet<String> =
        sqlx::query_scalar("SELECT student_code FROM accounts WHERE student_code IS NOT NULL")
            .fetch_all(db_pool)
            .await?
            .into_iter()
            .collect();

    let mut jobs = JoinSet::new();
    let mut queued = HashSet::new();
    for row in rows {
        if existing.contains(&row.student_code) || !queued.insert(row.student_code.clone()) {
            continue;
        }
        let code = row.student_code.clone();
        let password = initial_student_password(row);
        jobs.spawn(async move { (code, auth_service::hash_password(&password).await) });
    }

    let mut hashes = HashMap::with_capacity(queued.len());
    while let Some(joined) = jobs.join_next().await {
        let (code, hash) = joined.map_err(|e| {
            tracing::error!("Password hashing task failed: {:?}", e);
            AppError::InternalServerError
        })?;
        hashes.insert(code, hash?);
    }
    Ok(hashes)
}

/// Upserts students by 학번. A failing row is reported and the rest continue.
pub async fn import_students(db_pool: &SqlitePool, rows: &[StudentRow]) -> AppResult<ImportSummary> {
    let hashes = hash_new_student_passwords(db_pool, rows).await?;

    let mut summary = ImportSummary::default();
    let mut tx = db_pool.begin().await?;

    for row in rows {
        let now = Utc::now();
        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM accounts WHERE student_code = ?1")
                .bind(&row.student_code)
                .fetch_optional(&mut *tx)
                .await?;

        match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE accounts
                    SET name = ?1, grade = ?2, class_number = ?3, student_number = ?4,
                        birth_date = ?5, updated_at = ?6
                    WHERE id = ?7
                    "#,
                )
                .bind(&row.name)
                .bind(row.grade)
                .bind(row.class_number)
                .bind(row.student_number)
                .bind(&row.birth_date)
                .bind(now)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
                summary.updated += 1;
            }
            None => {
                // Deleted between hashing and this transaction.
                let Some(password_hash) = hashes.get(&row.student_code) else {
                    tracing::warn!("Import: no initial password for '{}'", row.student_code);
                    summary
                        .errors
                        .push(format!("학번 {}: 처리 중 변경되었습니다. 다시 시도해 주세요.", row.student_code));
                    continue;
                };
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO accounts (id, login_id, password_hash, name, role, status, grade,
                                          class_number, student_number, student_code, birth_date,
                                          created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, 'student', 'active', ?5, ?6, ?7, ?2, ?8, ?9, ?9)
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&row.student_code)
                .bind(password_hash)
                .bind(&row.name)
                .bind(row.grade)
                .bind(row.class_number)
                .bind(row.student_number)
                .bind(&row.birth_date)
                .bind(now)
                .execute(&mut *tx)
                .await;

                match inserted {
                    Ok(_) => summary.created += 1,
                    Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                        tracing::warn!("Import: login id '{}' already taken", row.student_code);
                        summary
                            .errors
                            .push(format!("학번 {}: 이미 사용 중인 아이디입니다.", row.student_code));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    tx.commit().await?;
    tracing::info!(
        "✅ Student import: {} created, {} updated, {} failed.",
        summary.created,
        summary.updated,
        summary.errors.len()
    );
    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        db,
        models::{log::LogCategory, merit::MeritKind},
        services::{log_service, merit_service},
    };

    pub(crate) fn student_row(code: &str, name: &str, grade: i64, class: i64, number: i64) -> StudentRow {
        StudentRow {
            student_code: code.to_string(),
            name: name.to_string(),
            grade,
            class_number: class,
            student_number: number,
            birth_date: Some("2009-03-14".to_string()),
        }
    }

    pub(crate) async fn teacher(pool: &SqlitePool, email: &str, role: Role) -> Account {
        register_teacher(
            pool,
            NewTeacher {
                email: email.to_string(),
                name: email.split('@').next().unwrap_or(email).to_string(),
                password: "password".to_string(),
                role,
                subject: None,
            },
            AccountStatus::Active,
        )
        .await
        .unwrap()
    }

    pub(crate) async fn admin(pool: &SqlitePool) -> Account {
        ensure_bootstrap_admin(
            pool,
            &BootstrapAdmin {
                login_id: "admin".into(),
                password: "admin-pass".into(),
                name: "관리자".into(),
            },
        )
        .await
        .unwrap();
        find_by_login_id(pool, "admin").await.unwrap().unwrap()
    }

    pub(crate) async fn student(pool: &SqlitePool, code: &str, grade: i64, class: i64, number: i64) -> Account {
        import_students(pool, &[student_row(code, &format!("학생{}", code), grade, class, number)])
            .await
            .unwrap();
        find_by_login_id(pool, code).await.unwrap().unwrap()
    }

    #[test]
    fn initial_password_uses_birth_date() {
        let mut row = student_row("10203", "홍길동", 1, 2, 3);
        assert_eq!(initial_student_password(&row), "090314");
        row.birth_date = Some("090314".into());
        assert_eq!(initial_student_password(&row), "090314");
        row.birth_date = None;
        assert_eq!(initial_student_password(&row), "10203");
    }

    #[tokio::test]
    async fn import_creates_then_updates_by_student_code() {
        let pool = db::test_pool().await;
        let rows = vec![
            student_row("10101", "가나다", 1, 1, 1),
            student_row("10102", "라마바", 1, 1, 2),
        ];
        let first = import_students(&pool, &rows).await.unwrap();
        assert_eq!((first.created, first.updated), (2, 0));

        let mut changed = rows.clone();
        changed[1].name = "라마사".into();
        let second = import_students(&pool, &changed).await.unwrap();
        assert_eq!((second.created, second.updated), (0, 2));

        let students = list_students(&pool, Some(1), Some(1)).await.unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[1].name, "라마사");
        assert_eq!(students[1].cumulative_score, 0);
    }

    #[tokio::test]
    async fn repeated_code_in_one_upload_creates_once() {
        let pool = db::test_pool().await;
        let rows = vec![
            student_row("10101", "가나다", 1, 1, 1),
            student_row("10101", "가나라", 1, 1, 1),
        ];
        let summary = import_students(&pool, &rows).await.unwrap();
        assert_eq!((summary.created, summary.updated), (1, 1));
        assert_eq!(find_by_login_id(&pool, "10101").await.unwrap().unwrap().name, "가나라");
    }

    #[tokio::test]
    async fn other_writers_proceed_while_an_import_hashes_passwords() {
        let path = std::env::temp_dir().join(format!("merit-import-{}.db", Uuid::new_v4()));
        let pool = db::create_db_pool(&format!("sqlite://{}", path.display())).await.unwrap();

        let rows: Vec<StudentRow> = (1..=24)
            .map(|n| student_row(&format!("301{:02}", n), &format!("학생{n}"), 3, 1, n))
            .collect();
        let import = tokio::spawn({
            let pool = pool.clone();
            async move { import_students(&pool, &rows).await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let write = tokio::time::timeout(
            std::time::Duration::from_secs(20),
            log_service::record(&pool, LogCategory::Import, "concurrent", "write during import", None),
        )
        .await
        .expect("audit write finished");
        assert!(write.is_ok(), "audit write failed: {:?}", write);

        let summary = import.await.unwrap().unwrap();
        assert_eq!(summary.created, 24);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn deleting_a_student_removes_their_records_and_requests() {
        let pool = db::test_pool().await;
        let admin = admin(&pool).await;
        let sub = teacher(&pool, "sub@school.kr", Role::SubjectTeacher).await;
        let kid = student(&pool, "10101", 1, 1, 1).await;

        merit_service::award(&pool, &admin, &kid.id, MeritKind::Merit, 2, "선행").await.unwrap();
        merit_service::award(&pool, &sub, &kid.id, MeritKind::Demerit, 1, "지각").await.unwrap();

        let deleted = delete_account(&pool, &kid.id).await.unwrap();
        assert_eq!(deleted.id, kid.id);
        assert!(find_by_id(&pool, &kid.id).await.unwrap().is_none());

        let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM merit_records WHERE student_id = ?1")
            .bind(&kid.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        let requests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM merit_requests WHERE student_id = ?1")
            .bind(&kid.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((records, requests), (0, 0));
    }

    #[tokio::test]
    async fn duplicate_teacher_email_is_a_conflict() {
        let pool = db::test_pool().await;
        teacher(&pool, "park@school.kr", Role::SubjectTeacher).await;
        let err = register_teacher(
            &pool,
            NewTeacher {
                email: "PARK@school.kr".into(),
                name: "박교사".into(),
                password: "password".into(),
                role: Role::SubjectTeacher,
                subject: None,
            },
            AccountStatus::Pending,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn only_teachers_change_status_and_admins_survive_delete() {
        let pool = db::test_pool().await;
        let admin = admin(&pool).await;
        let kid = student(&pool, "20301", 2, 3, 1).await;

        assert!(matches!(
            set_status(&pool, &kid.id, AccountStatus::Inactive).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            delete_account(&pool, &admin.id).await,
            Err(AppError::Forbidden(_))
        ));

        let t = teacher(&pool, "choi@school.kr", Role::HomeroomTeacher).await;
        let t = set_status(&pool, &t.id, AccountStatus::Inactive).await.unwrap();
        assert_eq!(t.status, AccountStatus::Inactive);
    }

    #[tokio::test]
    async fn bootstrap_admin_is_created_once() {
        let pool = db::test_pool().await;
        let cfg = BootstrapAdmin {
            login_id: "admin".into(),
            password: "admin-pass".into(),
            name: "관리자".into(),
        };
        assert!(ensure_bootstrap_admin(&pool, &cfg).await.unwrap());
        assert!(!ensure_bootstrap_admin(&pool, &cfg).await.unwrap());
    }

    #[tokio::test]
    async fn change_password_requires_current_one() {
        let pool = db::test_pool().await;
        let t = teacher(&pool, "jung@school.kr", Role::SubjectTeacher).await;
        assert!(matches!(
            change_password(&pool, &t.id, "nope", "newpass").await,
            Err(AppError::InvalidCredentials)
        ));
        change_password(&pool, &t.id, "password", "newpass").await.unwrap();
        let reloaded = find_by_id(&pool, &t.id).await.unwrap().unwrap();
        assert!(auth_service::verify_password("newpass", &reloaded.password_hash).await.unwrap());
    }
}
