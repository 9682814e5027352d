// src/services/class_service.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        account::{Account, Role},
        class::{Class, ClassOverview},
    },
    services::account_service,
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

fn validate_numbers(grade: i64, class_number: i64) -> AppResult<()> {
    if !(1..=6).contains(&grade) || !(1..=30).contains(&class_number) {
        return Err(AppError::Validation("학년 또는 반 번호가 올바르지 않습니다.".to_string()));
    }
    Ok(())
}

async fn require_role(db_pool: &SqlitePool, account_id: &str, allowed: &[Role]) -> AppResult<Account> {
    match account_service::find_by_id(db_pool, account_id).await? {
        Some(account) if allowed.contains(&account.role) => Ok(account),
        Some(account) => Err(AppError::Validation(format!(
            "'{}' 계정은 이 역할에 배정할 수 없습니다.",
            account.name
        ))),
        None => Err(AppError::NotFound("교사를 찾을 수 없습니다.".to_string())),
    }
}

pub async fn find_class(db_pool: &SqlitePool, class_id: &str) -> AppResult<Class> {
    sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = ?1")
        .bind(class_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("학급을 찾을 수 없습니다.".to_string()))
}

pub async fn create_class(
    db_pool: &SqlitePool,
    grade: i64,
    class_number: i64,
    homeroom_teacher_id: Option<&str>,
) -> AppResult<Class> {
    validate_numbers(grade, class_number)?;
    if let Some(teacher_id) = homeroom_teacher_id {
        require_role(db_pool, teacher_id, &[Role::HomeroomTeacher]).await?;
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO classes (id, grade, class_number, homeroom_teacher_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&id)
    .bind(grade)
    .bind(class_number)
    .bind(homeroom_teacher_id)
    .bind(Utc::now())
    .execute(db_pool)
    .await
    .map_err(|e| AppError::from_unique(e, "이미 존재하는 학급이거나 이미 담임을 맡은 교사입니다."))?;

    tracing::info!("✅ Class {}-{} created.", grade, class_number);
    find_class(db_pool, &id).await
}

/// Replaces the homeroom teacher and the subject teacher list in one transaction.
pub async fn update_class(
    db_pool: &SqlitePool,
    class_id: &str,
    homeroom_teacher_id: Option<&str>,
    subject_teacher_ids: &[String],
) -> AppResult<Class> {
    find_class(db_pool, class_id).await?;
    if let Some(teacher_id) = homeroom_teacher_id {
        require_role(db_pool, teacher_id, &[Role::HomeroomTeacher]).await?;
    }
    for teacher_id in subject_teacher_ids {
        require_role(db_pool, teacher_id, &[Role::HomeroomTeacher, Role::SubjectTeacher]).await?;
    }

    let mut tx = db_pool.begin().await?;

    sqlx::query("UPDATE classes SET homeroom_teacher_id = ?1 WHERE id = ?2")
        .bind(homeroom_teacher_id)
        .bind(class_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_unique(e, "이미 다른 학급의 담임을 맡은 교사입니다."))?;

    sqlx::query("DELETE FROM class_subject_teachers WHERE class_id = ?1")
        .bind(class_id)
        .execute(&mut *tx)
        .await?;

    for teacher_id in subject_teacher_ids {
        sqlx::query("INSERT OR IGNORE INTO class_subject_teachers (class_id, teacher_id) VALUES (?1, ?2)")
            .bind(class_id)
            .bind(teacher_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::info!("✅ Class {} teachers updated.", class_id);
    find_class(db_pool, class_id).await
}

pub async fn delete_class(db_pool: &SqlitePool, class_id: &str) -> AppResult<Class> {
    let class = find_class(db_pool, class_id).await?;
    sqlx::query("DELETE FROM classes WHERE id = ?1")
        .bind(class_id)
        .execute(db_pool)
        .await?;
    tracing::info!("🗑️ Class {} deleted.", class.label());
    Ok(class)
}

pub async fn students_of_class(db_pool: &SqlitePool, class: &Class) -> AppResult<Vec<Account>> {
    account_service::list_students(db_pool, Some(class.grade), Some(class.class_number)).await
}

pub async fn list_classes(db_pool: &SqlitePool) -> AppResult<Vec<ClassOverview>> {
    let classes = sqlx::query_as::<_, Class>("SELECT * FROM classes ORDER BY grade ASC, class_number ASC")
        .fetch_all(db_pool)
        .await?;

    let mut overviews = Vec::with_capacity(classes.len());
    for class in classes {
        let homeroom_teacher_name = match &class.homeroom_teacher_id {
            Some(id) => account_service::find_by_id(db_pool, id).await?.map(|t| t.name),
            None => None,
        };
        let subject_teacher_ids: Vec<String> = sqlx::query_scalar(
            "SELECT teacher_id FROM class_subject_teachers WHERE class_id = ?1 ORDER BY teacher_id",
        )
        .bind(&class.id)
        .fetch_all(db_pool)
        .await?;
        let student_ids = students_of_class(db_pool, &class)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        overviews.push(ClassOverview {
            id: class.id,
            grade: class.grade,
            class_number: class.class_number,
            homeroom_teacher_id: class.homeroom_teacher_id,
            homeroom_teacher_name,
            subject_teacher_ids,
            student_ids,
        });
    }
    Ok(overviews)
}

pub async fn class_of_homeroom(db_pool: &SqlitePool, teacher_id: &str) -> AppResult<Option<Class>> {
    let class = sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE homeroom_teacher_id = ?1")
        .bind(teacher_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(class)
}

/// True when `teacher_id` is the homeroom teacher of the class the student belongs to.
pub async fn is_homeroom_of(db_pool: &SqlitePool, teacher_id: &str, student: &Account) -> AppResult<bool> {
    let (Some(grade), Some(class_number)) = (student.grade, student.class_number) else {
        return Ok(false);
    };
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM classes
        WHERE grade = ?1 AND class_number = ?2 AND homeroom_teacher_id = ?3
        "#,
    )
    .bind(grade)
    .bind(class_number)
    .bind(teacher_id)
    .fetch_optional(db_pool)
    .await?;
    Ok(found.is_some())
}
