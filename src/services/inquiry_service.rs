// src/services/inquiry_service.rs
use crate::{
    error::{AppError, AppResult},
    models::{account::Account, inquiry::Inquiry},
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn find(db_pool: &SqlitePool, inquiry_id: &str) -> AppResult<Inquiry> {
    sqlx::query_as::<_, Inquiry>("SELECT * FROM inquiries WHERE id = ?1")
        .bind(inquiry_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("문의를 찾을 수 없습니다.".to_string()))
}

pub async fn create(db_pool: &SqlitePool, author: &Account, title: &str, content: &str) -> AppResult<Inquiry> {
    if title.trim().is_empty() || content.trim().is_empty() {
        return Err(AppError::Validation("제목과 내용을 입력해 주세요.".to_string()));
    }
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO inquiries (id, author_id, title, content, status, created_at)
        VALUES (?1, ?2, ?3, ?4, 'open', ?5)
        "#,
    )
    .bind(&id)
    .bind(&author.id)
    .bind(title.trim())
    .bind(content.trim())
    .bind(Utc::now())
    .execute(db_pool)
    .await?;

    tracing::info!("✉️ Inquiry {} from {}.", id, author.name);
    find(db_pool, &id).await
}

/// Admins see every inquiry, everyone else only their own.
pub async fn list_for(db_pool: &SqlitePool, viewer: &Account) -> AppResult<Vec<Inquiry>> {
    let author_filter = if viewer.is_admin() { None } else { Some(viewer.id.as_str()) };
    let inquiries = sqlx::query_as::<_, Inquiry>(
        r#"
        SELECT * FROM inquiries
        WHERE ?1 IS NULL OR author_id = ?1
        ORDER BY status DESC, created_at DESC
        "#,
    )
    .bind(author_filter)
    .fetch_all(db_pool)
    .await?;
    Ok(inquiries)
}

pub async fn answer(db_pool: &SqlitePool, admin: &Account, inquiry_id: &str, answer: &str) -> AppResult<Inquiry> {
    if answer.trim().is_empty() {
        return Err(AppError::Validation("답변을 입력해 주세요.".to_string()));
    }
    let rows = sqlx::query(
        r#"
        UPDATE inquiries
        SET answer = ?1, answered_by = ?2, answered_at = ?3, status = 'answered'
        WHERE id = ?4
        "#,
    )
    .bind(answer.trim())
    .bind(&admin.id)
    .bind(Utc::now())
    .bind(inquiry_id)
    .execute(db_pool)
    .await?
    .rows_affected();
    if rows == 0 {
        return Err(AppError::NotFound("문의를 찾을 수 없습니다.".to_string()));
    }
    find(db_pool, inquiry_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::inquiry::InquiryStatus, services::account_service::tests as fixtures};

    #[tokio::test]
    async fn authors_see_their_own_and_admin_sees_all() {
        let pool = db::test_pool().await;
        let admin = fixtures::admin(&pool).await;
        let kid = fixtures::student(&pool, "10101", 1, 1, 1).await;
        let other = fixtures::student(&pool, "10102", 1, 1, 2).await;

        let mine = create(&pool, &kid, "벌점 문의", "지각 처리가 잘못되었습니다.").await.unwrap();
        create(&pool, &other, "상점 문의", "봉사 시간 반영 부탁드립니다.").await.unwrap();

        assert_eq!(list_for(&pool, &kid).await.unwrap().len(), 1);
        assert_eq!(list_for(&pool, &admin).await.unwrap().len(), 2);

        let answered = answer(&pool, &admin, &mine.id, "확인 후 정정했습니다.").await.unwrap();
        assert_eq!(answered.status, InquiryStatus::Answered);
        assert_eq!(answered.answered_by.as_deref(), Some(admin.id.as_str()));
    }

    #[tokio::test]
    async fn blank_inquiries_are_rejected() {
        let pool = db::test_pool().await;
        let kid = fixtures::student(&pool, "10101", 1, 1, 1).await;
        assert!(matches!(create(&pool, &kid, " ", "내용").await, Err(AppError::Validation(_))));
    }
}
