// src/services/log_service.rs
use crate::{
    error::AppResult,
    models::log::{LogCategory, SystemLog},
};
use chrono::Utc;
use sqlx::SqlitePool;

pub const MAX_LOG_PAGE: i64 = 500;

pub async fn record(
    db_pool: &SqlitePool,
    category: LogCategory,
    action: &str,
    details: &str,
    actor_id: Option<&str>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO system_logs (category, action, details, actor_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(category.as_str())
    .bind(action)
    .bind(details)
    .bind(actor_id)
    .bind(Utc::now())
    .execute(db_pool)
    .await?;
    Ok(())
}

/// Audit write that never fails the caller: the business write already happened.
pub async fn record_quietly(
    db_pool: &SqlitePool,
    category: LogCategory,
    action: &str,
    details: &str,
    actor_id: Option<&str>,
) {
    if let Err(e) = record(db_pool, category, action, details, actor_id).await {
        tracing::warn!("Audit log write failed ({} / {}): {:?}", category.as_str(), action, e);
    }
}

/// Newest entries first.
pub async fn list(
    db_pool: &SqlitePool,
    category: Option<LogCategory>,
    limit: Option<i64>,
) -> AppResult<Vec<SystemLog>> {
    let limit = limit.unwrap_or(100).clamp(1, MAX_LOG_PAGE);
    let logs = sqlx::query_as::<_, SystemLog>(
        r#"
        SELECT * FROM system_logs
        WHERE ?1 IS NULL OR category = ?1
        ORDER BY id DESC
        LIMIT ?2
        "#,
    )
    .bind(category.map(|c| c.as_str()))
    .bind(limit)
    .fetch_all(db_pool)
    .await?;
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn list_filters_by_category_newest_first() {
        let pool = db::test_pool().await;
        record(&pool, LogCategory::Auth, "login", "a", None).await.unwrap();
        record(&pool, LogCategory::Merit, "award", "b", Some("t1")).await.unwrap();
        record(&pool, LogCategory::Merit, "award", "c", Some("t1")).await.unwrap();

        let merits = list(&pool, Some(LogCategory::Merit), None).await.unwrap();
        assert_eq!(merits.len(), 2);
        assert_eq!(merits[0].details, "c");

        let one = list(&pool, None, Some(0)).await.unwrap();
        assert_eq!(one.len(), 1);
    }
}
