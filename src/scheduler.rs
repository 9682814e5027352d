// src/scheduler.rs
use crate::{
    config::Config,
    models::log::LogCategory,
    services::{log_service, report_service},
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Starts the daily report loop. Returns `None` when reports or mail are switched off.
pub fn spawn_daily_reports(db_pool: SqlitePool, config: Arc<Config>) -> Option<JoinHandle<()>> {
    if !config.report.enabled {
        tracing::info!("Daily reports disabled (REPORT_ENABLED=false).");
        return None;
    }
    let Some(mail) = config.mail.clone() else {
        tracing::info!("Daily reports disabled: SMTP is not configured.");
        return None;
    };
    let schedule = config.report.clone();
    let offset = schedule.offset();

    Some(tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = report_service::next_run_after(now, schedule.hour, schedule.minute, offset);
            tracing::info!("⏰ Next daily report run at {}", next.with_timezone(&offset));
            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

            let date = next.with_timezone(&offset).date_naive();
            match report_service::send_daily_reports(&db_pool, &mail, date, offset).await {
                Ok(sent) => {
                    log_service::record_quietly(
                        &db_pool,
                        LogCategory::Report,
                        "daily_reports_sent",
                        &format!("{date}: {sent} sent"),
                        None,
                    )
                    .await;
                }
                Err(e) => tracing::error!("❌ Daily report run for {} failed: {:?}", date, e),
            }
        }
    }))
}
