// src/services/auth_service.rs
use crate::{
    error::{AppError, AppResult},
    models::account::{Account, AccountStatus},
    services::account_service,
};
use sqlx::SqlitePool;

pub const MIN_PASSWORD_LEN: usize = 4;

/// Checks a password against its stored bcrypt hash off the async runtime.
pub async fn verify_password(password: &str, stored_hash: &str) -> AppResult<bool> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(&password, &stored_hash))
        .await
        .map_err(|e| {
            tracing::error!("spawn_blocking failed (verify_password): {:?}", e);
            AppError::InternalServerError
        })?
        .map_err(|e| {
            tracing::error!("bcrypt verify failed: {:?}", e);
            AppError::PasswordHashingError
        })
}

pub async fn hash_password(password: &str) -> AppResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(&password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| {
            tracing::error!("spawn_blocking failed (hash_password): {:?}", e);
            AppError::InternalServerError
        })?
        .map_err(|e| {
            tracing::error!("bcrypt hash failed: {:?}", e);
            AppError::PasswordHashingError
        })
}

pub fn validate_new_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "비밀번호는 {}자 이상이어야 합니다.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Resolves a login attempt. Unknown ids and wrong passwords are indistinguishable.
pub async fn authenticate(db_pool: &SqlitePool, login_id: &str, password: &str) -> AppResult<Account> {
    let account = account_service::find_by_login_id(db_pool, login_id.trim())
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(password, &account.password_hash).await? {
        tracing::warn!("Wrong password for login id '{}'", login_id);
        return Err(AppError::InvalidCredentials);
    }

    match account.status {
        AccountStatus::Active => Ok(account),
        AccountStatus::Pending => Err(AppError::AccountPending),
        AccountStatus::Inactive => Err(AppError::Forbidden("비활성화된 계정입니다.".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::account::Role, services::account_service::NewTeacher};

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = hash_password("1234").await.unwrap();
        assert!(verify_password("1234", &hash).await.unwrap());
        assert!(!verify_password("4321", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn pending_teacher_cannot_log_in() {
        let pool = db::test_pool().await;
        account_service::register_teacher(
            &pool,
            NewTeacher {
                email: "kim@school.kr".into(),
                name: "김교사".into(),
                password: "secret".into(),
                role: Role::SubjectTeacher,
                subject: Some("수학".into()),
            },
            AccountStatus::Pending,
        )
        .await
        .unwrap();

        let err = authenticate(&pool, "kim@school.kr", "secret").await.unwrap_err();
        assert!(matches!(err, AppError::AccountPending));

        let err = authenticate(&pool, "kim@school.kr", "wrong").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_id_is_case_insensitive() {
        let pool = db::test_pool().await;
        account_service::register_teacher(
            &pool,
            NewTeacher {
                email: "Lee@School.kr".into(),
                name: "이교사".into(),
                password: "secret".into(),
                role: Role::HomeroomTeacher,
                subject: None,
            },
            AccountStatus::Active,
        )
        .await
        .unwrap();

        let account = authenticate(&pool, "lee@school.kr", "secret").await.unwrap();
        assert_eq!(account.name, "이교사");
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_new_password("abc").is_err());
        assert!(validate_new_password("abcd").is_ok());
    }
}
