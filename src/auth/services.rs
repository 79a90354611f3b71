use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{CreateUserRequest, TokenRequest, UpdateMeRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::{UserStore, UserUpdate},
        repo_types::{User, UserChanges},
    },
    error::{ApiError, FieldErrors},
    validation::{
        min_length_message, optional_text, raw_text, required_text, BLANK, MAX_TEXT_LEN, REQUIRED,
    },
};

pub const DUPLICATE_EMAIL: &str = "user with this email already exists.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const BAD_CREDENTIALS: &str = "Unable to authenticate with provided credentials";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trims the address and lowercases its domain. The local part is kept as
/// written, so `Test@x.com` and `test@x.com` are different accounts.
pub(crate) fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

fn check_email(errors: &mut FieldErrors, email: String) -> Option<String> {
    if email.chars().count() > MAX_TEXT_LEN || !is_valid_email(&email) {
        errors.add("email", INVALID_EMAIL);
        return None;
    }
    Some(email)
}

/// Passwords are taken verbatim: no trimming.
fn check_password(errors: &mut FieldErrors, password: &str, min_len: usize) -> bool {
    if password.is_empty() {
        errors.add("password", BLANK);
        return false;
    }
    if password.chars().count() < min_len {
        errors.add("password", min_length_message(min_len));
        return false;
    }
    true
}

fn required_password(errors: &mut FieldErrors, value: Option<&Value>) -> Option<String> {
    let Some(value) = value else {
        errors.add("password", REQUIRED);
        return None;
    };
    raw_text(errors, "password", value)
}

/// Register a new account. The password is stored only as an Argon2 hash.
pub async fn create_user(
    users: &dyn UserStore,
    min_password_len: usize,
    req: CreateUserRequest,
) -> Result<User, ApiError> {
    let mut errors = FieldErrors::new();

    let email = required_text(&mut errors, "email", req.email.as_ref(), MAX_TEXT_LEN)
        .map(|e| normalize_email(&e))
        .and_then(|e| check_email(&mut errors, e));
    let name = required_text(&mut errors, "name", req.name.as_ref(), MAX_TEXT_LEN);
    let password = required_password(&mut errors, req.password.as_ref())
        .filter(|p| check_password(&mut errors, p, min_password_len));

    if let Some(email) = &email {
        if users.find_by_email(email).await?.is_some() {
            errors.add("email", DUPLICATE_EMAIL);
        }
    }

    let (Some(email), Some(name), Some(password)) = (email, name, password) else {
        warn!(?errors, "signup rejected");
        return Err(ApiError::Validation(errors));
    };
    errors.into_result()?;

    let hash = hash_password(&password)?;
    let Some(user) = users.create(&email, &name, &hash).await? else {
        warn!(email = %email, "email registered concurrently");
        return Err(ApiError::field("email", DUPLICATE_EMAIL));
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Exchange credentials for a bearer token.
pub async fn issue_token(
    users: &dyn UserStore,
    keys: &JwtKeys,
    req: TokenRequest,
) -> Result<String, ApiError> {
    let mut errors = FieldErrors::new();
    let email = required_text(&mut errors, "email", req.email.as_ref(), MAX_TEXT_LEN)
        .map(|e| normalize_email(&e));
    let password = required_password(&mut errors, req.password.as_ref()).filter(|p| {
        if p.is_empty() {
            errors.add("password", BLANK);
        }
        !p.is_empty()
    });
    let (Some(email), Some(password)) = (email, password) else {
        warn!(?errors, "token request rejected");
        return Err(ApiError::Validation(errors));
    };

    let Some(user) = users.find_by_email(&email).await? else {
        warn!(email = %email, "token requested for unknown email");
        return Err(ApiError::Validation(FieldErrors::non_field(BAD_CREDENTIALS)));
    };

    if !verify_password(&password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "token requested with invalid password");
        return Err(ApiError::Validation(FieldErrors::non_field(BAD_CREDENTIALS)));
    }

    let token = keys.sign(user.id)?;
    info!(user_id = %user.id, "token issued");
    Ok(token)
}

/// Partially update the authenticated user. Absent fields are left untouched.
pub async fn update_me(
    users: &dyn UserStore,
    min_password_len: usize,
    user_id: Uuid,
    req: UpdateMeRequest,
) -> Result<User, ApiError> {
    let mut errors = FieldErrors::new();

    let email = optional_text(&mut errors, "email", req.email.as_ref(), MAX_TEXT_LEN)
        .map(|e| normalize_email(&e))
        .and_then(|e| check_email(&mut errors, e));
    let name = optional_text(&mut errors, "name", req.name.as_ref(), MAX_TEXT_LEN);
    let password = req
        .password
        .as_ref()
        .and_then(|p| raw_text(&mut errors, "password", p))
        .filter(|p| check_password(&mut errors, p, min_password_len));

    if let Some(email) = &email {
        if let Some(existing) = users.find_by_email(email).await? {
            if existing.id != user_id {
                errors.add("email", DUPLICATE_EMAIL);
            }
        }
    }
    errors.into_result()?;

    let changes = UserChanges {
        email,
        name,
        password_hash: password.as_deref().map(hash_password).transpose()?,
    };
    if changes.is_empty() {
        return users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("User not found".into()));
    }

    match users.update(user_id, changes).await? {
        UserUpdate::Updated(user) => {
            info!(user_id = %user.id, "user updated");
            Ok(user)
        }
        UserUpdate::EmailTaken => {
            warn!(%user_id, "email taken concurrently");
            Err(ApiError::field("email", DUPLICATE_EMAIL))
        }
        UserUpdate::NotFound => Err(ApiError::Unauthorized("User not found".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::repo::memory::MemoryUserStore, config::JwtConfig};

    fn keys() -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: "test".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 5,
        })
    }

    fn signup(email: &str, password: &str, name: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: Some(email.into()),
            password: Some(password.into()),
            name: Some(name.into()),
        }
    }

    fn validation(err: ApiError) -> FieldErrors {
        match err {
            ApiError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn normalize_email_lowercases_only_the_domain() {
        assert_eq!(normalize_email(" Test@GMAIL.com "), "Test@gmail.com");
        assert_eq!(normalize_email("a@b@EXAMPLE.COM"), "a@b@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("test@gmail.com"));
        assert!(!is_valid_email("wrong"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
    }

    #[tokio::test]
    async fn create_user_hashes_password() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, 5, signup("Test@Gmail.com ", "password123", "Test Test"))
            .await
            .unwrap();
        assert_eq!(user.email, "Test@gmail.com");
        assert_ne!(user.password_hash, "password123");
        assert!(verify_password("password123", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn create_user_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        create_user(&store, 5, signup("test@gmail.com", "password123", "A"))
            .await
            .unwrap();
        let err = create_user(&store, 5, signup("test@gmail.com", "password123", "B"))
            .await
            .unwrap_err();
        let errors = validation(err);
        assert_eq!(errors.get("email").unwrap(), [DUPLICATE_EMAIL.to_string()]);
    }

    #[tokio::test]
    async fn create_user_rejects_short_password_without_persisting() {
        let store = MemoryUserStore::new();
        let err = create_user(&store, 5, signup("test@gmail.com", "pw", "Test"))
            .await
            .unwrap_err();
        assert!(validation(err).contains("password"));
        assert!(store.find_by_email("test@gmail.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_user_reports_every_missing_field() {
        let store = MemoryUserStore::new();
        let err = create_user(&store, 5, CreateUserRequest::default())
            .await
            .unwrap_err();
        let errors = validation(err);
        assert!(errors.contains("email"));
        assert!(errors.contains("password"));
        assert!(errors.contains("name"));
    }

    #[tokio::test]
    async fn issue_token_requires_matching_credentials() {
        let store = MemoryUserStore::new();
        let keys = keys();
        let user = create_user(&store, 5, signup("test@gmail.com", "testpass", "t"))
            .await
            .unwrap();

        let token = issue_token(
            &store,
            &keys,
            TokenRequest {
                email: Some("test@gmail.com".into()),
                password: Some("testpass".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(keys.verify(&token).unwrap().sub, user.id);

        let err = issue_token(
            &store,
            &keys,
            TokenRequest {
                email: Some("test@gmail.com".into()),
                password: Some("wrong".into()),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(
            validation(err).get(crate::error::NON_FIELD_ERRORS).unwrap(),
            [BAD_CREDENTIALS.to_string()]
        );
    }

    #[tokio::test]
    async fn issue_token_rejects_blank_password() {
        let store = MemoryUserStore::new();
        let err = issue_token(
            &store,
            &keys(),
            TokenRequest {
                email: Some("wrong".into()),
                password: Some("".into()),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(validation(err).get("password").unwrap(), [BLANK.to_string()]);
    }

    #[tokio::test]
    async fn update_me_changes_name_and_password() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, 5, signup("me@example.com", "oldpass", "Old"))
            .await
            .unwrap();
        let updated = update_me(
            &store,
            5,
            user.id,
            UpdateMeRequest {
                name: Some("New".into()),
                password: Some("newpass".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.email, "me@example.com");
        assert!(verify_password("newpass", &updated.password_hash).unwrap());
    }

    #[tokio::test]
    async fn update_me_rejects_taken_email() {
        let store = MemoryUserStore::new();
        create_user(&store, 5, signup("a@example.com", "password", "A"))
            .await
            .unwrap();
        let b = create_user(&store, 5, signup("b@example.com", "password", "B"))
            .await
            .unwrap();
        let err = update_me(
            &store,
            5,
            b.id,
            UpdateMeRequest {
                email: Some("a@example.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(validation(err).contains("email"));
    }

    #[tokio::test]
    async fn token_requires_exact_local_part() {
        let store = MemoryUserStore::new();
        create_user(&store, 5, signup("Test@gmail.com", "testpass", "t"))
            .await
            .unwrap();

        let ok = issue_token(
            &store,
            &keys(),
            TokenRequest {
                email: Some("Test@GMAIL.COM".into()),
                password: Some("testpass".into()),
            },
        )
        .await;
        assert!(ok.is_ok());

        let err = issue_token(
            &store,
            &keys(),
            TokenRequest {
                email: Some("TEST@GMAIL.COM".into()),
                password: Some("testpass".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(validation(err).contains(crate::error::NON_FIELD_ERRORS));
    }

    #[tokio::test]
    async fn mistyped_fields_are_reported_by_name() {
        let store = MemoryUserStore::new();
        let err = create_user(
            &store,
            5,
            CreateUserRequest {
                email: Some(Value::Null),
                password: Some(serde_json::json!(12345)),
                name: Some(serde_json::json!({"first": "A"})),
            },
        )
        .await
        .unwrap_err();
        let errors = validation(err);
        assert_eq!(errors.get("email").unwrap(), [crate::validation::NULL.to_string()]);
        assert_eq!(
            errors.get("password").unwrap(),
            [crate::validation::NOT_A_STRING.to_string()]
        );
        assert!(errors.contains("name"));
    }

    /// Hides existing rows from email lookups, so the uniqueness check in
    /// the service passes and the conflict only shows up at write time.
    struct LateConflictStore(MemoryUserStore);

    #[async_trait::async_trait]
    impl UserStore for LateConflictStore {
        async fn find_by_email(&self, _email: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            self.0.find_by_id(id).await
        }

        async fn create(
            &self,
            email: &str,
            name: &str,
            password_hash: &str,
        ) -> anyhow::Result<Option<User>> {
            self.0.create(email, name, password_hash).await
        }

        async fn update(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<UserUpdate> {
            self.0.update(id, changes).await
        }
    }

    #[tokio::test]
    async fn email_conflicts_at_write_time_are_validation_errors() {
        let store = LateConflictStore(MemoryUserStore::new());
        create_user(&store, 5, signup("a@example.com", "password", "A"))
            .await
            .unwrap();
        let b = create_user(&store, 5, signup("b@example.com", "password", "B"))
            .await
            .unwrap();

        let err = update_me(
            &store,
            5,
            b.id,
            UpdateMeRequest {
                email: Some("a@example.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(validation(err).get("email").unwrap(), [DUPLICATE_EMAIL.to_string()]);

        let err = create_user(&store, 5, signup("a@example.com", "password", "C"))
            .await
            .unwrap_err();
        assert_eq!(validation(err).get("email").unwrap(), [DUPLICATE_EMAIL.to_string()]);
    }
}
