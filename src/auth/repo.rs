use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{User, UserChanges};

/// Result of [`UserStore::update`].
#[derive(Debug)]
pub enum UserUpdate {
    Updated(User),
    NotFound,
    /// The new email belongs to another account.
    EmailTaken,
}

/// Persistence for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Insert a user. Returns `None` when the email is already registered.
    async fn create(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>>;

    /// Apply `changes` to an existing user.
    async fn update(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<UserUpdate>;
}

/// PostgreSQL-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        // ON CONFLICT keeps duplicate detection atomic under concurrent signups.
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, name, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<UserUpdate> {
        let res = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   name = COALESCE($3, name),
                   password_hash = COALESCE($4, password_hash)
             WHERE id = $1
            RETURNING id, email, name, password_hash, created_at
            "#,
        )
        .bind(id)
        .bind(changes.email)
        .bind(changes.name)
        .bind(changes.password_hash)
        .fetch_optional(&self.db)
        .await;
        match res {
            Ok(Some(user)) => Ok(UserUpdate::Updated(user)),
            Ok(None) => Ok(UserUpdate::NotFound),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(UserUpdate::EmailTaken),
            Err(e) => Err(anyhow::Error::new(e).context("update user")),
        }
    }
}

/// In-memory user store, used by tests and when no database is configured.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard};
    use time::OffsetDateTime;

    #[derive(Default)]
    pub struct MemoryUserStore {
        users: Mutex<HashMap<Uuid, User>>,
    }

    impl MemoryUserStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn users(&self) -> anyhow::Result<MutexGuard<'_, HashMap<Uuid, User>>> {
            self.users
                .lock()
                .map_err(|_| anyhow::anyhow!("user store lock poisoned"))
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
            let users = self.users()?;
            Ok(users.values().find(|u| u.email == email).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            let users = self.users()?;
            Ok(users.get(&id).cloned())
        }

        async fn create(
            &self,
            email: &str,
            name: &str,
            password_hash: &str,
        ) -> anyhow::Result<Option<User>> {
            let mut users = self.users()?;
            if users.values().any(|u| u.email == email) {
                return Ok(None);
            }
            let user = User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                name: name.to_string(),
                password_hash: password_hash.to_string(),
                created_at: OffsetDateTime::now_utc(),
            };
            users.insert(user.id, user.clone());
            Ok(Some(user))
        }

        async fn update(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<UserUpdate> {
            let mut users = self.users()?;
            if let Some(email) = &changes.email {
                if users.values().any(|u| u.id != id && &u.email == email) {
                    return Ok(UserUpdate::EmailTaken);
                }
            }
            let Some(user) = users.get_mut(&id) else {
                return Ok(UserUpdate::NotFound);
            };
            if let Some(email) = changes.email {
                user.email = email;
            }
            if let Some(name) = changes.name {
                user.name = name;
            }
            if let Some(hash) = changes.password_hash {
                user.password_hash = hash;
            }
            Ok(UserUpdate::Updated(user.clone()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn create_rejects_duplicate_email() {
            let store = MemoryUserStore::new();
            let first = store
                .create("a@example.com", "A", "hash")
                .await
                .unwrap();
            assert!(first.is_some());
            let second = store
                .create("a@example.com", "B", "hash")
                .await
                .unwrap();
            assert!(second.is_none());
        }

        #[tokio::test]
        async fn update_keeps_unset_fields() {
            let store = MemoryUserStore::new();
            let user = store
                .create("a@example.com", "A", "hash")
                .await
                .unwrap()
                .unwrap();
            let UserUpdate::Updated(updated) = store
                .update(
                    user.id,
                    UserChanges {
                        name: Some("Renamed".into()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
            else {
                panic!("user should be updated");
            };
            assert_eq!(updated.name, "Renamed");
            assert_eq!(updated.email, "a@example.com");
            assert_eq!(updated.password_hash, "hash");
        }

        #[tokio::test]
        async fn update_unknown_user_returns_none() {
            let store = MemoryUserStore::new();
            let res = store
                .update(Uuid::new_v4(), UserChanges::default())
                .await
                .unwrap();
            assert!(matches!(res, UserUpdate::NotFound));
        }

        #[tokio::test]
        async fn update_to_taken_email_is_reported() {
            let store = MemoryUserStore::new();
            store.create("a@example.com", "A", "hash").await.unwrap();
            let b = store
                .create("b@example.com", "B", "hash")
                .await
                .unwrap()
                .unwrap();
            let res = store
                .update(
                    b.id,
                    UserChanges {
                        email: Some("a@example.com".into()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            assert!(matches!(res, UserUpdate::EmailTaken));
            let b = store.find_by_id(b.id).await.unwrap().unwrap();
            assert_eq!(b.email, "b@example.com");
        }
    }
}
