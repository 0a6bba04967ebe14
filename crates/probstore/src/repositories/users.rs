use std::sync::Arc;

use probstore_core::counter::USER_COUNTER;
use probstore_core::keys;
use probstore_core::storage::{
    from_item, to_item, Condition, Index, ItemStore, Query, RepositoryError, Result, WriteOutcome,
};
use probstore_core::user::{NewUser, User, UserUpdate};

use super::{now, CounterService};

/// Accounts, addressable by id, email and OAuth identity.
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn ItemStore>,
    counters: CounterService,
}

impl UserRepository {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self {
            counters: CounterService::new(store.clone()),
            store,
        }
    }

    /// Registers an account under the next id of the `user` counter.
    ///
    /// The email check and the write are separate requests, so two
    /// simultaneous registrations of one address can both succeed.
    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        if self.get_user_by_email(&new_user.email).await?.is_some() {
            return Err(RepositoryError::AlreadyExists {
                entity_type: "User",
                id: new_user.email.to_lowercase(),
            });
        }

        let id = u64::try_from(self.counters.next_id(USER_COUNTER).await?)
            .map_err(|_| RepositoryError::invalid_data("User counter went negative"))?;
        let user = new_user.into_user(id, now());

        match self
            .store
            .put(to_item(&user)?, Some(Condition::item_not_exists()))
            .await?
        {
            WriteOutcome::Applied(()) => {
                tracing::info!(user_id = id, "Created user");
                Ok(user)
            }
            WriteOutcome::ConditionFailed => Err(RepositoryError::AlreadyExists {
                entity_type: "User",
                id: id.to_string(),
            }),
        }
    }

    pub async fn get_user(&self, user_id: u64) -> Result<Option<User>> {
        let item = self.store.get(&User::item_key(user_id)).await?;
        item.as_ref().map(from_item::<User>).transpose()
    }

    /// Case-insensitive email lookup through GSI1.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.first_on_index(Index::Gsi1, keys::user_email_pk(email))
            .await
    }

    /// OAuth identity lookup through GSI2.
    pub async fn get_user_by_oauth(&self, provider: &str, subject: &str) -> Result<Option<User>> {
        self.first_on_index(Index::Gsi2, keys::user_oauth_pk(provider, subject))
            .await
    }

    /// Applies a partial update and returns the user as stored.
    pub async fn update_user(&self, user_id: u64, changes: &UserUpdate) -> Result<User> {
        let update = changes.to_update(user_id, now())?;
        match self.store.update(&User::item_key(user_id), &update).await? {
            WriteOutcome::Applied(item) => from_item(&item),
            WriteOutcome::ConditionFailed => Err(RepositoryError::NotFound {
                entity_type: "User",
                id: user_id.to_string(),
            }),
        }
    }

    async fn first_on_index(&self, index: Index, partition: String) -> Result<Option<User>> {
        let query = Query::partition(partition)
            .on_index(index)
            .sort_begins_with(keys::USER_PREFIX)
            .limit(Some(1));
        let items = self.store.query(&query).await?;
        items.first().map(from_item::<User>).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn repo() -> UserRepository {
        UserRepository::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_ids_come_from_counter() {
        let users = repo();
        let alice = users.create_user(NewUser::new("alice@example.com")).await.unwrap();
        let bob = users.create_user(NewUser::new("bob@example.com")).await.unwrap();
        assert_eq!((alice.id, bob.id), (1, 2));
        assert_eq!(users.get_user(2).await.unwrap(), Some(bob));
        assert_eq!(users.get_user(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_by_email_ignores_case() {
        let users = repo();
        let created = users
            .create_user(NewUser::new("Alice@Example.com").with_name("Alice"))
            .await
            .unwrap();

        let found = users.get_user_by_email("alice@EXAMPLE.com").await.unwrap();
        assert_eq!(found, Some(created));
        assert!(users
            .get_user_by_email("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let users = repo();
        users.create_user(NewUser::new("a@example.com")).await.unwrap();
        let err = users
            .create_user(NewUser::new("A@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_oauth_lookup_after_linking() {
        let users = repo();
        let user = users.create_user(NewUser::new("c@example.com")).await.unwrap();
        assert!(users
            .get_user_by_oauth("github", "42")
            .await
            .unwrap()
            .is_none());

        let updated = users
            .update_user(user.id, &UserUpdate::new().with_oauth("github", "42"))
            .await
            .unwrap();
        let found = users.get_user_by_oauth("github", "42").await.unwrap();
        assert_eq!(found, Some(updated));
    }

    #[tokio::test]
    async fn test_email_change_moves_lookup() {
        let users = repo();
        let user = users.create_user(NewUser::new("old@example.com")).await.unwrap();
        users
            .update_user(user.id, &UserUpdate::new().with_email("new@example.com"))
            .await
            .unwrap();

        assert!(users
            .get_user_by_email("old@example.com")
            .await
            .unwrap()
            .is_none());
        let found = users.get_user_by_email("new@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let users = repo();
        let err = users
            .update_user(99, &UserUpdate::new().with_plan("pro"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
