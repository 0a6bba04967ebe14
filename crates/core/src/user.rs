use serde::{Deserialize, Serialize};

use crate::keys;
use crate::schema::{FieldMap, USER_FIELDS};
use crate::storage::{Condition, Entity, Index, ItemKey, Result, Update, ATTR_UPDATED};

/// Default subscription plan for new accounts.
pub const DEFAULT_PLAN: &str = "free";

/// A registered account.
///
/// Looked up by id, by email (GSI1) and by OAuth identity (GSI2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_subject: Option<String>,
    pub plan: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn item_key(user_id: u64) -> ItemKey {
        ItemKey::new(keys::user_pk(user_id), keys::META_SK)
    }
}

impl Entity for User {
    const ENTITY_TYPE: &'static str = "user";

    fn fields() -> &'static FieldMap {
        &USER_FIELDS
    }

    fn key(&self) -> Result<ItemKey> {
        Ok(User::item_key(self.id))
    }

    fn index_keys(&self) -> Vec<(&'static str, String)> {
        let mut index_keys = vec![
            (Index::Gsi1.partition_attr(), keys::user_email_pk(&self.email)),
            (Index::Gsi1.sort_attr(), keys::user_index_sk(self.id)),
        ];
        if let (Some(provider), Some(subject)) = (&self.oauth_provider, &self.oauth_subject) {
            index_keys.push((
                Index::Gsi2.partition_attr(),
                keys::user_oauth_pk(provider, subject),
            ));
            index_keys.push((Index::Gsi2.sort_attr(), keys::user_index_sk(self.id)));
        }
        index_keys
    }
}

/// Fields supplied when registering an account; the id comes from a counter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub oauth: Option<(String, String)>,
    pub plan: Option<String>,
}

impl NewUser {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_oauth(mut self, provider: impl Into<String>, subject: impl Into<String>) -> Self {
        self.oauth = Some((provider.into(), subject.into()));
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn into_user(self, id: u64, now: i64) -> User {
        let (oauth_provider, oauth_subject) = match self.oauth {
            Some((provider, subject)) => (Some(provider), Some(subject)),
            None => (None, None),
        };
        User {
            id,
            email: self.email,
            name: self.name,
            oauth_provider,
            oauth_subject,
            plan: self.plan.unwrap_or_else(|| DEFAULT_PLAN.to_string()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub plan: Option<String>,
    pub is_active: Option<bool>,
    pub oauth: Option<(String, String)>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = Some(active);
        self
    }

    pub fn with_oauth(mut self, provider: impl Into<String>, subject: impl Into<String>) -> Self {
        self.oauth = Some((provider.into(), subject.into()));
        self
    }

    /// Builds the store update, keeping both lookup indexes in step with the
    /// fields they project.
    pub fn to_update(&self, user_id: u64, now: i64) -> Result<Update> {
        let mut update = Update::new().when(Condition::item_exists());

        if let Some(email) = &self.email {
            update = update
                .set(USER_FIELDS.data_path("email")?, email.as_str())
                .set(Index::Gsi1.partition_attr(), keys::user_email_pk(email));
        }
        if let Some(name) = &self.name {
            update = update.set(USER_FIELDS.data_path("name")?, name.as_str());
        }
        if let Some(plan) = &self.plan {
            update = update.set(USER_FIELDS.data_path("plan")?, plan.as_str());
        }
        if let Some(active) = self.is_active {
            update = update.set(USER_FIELDS.data_path("is_active")?, active);
        }
        if let Some((provider, subject)) = &self.oauth {
            update = update
                .set(USER_FIELDS.data_path("oauth_provider")?, provider.as_str())
                .set(USER_FIELDS.data_path("oauth_subject")?, subject.as_str())
                .set(
                    Index::Gsi2.partition_attr(),
                    keys::user_oauth_pk(provider, subject),
                )
                .set(Index::Gsi2.sort_attr(), keys::user_index_sk(user_id));
        }

        Ok(update.set(ATTR_UPDATED, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{from_item, to_item};
    use serde_json::json;

    #[test]
    fn test_user_envelope_with_oauth() {
        let user = NewUser::new("Alice@Example.com")
            .with_oauth("google", "sub-1")
            .into_user(7, 100);
        let item = to_item(&user).unwrap();

        assert_eq!(item["PK"], json!("USR#7"));
        assert_eq!(item["GSI1PK"], json!("EMAIL#alice@example.com"));
        assert_eq!(item["GSI1SK"], json!("USR#7"));
        assert_eq!(item["GSI2PK"], json!("OAUTH#google#sub-1"));
        assert_eq!(item["dat"]["pl"], json!("free"));
        assert_eq!(from_item::<User>(&item).unwrap(), user);
    }

    #[test]
    fn test_user_without_oauth_is_absent_from_gsi2() {
        let user = NewUser::new("bob@example.com").into_user(8, 100);
        let item = to_item(&user).unwrap();
        assert!(item.get("GSI2PK").is_none());
        assert!(item.get("GSI2SK").is_none());
    }

    #[test]
    fn test_update_links_oauth_identity() {
        let user = NewUser::new("bob@example.com").into_user(8, 100);
        let mut item = to_item(&user).unwrap();
        UserUpdate::new()
            .with_oauth("github", "42")
            .with_plan("pro")
            .to_update(8, 200)
            .unwrap()
            .apply(&mut item)
            .unwrap();

        assert_eq!(item["GSI2PK"], json!("OAUTH#github#42"));
        assert_eq!(item["GSI2SK"], json!("USR#8"));
        let updated: User = from_item(&item).unwrap();
        assert_eq!(updated.plan, "pro");
        assert_eq!(updated.oauth_subject.as_deref(), Some("42"));
    }
}
