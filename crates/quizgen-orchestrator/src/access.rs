//! Access policies for collection-scoped actions.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use quizgen_core::{AccessPolicy, Actor, Error, Result};

/// Grants every actor access to every collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

#[async_trait]
impl AccessPolicy for AllowAllPolicy {
    async fn can_manage_collection(&self, _actor: &Actor, _collection_id: i64) -> Result<bool> {
        Ok(true)
    }
}

/// Explicit per-user collection grants. Administrators manage everything.
#[derive(Debug, Default)]
pub struct CollectionGrantPolicy {
    grants: RwLock<HashMap<i64, HashSet<i64>>>,
}

impl CollectionGrantPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `user_id` to manage `collection_id`.
    pub fn grant(&self, user_id: i64, collection_id: i64) -> Result<()> {
        self.grants
            .write()
            .map_err(|_| Error::Internal("access grants lock poisoned".to_string()))?
            .entry(user_id)
            .or_default()
            .insert(collection_id);
        Ok(())
    }

    pub fn revoke(&self, user_id: i64, collection_id: i64) -> Result<()> {
        if let Some(set) = self
            .grants
            .write()
            .map_err(|_| Error::Internal("access grants lock poisoned".to_string()))?
            .get_mut(&user_id)
        {
            set.remove(&collection_id);
        }
        Ok(())
    }
}

#[async_trait]
impl AccessPolicy for CollectionGrantPolicy {
    async fn can_manage_collection(&self, actor: &Actor, collection_id: i64) -> Result<bool> {
        if actor.is_admin {
            return Ok(true);
        }
        let grants = self
            .grants
            .read()
            .map_err(|_| Error::Internal("access grants lock poisoned".to_string()))?;
        Ok(grants
            .get(&actor.user_id)
            .is_some_and(|set| set.contains(&collection_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_policy() {
        let policy = CollectionGrantPolicy::new();
        policy.grant(7, 100).unwrap();

        assert!(policy.can_manage_collection(&Actor::user(7), 100).await.unwrap());
        assert!(!policy.can_manage_collection(&Actor::user(7), 101).await.unwrap());
        assert!(!policy.can_manage_collection(&Actor::user(8), 100).await.unwrap());
        assert!(policy.can_manage_collection(&Actor::admin(1), 101).await.unwrap());

        policy.revoke(7, 100).unwrap();
        assert!(!policy.can_manage_collection(&Actor::user(7), 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_allow_all() {
        assert!(AllowAllPolicy
            .can_manage_collection(&Actor::user(1), 5)
            .await
            .unwrap());
    }
}
