use crate::api::follow::FollowApi;
use crate::api::ApiError;
use crate::store::SessionStore;
use std::collections::BTreeSet;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Follow,
    Unfollow,
}

/// Client-side copy of who the signed-in user follows.
///
/// Follow/unfollow update the persisted set before the server call and roll
/// back when it fails. `refresh` replaces the set with the server's list.
/// Mutations are serialized so concurrent screens cannot clobber each other.
pub struct FollowingCache {
    api: FollowApi,
    session: SessionStore,
    write_lock: Mutex<()>,
}

impl FollowingCache {
    pub fn new(api: FollowApi) -> Self {
        let session = api.client().session().clone();
        Self {
            api,
            session,
            write_lock: Mutex::new(()),
        }
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.session.following_ids()
    }

    pub fn is_following(&self, user_id: &str) -> bool {
        self.session.following_ids().contains(user_id)
    }

    pub async fn follow(&self, user_id: &str) -> Result<(), ApiError> {
        self.apply(user_id, Change::Follow).await
    }

    pub async fn unfollow(&self, user_id: &str) -> Result<(), ApiError> {
        self.apply(user_id, Change::Unfollow).await
    }

    async fn apply(&self, user_id: &str, change: Change) -> Result<(), ApiError> {
        crate::api::segment(user_id)?;
        let _guard = self.write_lock.lock().await;
        let user_id = user_id.trim();

        let mut ids = self.session.following_ids();
        let changed = match change {
            Change::Follow => ids.insert(user_id.to_string()),
            Change::Unfollow => ids.remove(user_id),
        };
        if changed {
            self.session.set_following_ids(&ids)?;
        }

        let result = match change {
            Change::Follow => self.api.follow(user_id).await,
            Change::Unfollow => self.api.unfollow(user_id).await,
        };

        if let Err(e) = result {
            if changed {
                let mut ids = self.session.following_ids();
                match change {
                    Change::Follow => ids.remove(user_id),
                    Change::Unfollow => ids.insert(user_id.to_string()),
                };
                if let Err(store_err) = self.session.set_following_ids(&ids) {
                    tracing::error!(error = %store_err, "failed to roll back following list");
                }
            }
            tracing::warn!(user_id, ?change, error = %e.redacted(), "follow change rejected");
            return Err(e);
        }

        Ok(())
    }

    /// Replaces the cache with the server's following list for `user_id`.
    pub async fn refresh(&self, user_id: &str) -> Result<BTreeSet<String>, ApiError> {
        let _guard = self.write_lock.lock().await;
        let following = self.api.following(user_id).await?;
        let ids: BTreeSet<String> = following.into_iter().map(|u| u.id).collect();
        let previous = self.session.following_ids();
        if previous != ids {
            tracing::debug!(
                before = previous.len(),
                after = ids.len(),
                "following list reconciled with server"
            );
        }
        self.session.set_following_ids(&ids)?;
        Ok(ids)
    }

    pub async fn invalidate(&self) -> Result<(), ApiError> {
        let _guard = self.write_lock.lock().await;
        self.session.clear_following()?;
        Ok(())
    }
}
