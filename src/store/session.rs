use super::{KeyValueStore, StoreError};
use crate::types::{AuthState, Session, User};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

pub const KEY_TOKEN: &str = "token";
pub const KEY_USER: &str = "user";
pub const KEY_FOLLOWING_LIST: &str = "followingList";

/// Owner of the persisted session. Every read and write of the token, the
/// cached user and the following list goes through here.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    auth: Arc<watch::Sender<AuthState>>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let initial = if read_token(kv.as_ref()).is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        };
        let (tx, _) = watch::channel(initial);
        Self {
            kv,
            auth: Arc::new(tx),
        }
    }

    pub fn token(&self) -> Option<String> {
        read_token(self.kv.as_ref())
    }

    /// `None` when the user blob is missing or no longer decodes.
    pub fn user(&self) -> Option<User> {
        let raw = self.kv.get(KEY_USER)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "cached user does not decode");
                None
            }
        }
    }

    pub fn session(&self) -> Option<Session> {
        Some(Session {
            token: self.token()?,
            user: self.user()?,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn auth_state(&self) -> AuthState {
        *self.auth.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }

    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        let user = serde_json::to_string(&session.user).map_err(|source| StoreError::Value {
            key: KEY_USER.to_string(),
            source,
        })?;
        let same_user = self
            .user()
            .is_some_and(|cached| cached.id == session.user.id);
        if !same_user && self.kv.remove(KEY_FOLLOWING_LIST)? {
            tracing::debug!("dropped following list of the previous account");
        }
        self.kv.set(KEY_TOKEN, session.token.clone())?;
        self.kv.set(KEY_USER, user)?;
        tracing::info!(user_id = %session.user.id, "session saved");
        self.auth.send_replace(AuthState::Authenticated);
        Ok(())
    }

    pub fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let raw = serde_json::to_string(user).map_err(|source| StoreError::Value {
            key: KEY_USER.to_string(),
            source,
        })?;
        self.kv.set(KEY_USER, raw)
    }

    /// Removes the token and the cached user. Returns `true` only when
    /// something was actually removed.
    pub fn clear(&self) -> Result<bool, StoreError> {
        let had_token = self.kv.remove(KEY_TOKEN)?;
        let had_user = self.kv.remove(KEY_USER)?;
        let removed = had_token || had_user;
        if removed {
            tracing::info!("session cleared");
        }
        self.auth.send_if_modified(|state| {
            let changed = *state != AuthState::Anonymous;
            *state = AuthState::Anonymous;
            changed
        });
        Ok(removed)
    }

    pub fn following_ids(&self) -> BTreeSet<String> {
        let Some(raw) = self.kv.get(KEY_FOLLOWING_LIST) else {
            return BTreeSet::new();
        };
        serde_json::from_str::<Vec<String>>(&raw)
            .map(|ids| ids.into_iter().collect())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "following list does not decode");
                BTreeSet::new()
            })
    }

    pub fn set_following_ids(&self, ids: &BTreeSet<String>) -> Result<(), StoreError> {
        let raw = serde_json::to_string(ids).map_err(|source| StoreError::Value {
            key: KEY_FOLLOWING_LIST.to_string(),
            source,
        })?;
        self.kv.set(KEY_FOLLOWING_LIST, raw)
    }

    pub fn clear_following(&self) -> Result<bool, StoreError> {
        self.kv.remove(KEY_FOLLOWING_LIST)
    }
}

fn read_token(kv: &dyn KeyValueStore) -> Option<String> {
    let token = kv.get(KEY_TOKEN)?;
    let trimmed = token.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sample_session() -> Session {
        Session {
            token: "abc".to_string(),
            user: User {
                id: "1".to_string(),
                email: "a@b.com".to_string(),
                name: None,
                avatar: None,
                role: None,
                membership: None,
            },
        }
    }

    #[test]
    fn save_then_read_back() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.auth_state(), AuthState::Anonymous);

        store.save(&sample_session()).unwrap();

        assert_eq!(store.token().as_deref(), Some("abc"));
        assert_eq!(store.session(), Some(sample_session()));
        assert_eq!(store.auth_state(), AuthState::Authenticated);
    }

    #[test]
    fn clear_reports_removal_once() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.save(&sample_session()).unwrap();

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
    }

    #[test]
    fn blank_token_counts_as_anonymous() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(KEY_TOKEN, "   ".to_string()).unwrap();
        let store = SessionStore::new(kv);
        assert!(!store.is_authenticated());
        assert_eq!(store.auth_state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        let mut rx = store.subscribe();

        store.save(&sample_session()).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AuthState::Authenticated);

        store.clear().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AuthState::Anonymous);
    }

    #[test]
    fn saving_another_account_drops_following_list() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.save(&sample_session()).unwrap();
        store
            .set_following_ids(&["a_friend".to_string()].into_iter().collect())
            .unwrap();

        let mut same = sample_session();
        same.token = "refreshed".to_string();
        store.save(&same).unwrap();
        assert!(store.following_ids().contains("a_friend"));

        assert!(store.clear().unwrap());
        assert!(store.following_ids().contains("a_friend"));

        let mut other = sample_session();
        other.user.id = "2".to_string();
        store.save(&other).unwrap();
        assert!(store.following_ids().is_empty());
    }

    #[test]
    fn following_list_round_trips_and_tolerates_garbage() {
        let kv = Arc::new(MemoryStore::new());
        let store = SessionStore::new(kv.clone());
        let ids: BTreeSet<String> = ["7".to_string(), "3".to_string()].into_iter().collect();
        store.set_following_ids(&ids).unwrap();
        assert_eq!(store.following_ids(), ids);

        kv.set(KEY_FOLLOWING_LIST, "not json".to_string()).unwrap();
        assert!(store.following_ids().is_empty());
    }
}
