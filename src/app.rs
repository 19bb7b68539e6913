use crate::api::auth::AuthApi;
use crate::api::blogs::BlogApi;
use crate::api::chat::ChatApi;
use crate::api::follow::FollowApi;
use crate::api::membership::MembershipApi;
use crate::api::profile::ProfileApi;
use crate::api::quit_plans::QuitPlanApi;
use crate::api::{ApiClient, ApiError};
use crate::config::{ClientConfig, ConfigError};
use crate::follow_cache::FollowingCache;
use crate::realtime::{Connection, Notifier, RealtimeError};
use crate::store::{
    FileStore, KeychainStore, KeyValueStore, SessionStore, StoreError, KEYRING_SERVICE,
};
use crate::types::AuthState;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error("no signed-in user")]
    NotSignedIn,
}

/// Everything a screen needs, wired once per process.
#[derive(Clone)]
pub struct Smokefree {
    pub config: ClientConfig,
    pub session: SessionStore,
    pub client: ApiClient,
    pub auth: AuthApi,
    pub profile: ProfileApi,
    pub blogs: BlogApi,
    pub follow: FollowApi,
    pub following: Arc<FollowingCache>,
    pub chat: ChatApi,
    pub quit_plans: QuitPlanApi,
    pub membership: MembershipApi,
    pub notifier: Notifier,
}

impl Smokefree {
    /// Reads config from the environment, installs logging and opens the
    /// session file under the data directory. The token itself goes to the
    /// OS keyring.
    pub fn from_env() -> Result<Self, AppError> {
        let config = ClientConfig::from_env()?;
        crate::logging::init(&config.log_filter);
        let files = FileStore::open(config.session_store_path())?;
        let store = KeychainStore::new(KEYRING_SERVICE, Arc::new(files))?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, AppError> {
        let session = SessionStore::new(store);
        let client = ApiClient::new(&config, session.clone())?;
        let follow = FollowApi::new(client.clone());
        let notifier = Notifier::new(config.socket_url.clone());

        tracing::info!(
            api_url = %config.api_url,
            authenticated = session.is_authenticated(),
            "client core ready"
        );

        Ok(Self {
            auth: AuthApi::new(client.clone()),
            profile: ProfileApi::new(client.clone()),
            blogs: BlogApi::new(client.clone()),
            following: Arc::new(FollowingCache::new(follow.clone())),
            follow,
            chat: ChatApi::new(client.clone()),
            quit_plans: QuitPlanApi::new(client.clone()),
            membership: MembershipApi::new(client.clone()),
            notifier,
            session,
            client,
            config,
        })
    }

    /// Opens (or reuses) the realtime connection for the signed-in user.
    pub fn connect_realtime(&self) -> Result<Arc<Connection>, AppError> {
        let user = self.session.user().ok_or(AppError::NotSignedIn)?;
        Ok(self.notifier.connect(&user.id)?)
    }

    /// Closes the realtime connection whenever the session ends, including a
    /// 401 seen by any request. Must be called from inside a Tokio runtime.
    pub fn spawn_session_watch(&self) -> Result<(), AppError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;
        let mut auth = self.session.subscribe();
        let notifier = self.notifier.clone();
        runtime.spawn(async move {
            while auth.changed().await.is_ok() {
                let state = *auth.borrow_and_update();
                if state == AuthState::Anonymous && notifier.disconnect() {
                    tracing::info!("session ended; realtime connection closed");
                }
            }
        });
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        self.notifier.disconnect();
        self.auth.logout().await?;
        Ok(())
    }
}
