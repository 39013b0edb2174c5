//! Reactive session state and the operations that drive it.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::auth::AuthApi;
use crate::api::client::ApiClient;
use crate::api::models::{User, UserCreate, UserLogin, UserUpdate};
use crate::auth::token::{self, AuthEvent, DEFAULT_EXPIRY_BUFFER_SECS};
use crate::error::{ClientError, ClientResult};

/// What the UI knows about the signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// A fresh process has not checked its tokens yet, so it starts loading
impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_loading: true,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Start,
    Success(User),
    Failure(String),
    Logout,
    ClearError,
    UpdateUser(User),
    /// Record an error without touching the user or auth flags
    SetError(String),
}

impl Session {
    pub fn reduce(self, action: SessionAction) -> Session {
        match action {
            SessionAction::Start => Session {
                is_loading: true,
                error: None,
                ..self
            },
            SessionAction::Success(user) => Session {
                user: Some(user),
                is_authenticated: true,
                is_loading: false,
                error: None,
            },
            SessionAction::Failure(message) => Session {
                user: None,
                is_authenticated: false,
                is_loading: false,
                error: Some(message),
            },
            SessionAction::Logout => Session {
                user: None,
                is_authenticated: false,
                is_loading: false,
                error: None,
            },
            SessionAction::ClearError => Session {
                error: None,
                ..self
            },
            SessionAction::UpdateUser(user) => Session {
                user: Some(user),
                ..self
            },
            SessionAction::SetError(message) => Session {
                error: Some(message),
                ..self
            },
        }
    }
}

/// Owns the session and runs login, registration, logout and profile changes
/// against the API.
pub struct SessionController {
    client: ApiClient,
    auth: AuthApi,
    state: watch::Sender<Session>,
}

impl SessionController {
    pub fn new(client: ApiClient) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            auth: AuthApi::new(client.clone()),
            client,
            state,
        }
    }

    /// Current session snapshot
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receive every session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    fn dispatch(&self, action: SessionAction) {
        debug!(?action, "Session transition");
        self.state
            .send_modify(|session| *session = std::mem::take(session).reduce(action));
    }

    fn fail(&self, err: ClientError) -> ClientError {
        self.dispatch(SessionAction::Failure(err.to_string()));
        err
    }

    /// Restore the session from stored tokens, renewing an expiring access
    /// token first
    pub async fn check_auth(&self) -> ClientResult<User> {
        self.dispatch(SessionAction::Start);
        let tokens = self.client.tokens();

        let access_token =
            match (tokens.get_access_token().await, tokens.get_refresh_token().await) {
                (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                    access
                }
                _ => {
                    debug!("No stored tokens, starting signed out");
                    return Err(self.fail(ClientError::NoTokens));
                }
            };

        if token::is_expired(&access_token, DEFAULT_EXPIRY_BUFFER_SECS) {
            debug!("Access token expiring, refreshing before profile fetch");
            if let Err(e) = self.client.refresh_tokens().await {
                warn!(error = %e, "Could not renew session");
                tokens.clear_tokens().await;
                return Err(self.fail(ClientError::SessionExpired));
            }
        }

        match self.auth.current_user().await {
            Ok(user) => {
                info!(user_id = %user.id, "Session restored");
                self.dispatch(SessionAction::Success(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Stored session rejected");
                tokens.clear_tokens().await;
                Err(self.fail(e))
            }
        }
    }

    pub async fn login(&self, credentials: &UserLogin) -> ClientResult<User> {
        self.dispatch(SessionAction::Start);

        let result = async {
            let pair = self.auth.login(credentials).await?;
            self.client
                .tokens()
                .set_tokens(&pair.access_token, &pair.refresh_token)
                .await;
            self.auth.current_user().await
        }
        .await;

        match result {
            Ok(user) => {
                info!(user_id = %user.id, "Logged in");
                self.dispatch(SessionAction::Success(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                Err(self.fail(e))
            }
        }
    }

    /// Create the account, then log straight in with the same credentials
    pub async fn register(&self, user: &UserCreate) -> ClientResult<User> {
        self.dispatch(SessionAction::Start);

        if let Err(e) = self.auth.register(user).await {
            warn!(error = %e, "Registration failed");
            return Err(self.fail(e));
        }

        self.login(&UserLogin {
            email: user.email.clone(),
            password: user.password.clone(),
        })
        .await
    }

    /// Revoke the refresh token if possible. Local state is always cleared.
    pub async fn logout(&self) {
        let tokens = self.client.tokens();
        if let Some(refresh_token) = tokens.get_refresh_token().await {
            if let Err(e) = self.auth.logout(&refresh_token).await {
                error!(error = %e, "Logout error");
            }
        }

        tokens.clear_tokens().await;
        self.dispatch(SessionAction::Logout);
        self.client.emit(AuthEvent::LoggedOut);
        info!("Logged out");
    }

    pub async fn update_profile(&self, update: &UserUpdate) -> ClientResult<User> {
        match self.auth.update_profile(update).await {
            Ok(user) => {
                self.dispatch(SessionAction::UpdateUser(user.clone()));
                Ok(user)
            }
            Err(e) => {
                self.dispatch(SessionAction::SetError(e.to_string()));
                Err(e)
            }
        }
    }

    /// Delete the account on the server, then drop the local session
    pub async fn delete_account(&self) -> ClientResult<()> {
        if let Err(e) = self.auth.delete_account().await {
            self.dispatch(SessionAction::SetError(e.to_string()));
            return Err(e);
        }

        self.client.tokens().clear_tokens().await;
        self.dispatch(SessionAction::Logout);
        self.client.emit(AuthEvent::LoggedOut);
        info!("Account deleted");
        Ok(())
    }

    pub fn clear_error(&self) {
        self.dispatch(SessionAction::ClearError);
    }

    /// React to pipeline events raised outside the controller.
    ///
    /// Only a signed-in session is ended. A session that is already signed
    /// out, or is being decided by `check_auth`, `login` or `logout`, keeps
    /// the outcome those operations record.
    pub fn handle_event(&self, event: &AuthEvent) {
        if let AuthEvent::LoginRequired { reason } = event {
            let ended = self.state.send_if_modified(|session| {
                if !session.is_authenticated {
                    return false;
                }
                *session = std::mem::take(session).reduce(SessionAction::Failure(reason.clone()));
                true
            });
            if ended {
                info!(%reason, "Session ended by failed token refresh");
            } else {
                debug!(%reason, "Login required while signed out, ignoring");
            }
        }
    }

    /// Forward pipeline events into the session until the client goes away
    pub fn spawn_event_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);
        let mut events = self.client.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match controller.upgrade() {
                        Some(controller) => controller.handle_event(&event),
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session listener lagged behind auth events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
