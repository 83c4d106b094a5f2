use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::Settings;
use crate::session::Session;
use crate::steps::Steps;

pub const LOGIN_FORM: &str =
    r#"input[placeholder*="username"], input[placeholder*="Enter your username"]"#;
pub const USERNAME_FIELD: &str = r#"input[placeholder*="username"]"#;
pub const PASSWORD_FIELD: &str = r#"input[placeholder*="password"]"#;
pub const LOGIN_BUTTON: &str = r#"button:has-text("LOG IN")"#;

/// Diagnostic label for a failed login
pub const LOGIN_ERROR_LABEL: &str = "login_error";

/// Signs a session into the target application with the configured credentials
pub struct Authenticator {
    settings: Arc<Settings>,
}

impl Authenticator {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Returns `true` and marks the session authenticated on success.
    /// On failure a diagnostic snapshot is attempted and `false` returned.
    #[instrument(skip(self, session), fields(session = %session.id()))]
    pub async fn login(&self, session: &Session) -> bool {
        let steps = Steps::new(session, self.settings.clone());
        match self.sign_in(&steps).await {
            Ok(()) => {
                session.mark_authenticated();
                info!("logged in as {}", self.settings.username);
                true
            }
            Err(stage) => {
                error!("login failed: {}", stage);
                session
                    .capture_diagnostic(&self.settings.diagnostics_dir, LOGIN_ERROR_LABEL)
                    .await;
                false
            }
        }
    }

    async fn sign_in(&self, steps: &Steps) -> Result<(), &'static str> {
        let timeouts = &self.settings.timeouts;
        let settle = &self.settings.settle;

        if !steps.navigate(&self.settings.base_url, timeouts.navigation).await {
            return Err("entry page did not load");
        }
        if steps.wait_for(LOGIN_FORM, timeouts.login_form).await.is_none() {
            return Err("credential form never appeared");
        }
        if !steps
            .fill(USERNAME_FIELD, &self.settings.username, steps.default_timeout())
            .await
        {
            return Err("could not enter username");
        }
        steps.settle("username entry", settle.field_entry).await;
        if !steps
            .fill(PASSWORD_FIELD, &self.settings.password, steps.default_timeout())
            .await
        {
            return Err("could not enter password");
        }
        steps.settle("password entry", settle.field_entry).await;
        if !steps.wait_and_click(LOGIN_BUTTON, steps.default_timeout()).await {
            return Err("could not press the login button");
        }

        // The app sometimes swaps views without a navigation event
        if let Err(e) = steps
            .wait_for_navigation(timeouts.post_login_navigation)
            .await
        {
            warn!("no post-login navigation ({}), continuing", e);
            steps.settle("post-login", settle.post_login).await;
        }
        Ok(())
    }
}
