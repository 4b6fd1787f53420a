use crate::clock::Clock;
use crate::errors::FlowError;
use crate::locator::Locator;
use crate::selector::Matcher;
use crate::surface::Surface;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

const FIELD_WAIT: Duration = Duration::from_secs(10);

/// Selectors for the credential form of the web login variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialLayout {
    pub username: Matcher,
    pub password: Matcher,
    pub submit: Matcher,
    pub error_message: Matcher,
    /// Element that only exists once the login landed, e.g. the dashboard.
    pub success_indicator: Matcher,
}

impl Default for CredentialLayout {
    fn default() -> Self {
        Self {
            username: Matcher::css("#username"),
            password: Matcher::css("#password"),
            submit: Matcher::css("#login-button"),
            error_message: Matcher::css(".error-message"),
            success_indicator: Matcher::css(".dashboard"),
        }
    }
}

/// Username/password login for the web variant of the flow.
pub struct CredentialLogin {
    layout: CredentialLayout,
    clock: Arc<dyn Clock>,
}

impl CredentialLogin {
    pub fn new(layout: CredentialLayout, clock: Arc<dyn Clock>) -> Self {
        Self { layout, clock }
    }

    /// Fill both fields and submit. The caller checks the outcome via
    /// [`Self::is_logged_in`] or [`Self::error_message`].
    #[instrument(skip(self, surface, password))]
    pub async fn login(
        &self,
        surface: &Surface,
        username: &str,
        password: &str,
    ) -> Result<(), FlowError> {
        let field = self.wait(surface, &self.layout.username).await?;
        field.fill(username).await?;
        let field = self.wait(surface, &self.layout.password).await?;
        field.fill(password).await?;
        let submit = self.wait(surface, &self.layout.submit).await?;
        submit.click().await?;
        info!(user = username, "credentials submitted");
        surface.settle(Duration::from_secs(5)).await
    }

    pub async fn is_logged_in(&self, surface: &Surface) -> bool {
        match surface.count(&self.layout.success_indicator).await {
            Ok(n) => n > 0,
            Err(_) => false,
        }
    }

    /// Visible error text, if the form rejected the credentials.
    pub async fn error_message(&self, surface: &Surface) -> Option<String> {
        let elements = surface.find_all(&self.layout.error_message).await.ok()?;
        for element in elements {
            if element.is_visible().await.unwrap_or(false) {
                return element.text().await.ok();
            }
        }
        None
    }

    async fn wait(
        &self,
        surface: &Surface,
        matcher: &Matcher,
    ) -> Result<crate::surface::Element, FlowError> {
        Locator::new(surface.clone(), matcher.clone(), self.clock.clone())
            .wait_visible(Some(FIELD_WAIT))
            .await
    }
}
