//! Shared application state.

use std::sync::Arc;

use thiserror::Error;

use crate::auth::JwtService;
use crate::config::AppConfig;
use crate::services::ai::{AiError, GeminiClient, TextGenerator};
use crate::services::email::{EmailService, Notifier};
use crate::services::events::EventPublisher;
use crate::services::vnpay::Vnpay;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to configure SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("failed to configure AI client: {0}")]
    Ai(#[from] AiError),
}

/// Cheap to clone; everything lives behind one `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    store: Arc<dyn Store>,
    jwt: JwtService,
    vnpay: Option<Vnpay>,
    ai: Option<Arc<dyn TextGenerator>>,
    notifier: Notifier,
    events: EventPublisher,
}

impl AppState {
    /// Builds every integration the configuration enables. NATS is attached
    /// separately because connecting is async.
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Result<Self, StateError> {
        let ai = match &config.gemini {
            Some(gemini) => Some(Arc::new(GeminiClient::new(gemini)?) as Arc<dyn TextGenerator>),
            None => None,
        };
        let email = config.email.as_ref().map(EmailService::new).transpose()?;
        Ok(Self::with_parts(config, store, ai, Notifier::new(email), EventPublisher::default()))
    }

    pub fn with_parts(
        config: AppConfig,
        store: Arc<dyn Store>,
        ai: Option<Arc<dyn TextGenerator>>,
        notifier: Notifier,
        events: EventPublisher,
    ) -> Self {
        let jwt = JwtService::new(&config.jwt);
        let vnpay = config.vnpay.as_ref().map(Vnpay::new);
        Self { inner: Arc::new(AppStateInner { config, store, jwt, vnpay, ai, notifier, events }) }
    }

    /// Same state with a different event publisher.
    pub fn with_events(self, events: EventPublisher) -> Self {
        let inner = &self.inner;
        Self::with_parts(inner.config.clone(), inner.store.clone(), inner.ai.clone(), inner.notifier.clone(), events)
    }

    pub fn config(&self) -> &AppConfig { &self.inner.config }
    pub fn store(&self) -> &dyn Store { self.inner.store.as_ref() }
    pub fn jwt(&self) -> &JwtService { &self.inner.jwt }
    pub fn vnpay(&self) -> Option<&Vnpay> { self.inner.vnpay.as_ref() }
    pub fn ai(&self) -> Option<&dyn TextGenerator> { self.inner.ai.as_deref() }
    pub fn notifier(&self) -> &Notifier { &self.inner.notifier }
    pub fn events(&self) -> &EventPublisher { &self.inner.events }
}
