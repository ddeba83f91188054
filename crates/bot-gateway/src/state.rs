use anyhow::Result;
use std::sync::Arc;

use crate::auth::{IdentityVerifier, PrincipalDirectory, TokenIssuer};
use crate::config::Settings;
use crate::security::{AdmissionConfig, AdmissionController, PolicyTable};
use crate::services::{
    conversation::{InMemorySessionStore, SessionLedger},
    BotRegistry, ChatResponder, ChatService, InMemoryBotRegistry,
};

/// Application state shared across handlers and middleware
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub verifier: Arc<IdentityVerifier>,
    pub issuer: Arc<TokenIssuer>,
    pub directory: Arc<dyn PrincipalDirectory>,
    pub admission: Arc<AdmissionController>,
    pub bots: Arc<dyn BotRegistry>,
    pub ledger: Arc<SessionLedger>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    /// Wires the in-process stores around the given directory and responder.
    /// Fails when the signing secret is missing or an override is invalid.
    pub fn build(
        settings: Settings,
        directory: Arc<dyn PrincipalDirectory>,
        responder: Arc<dyn ChatResponder>,
    ) -> Result<Self> {
        let table = PolicyTable::with_overrides(&settings.rate_limits.overrides)?;
        let admission = Arc::new(AdmissionController::in_memory(AdmissionConfig {
            enforced: settings.security.is_production_like(),
            table,
        }));
        Self::with_admission(settings, directory, responder, admission)
    }

    pub fn with_admission(
        settings: Settings,
        directory: Arc<dyn PrincipalDirectory>,
        responder: Arc<dyn ChatResponder>,
        admission: Arc<AdmissionController>,
    ) -> Result<Self> {
        let secret = settings.security.jwt_secret.as_deref();
        let verifier = Arc::new(IdentityVerifier::new(secret, directory.clone())?);
        let issuer = Arc::new(TokenIssuer::new(
            secret,
            settings.security.token_ttl_seconds,
        )?);

        let bots: Arc<dyn BotRegistry> = Arc::new(InMemoryBotRegistry::new());
        let ledger = Arc::new(SessionLedger::new(Arc::new(InMemorySessionStore::new())));
        let chat = Arc::new(ChatService::new(
            bots.clone(),
            ledger.clone(),
            responder,
            settings.chat.clone(),
        ));

        Ok(Self {
            settings,
            verifier,
            issuer,
            directory,
            admission,
            bots,
            ledger,
            chat,
        })
    }
}
