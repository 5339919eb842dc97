// 🛡️ Verification Gate - session, role, freshness and anti-abuse checks
//
// Runs before every mutating transition and never touches the store.
// Check order: authentication → role → freshness → external verification,
// so the network round-trip only happens for requests that could succeed.

use crate::error::GateRejection;
use crate::schema::Proof;
use crate::temporal::from_epoch_millis;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default reCAPTCHA v3 verification endpoint
pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

// ============================================================================
// ACTIONS + CALLER
// ============================================================================

/// Action name a verification token is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Approve,
    Remove,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Approve => "approve",
            Action::Remove => "remove",
            Action::Delete => "delete",
        }
    }

    /// Approving and rejecting proposals is reserved for administrators
    pub fn requires_admin(&self) -> bool {
        matches!(self, Action::Approve | Action::Remove)
    }
}

/// Who is calling, as established by the session layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub user: Option<String>,
    pub is_admin: bool,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(name: &str) -> Self {
        CallerContext {
            user: Some(name.to_string()),
            is_admin: false,
        }
    }

    pub fn admin(name: &str) -> Self {
        CallerContext {
            user: Some(name.to_string()),
            is_admin: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Name recorded on audit events
    pub fn actor(&self) -> &str {
        self.user.as_deref().unwrap_or("anonymous")
    }
}

// ============================================================================
// CLOCK
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ============================================================================
// TOKEN VERIFIER
// ============================================================================

/// Verdict returned by the anti-abuse service (`siteverify` response body)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VerificationOutcome {
    pub success: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("verification service answered {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerificationOutcome, VerifyError>;
}

/// Google reCAPTCHA v3 client
pub struct RecaptchaVerifier {
    http_client: reqwest::Client,
    verify_url: String,
    secret: String,
}

impl RecaptchaVerifier {
    pub fn new(
        secret: String,
        verify_url: String,
        timeout: std::time::Duration,
    ) -> Result<Self, VerifyError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            verify_url,
            secret,
        })
    }
}

#[async_trait]
impl TokenVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<VerificationOutcome, VerifyError> {
        let response = self
            .http_client
            .post(&self.verify_url)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VerifyError::Status(response.status()));
        }

        Ok(response.json::<VerificationOutcome>().await?)
    }
}

// ============================================================================
// GATE
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Largest accepted distance between client submission time and now
    pub freshness: Duration,
    pub min_score: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::minutes(2),
            min_score: 0.7,
        }
    }
}

#[derive(Clone)]
pub struct VerificationGate {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn TokenVerifier>,
}

impl VerificationGate {
    pub fn new(config: GateConfig, clock: Arc<dyn Clock>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            config,
            clock,
            verifier,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Role check alone, for reads reserved to administrators
    pub fn require_admin(&self, caller: &CallerContext) -> Result<(), GateRejection> {
        if !caller.is_authenticated() {
            return Err(GateRejection::Unauthenticated);
        }
        if !caller.is_admin {
            return Err(GateRejection::Forbidden);
        }
        Ok(())
    }

    /// Run every check for `action`. On acceptance returns the time of
    /// check, which the caller uses as the commit timestamp.
    pub async fn authorize(
        &self,
        action: Action,
        proof: &Proof,
        caller: &CallerContext,
        hostname: &str,
    ) -> Result<DateTime<Utc>, GateRejection> {
        let result = self.run_checks(action, proof, caller, hostname).await;

        if let Err(rejection) = &result {
            warn!(
                action = action.as_str(),
                actor = caller.actor(),
                reason = %rejection,
                "Gate rejected request"
            );
        }

        result
    }

    async fn run_checks(
        &self,
        action: Action,
        proof: &Proof,
        caller: &CallerContext,
        hostname: &str,
    ) -> Result<DateTime<Utc>, GateRejection> {
        if !caller.is_authenticated() {
            return Err(GateRejection::Unauthenticated);
        }
        if action.requires_admin() && !caller.is_admin {
            return Err(GateRejection::Forbidden);
        }

        let now = self.clock.now();
        let submitted = from_epoch_millis(proof.submitted_at_ms).ok_or(GateRejection::Stale)?;
        if (now - submitted).abs() > self.config.freshness {
            return Err(GateRejection::Stale);
        }

        let outcome = match self.verifier.verify(&proof.token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(action = action.as_str(), error = %e, "Verification service unreachable");
                return Err(GateRejection::FailedVerification);
            }
        };

        debug!(
            action = action.as_str(),
            success = outcome.success,
            score = outcome.score,
            token_action = %outcome.action,
            token_hostname = %outcome.hostname,
            "Verification verdict"
        );

        let accepted = outcome.success
            && outcome.score >= self.config.min_score
            && outcome.action == action.as_str()
            && outcome.hostname == hostname;

        if accepted {
            Ok(now)
        } else {
            Err(GateRejection::FailedVerification)
        }
    }
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub const HOST: &str = "catalog.test";

    /// Verifier answering every token with one canned verdict
    pub struct ScriptedVerifier {
        pub outcome: Option<VerificationOutcome>,
        pub calls: AtomicUsize,
    }

    impl ScriptedVerifier {
        /// Passes any action with the given score
        pub fn passing(score: f64) -> Self {
            Self {
                outcome: Some(VerificationOutcome {
                    success: true,
                    score,
                    action: String::new(),
                    hostname: HOST.to_string(),
                    error_codes: Vec::new(),
                }),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn unreachable() -> Self {
            Self {
                outcome: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenVerifier for ScriptedVerifier {
        async fn verify(&self, token: &str) -> Result<VerificationOutcome, VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcome = self
                .outcome
                .clone()
                .ok_or(VerifyError::Status(reqwest::StatusCode::BAD_GATEWAY))?;
            // Tokens are minted per action as "<action>-token"
            if outcome.action.is_empty() {
                outcome.action = token.split('-').next().unwrap_or_default().to_string();
            }
            Ok(outcome)
        }
    }

    pub fn proof(action: Action, submitted_at: DateTime<Utc>) -> Proof {
        Proof {
            submitted_at_ms: submitted_at.timestamp_millis(),
            token: format!("{}-token", action.as_str()),
        }
    }
}
