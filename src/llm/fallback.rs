use log::{ error, info, warn };
use std::sync::Arc;

use super::chat::{ AttemptError, ChatProvider, ChatRequest, FailureKind };
use crate::error::AppError;

/// What the chain does after a strategy fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Next,
    Stop,
}

/// Billing problems cannot be fixed by trying another credential.
pub fn classify(err: &AttemptError) -> Disposition {
    match err.kind {
        FailureKind::Payment => Disposition::Stop,
        _ => Disposition::Next,
    }
}

/// Ordered provider strategies, tried one after another until one returns text.
#[derive(Clone, Default)]
pub struct FallbackChain {
    strategies: Vec<Arc<dyn ChatProvider>>,
}

impl FallbackChain {
    pub fn new(strategies: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self { strategies }
    }

    /// Primaries first, in configured order, then the optional secondary.
    pub fn from_parts(
        primaries: Vec<Arc<dyn ChatProvider>>,
        secondary: Option<Arc<dyn ChatProvider>>
    ) -> Self {
        let mut strategies = primaries;
        strategies.extend(secondary);
        Self { strategies }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub async fn complete(&self, request: &ChatRequest) -> Result<String, AppError> {
        if self.strategies.is_empty() {
            error!("No AI provider credentials configured");
            return Err(AppError::Misconfigured("No AI provider credentials configured".into()));
        }

        let mut failures: Vec<AttemptError> = Vec::new();
        for (index, strategy) in self.strategies.iter().enumerate() {
            info!(
                "Attempting provider {} ({}/{}) with {} messages",
                strategy.label(),
                index + 1,
                self.strategies.len(),
                request.messages.len()
            );
            match strategy.attempt(request).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(text);
                }
                Ok(_) => {
                    warn!("Provider {} #{} returned empty text", strategy.label(), index + 1);
                    failures.push(AttemptError::empty());
                }
                Err(err) => {
                    warn!("Provider {} #{} failed: {}", strategy.label(), index + 1, err);
                    let disposition = classify(&err);
                    failures.push(err);
                    if disposition == Disposition::Stop {
                        break;
                    }
                }
            }
        }

        let err = exhausted_error(&failures);
        error!("All AI providers exhausted after {} attempts: {}", failures.len(), err);
        Err(err)
    }
}

/// Picks the caller-facing category for a chain that produced no text.
fn exhausted_error(failures: &[AttemptError]) -> AppError {
    if let Some(payment) = failures.iter().find(|f| f.kind == FailureKind::Payment) {
        return AppError::PaymentRequired(payment.message.clone());
    }
    match failures.last() {
        Some(last) if last.kind == FailureKind::Quota => {
            AppError::RateLimited(format!("All AI providers exhausted: {}", last.message))
        }
        Some(last) =>
            AppError::Unknown {
                status: last.status,
                message: format!("All AI providers exhausted: {}", last.message),
            },
        None => AppError::unknown("All AI providers exhausted"),
    }
}
