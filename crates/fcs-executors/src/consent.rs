//! Consent acquisition: one flow per token group, results gathered through
//! a bounded channel under a single deadline.

use std::sync::Arc;
use std::time::Duration;

use fcs_manifest::{SpecTokens, SpecType, build_permission_string};
use fcs_model::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::Executor;
use crate::controller::DaemonController;
use crate::error::ConsentError;
use crate::runner::{CLIENT_ACCESS_TOKEN, RunDefinition, TestCaseRunner};

/// Capacity of the consent channel. Flows never block on it.
pub const CONSENT_CHANNEL_CAPACITY: usize = 100;

/// Outcome of one consent flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConsentIdItem {
    pub token_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consent_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consent_id: String,
    /// Permission string the consent was requested with.
    #[serde(default)]
    pub permissions: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_access_token: String,
    /// Set when the flow failed; nothing else is meaningful then.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl TokenConsentIdItem {
    #[must_use]
    pub fn new(token_name: impl Into<String>, permissions: impl Into<String>) -> Self {
        Self {
            token_name: token_name.into(),
            permissions: permissions.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Collect `required` items from `rx`, giving up at `timeout` after the call.
///
/// # Errors
///
/// [`ConsentError::Timeout`] when the deadline passes first,
/// [`ConsentError::ChannelClosed`] when every sender is gone first, and
/// [`ConsentError::FlowsFailed`] when all items arrived but some carry an
/// error. Each variant holds the items received.
pub async fn wait_for_consent_ids(
    rx: &mut mpsc::Receiver<TokenConsentIdItem>,
    required: usize,
    timeout: Duration,
) -> Result<Vec<TokenConsentIdItem>, ConsentError> {
    let deadline = Instant::now() + timeout;
    let mut items = Vec::with_capacity(required);
    tracing::debug!(required, "waiting for consent items");

    while items.len() < required {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(item)) => {
                tracing::info!(
                    received = items.len() + 1,
                    required,
                    token_name = %item.token_name,
                    "consent item received"
                );
                items.push(item);
            }
            Ok(None) => {
                tracing::warn!(received = items.len(), required, "consent channel closed");
                return Err(ConsentError::ChannelClosed {
                    received: items.len(),
                    required,
                    items,
                });
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    received = items.len(),
                    required,
                    "consent channel timeout"
                );
                return Err(ConsentError::Timeout {
                    received: items.len(),
                    required,
                    items,
                });
            }
        }
    }

    let messages: Vec<String> = items
        .iter()
        .filter(|item| item.is_error())
        .map(|item| format!("{}: {}", item.token_name, item.error))
        .collect();
    if !messages.is_empty() {
        return Err(ConsentError::FlowsFailed { messages, items });
    }
    for item in &items {
        tracing::info!(token_name = %item.token_name, consent_id = %item.consent_id, "token acquired");
    }
    Ok(items)
}

/// Acquire consent for every token group that needs one.
///
/// Account groups with permissions each get a flow on their own runner,
/// using the component selected by the run config. Groups without
/// permissions need no consent. Payment consents are created by the
/// payment test cases themselves, so payment groups start no flow. On
/// success each consent id is written into `ctx` under its token name,
/// along with the client credentials token.
///
/// Step results are reported to `controller`.
///
/// # Errors
///
/// [`ConsentError::Dispatch`] if a flow cannot start, otherwise see
/// [`wait_for_consent_ids`].
#[tracing::instrument(skip_all, fields(specs = specs.len()))]
pub async fn get_psu_consent(
    definition: &Arc<RunDefinition>,
    executor: &Arc<dyn Executor>,
    controller: &Arc<dyn DaemonController>,
    ctx: &mut Context,
    specs: &[SpecTokens],
) -> Result<Vec<TokenConsentIdItem>, ConsentError> {
    let mode = definition.config.token_acquisition;
    let (tx, mut rx) = mpsc::channel(CONSENT_CHANNEL_CAPACITY);
    let mut dispatched = 0;

    for spec in specs {
        match spec.spec_type {
            SpecType::Accounts => {}
            SpecType::Payments => {
                tracing::debug!(spec = %spec.identifier, "payment consents are created by test cases");
                continue;
            }
            other => {
                tracing::warn!(spec = %spec.identifier, spec_type = %other, "consent acquisition not supported");
                continue;
            }
        }
        for token in spec.tokens.iter().filter(|t| !t.is_unrestricted()) {
            let runner = TestCaseRunner::consent_acquisition(
                Arc::clone(executor),
                Arc::clone(definition),
                Arc::clone(controller),
            );
            let item = TokenConsentIdItem::new(&token.name, build_permission_string(&token.perms));
            runner.run_consent_acquisition(item, ctx, mode, tx.clone())?;
            dispatched += 1;
        }
    }
    drop(tx);

    tracing::debug!(dispatched, %mode, "consent flows dispatched");
    let items = wait_for_consent_ids(&mut rx, dispatched, definition.config.consent_timeout()).await?;
    for item in &items {
        tracing::debug!(token_name = %item.token_name, "setting token consent id");
        ctx.put_string(item.token_name.clone(), item.consent_id.clone());
        if !item.client_access_token.is_empty() {
            ctx.put_string(CLIENT_ACCESS_TOKEN, item.client_access_token.clone());
        }
    }
    Ok(items)
}
