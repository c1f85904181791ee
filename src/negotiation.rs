//! Offer/answer negotiation
//!
//! Drives one full negotiation round: create the offer, apply it locally,
//! wait out ICE gathering, submit the completed offer to the remote exchange,
//! and apply the resulting answer. A server rejection short-circuits before
//! any remote description is applied.

use crate::config::IceWaitPolicy;
use crate::endpoint::{IceGatheringState, PeerEndpoint};
use crate::error::{Error, Result};
use crate::signaling::{OfferPayload, SignalingExchange, SignalingReply};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Callback invoked with the server's payload when negotiation is rejected
pub type RejectCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// One negotiation round against a remote exchange
pub struct Negotiator {
    endpoint: Arc<dyn PeerEndpoint>,
    exchange: Arc<dyn SignalingExchange>,
    session_id: String,
    ice_wait: IceWaitPolicy,
    on_reject: Option<RejectCallback>,
}

impl Negotiator {
    /// Build a negotiator for the given endpoint and exchange
    pub fn new(
        endpoint: Arc<dyn PeerEndpoint>,
        exchange: Arc<dyn SignalingExchange>,
        session_id: impl Into<String>,
        ice_wait: IceWaitPolicy,
    ) -> Self {
        Self {
            endpoint,
            exchange,
            session_id: session_id.into(),
            ice_wait,
            on_reject: None,
        }
    }

    /// Register a callback observing server rejections
    pub fn with_reject_callback(mut self, on_reject: RejectCallback) -> Self {
        self.on_reject = Some(on_reject);
        self
    }

    /// Run the full round. On success the remote answer has been applied.
    pub async fn run(&self) -> Result<()> {
        let offer = self.endpoint.create_offer().await?;
        debug!("local offer created");
        self.endpoint.set_local_description(offer).await?;

        self.wait_for_ice().await?;

        let local = self
            .endpoint
            .local_description()
            .await
            .ok_or_else(|| Error::transport("no local description after gathering"))?;
        let payload = OfferPayload::new(&local, self.session_id.clone());

        debug!(session_id = %payload.session_id, "submitting offer to remote exchange");
        let body = self.exchange.exchange(payload).await?;

        match SignalingReply::from_value(body)? {
            SignalingReply::Rejected(payload) => {
                if let Some(cb) = &self.on_reject {
                    cb(payload.clone());
                }
                Err(Error::NegotiationRejected { payload })
            }
            SignalingReply::Answer(answer) => {
                self.endpoint.set_remote_description(answer).await?;
                info!(session_id = %self.session_id, "negotiation complete");
                Ok(())
            }
        }
    }

    async fn wait_for_ice(&self) -> Result<()> {
        if self.endpoint.ice_gathering_state() == IceGatheringState::Complete {
            return Ok(());
        }
        let mut states = self.endpoint.subscribe_ice();
        match self.ice_wait {
            IceWaitPolicy::WaitForComplete => {
                states
                    .wait_for(|s| *s == IceGatheringState::Complete)
                    .await
                    .map_err(|_| Error::ChannelClosed)?;
            }
            IceWaitPolicy::FallbackAfter { timeout_ms } => {
                tokio::select! {
                    res = states.wait_for(|s| *s == IceGatheringState::Complete) => {
                        res.map_err(|_| Error::ChannelClosed)?;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                        debug!(timeout_ms, "ice gathering fallback elapsed, proceeding");
                    }
                }
            }
        }
        Ok(())
    }
}
