//! The messaging transport seen from the core.
//!
//! [`Transport`] is what the dispatcher talks to. [`BridgeTransport`] is the
//! production implementation: requests are written to the bridge socket as
//! JSON and answered by `result` frames that the server routes back through
//! [`BridgeTransport::resolve`].

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{
    BridgeRequest, GroupMetadata, GroupSetting, ParticipantAction, ParticipantResult,
    RequestEnvelope,
};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No bridge connected")]
    Disconnected,
    #[error("Bridge did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Bridge rejected request: {0}")]
    Rejected(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(
        &self,
        to: &str,
        text: &str,
        mentions: &[String],
        quoted_id: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn delete_message(
        &self,
        chat: &str,
        message_id: &str,
        participant: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, TransportError>;

    async fn update_participants(
        &self,
        group: &str,
        action: ParticipantAction,
        participants: &[String],
    ) -> Result<Vec<ParticipantResult>, TransportError>;

    async fn invite_code(&self, group: &str) -> Result<String, TransportError>;

    async fn revoke_invite(&self, group: &str) -> Result<(), TransportError>;

    async fn set_group_setting(&self, group: &str, setting: GroupSetting) -> Result<(), TransportError>;

    async fn remove_participant(&self, group: &str, subject: &str) -> Result<(), TransportError> {
        let results = self
            .update_participants(group, ParticipantAction::Remove, &[subject.to_string()])
            .await?;
        match results.into_iter().find(|r| r.status != "200") {
            Some(failed) => Err(TransportError::Rejected(format!("status {}", failed.status))),
            None => Ok(()),
        }
    }
}

type Reply = Result<Option<Value>, String>;

pub struct BridgeTransport {
    outbound: RwLock<Option<mpsc::UnboundedSender<String>>>,
    pending: DashMap<String, oneshot::Sender<Reply>>,
    timeout: Duration,
}

impl BridgeTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            outbound: RwLock::new(None),
            pending: DashMap::new(),
            timeout,
        }
    }

    /// Installs the writer half of a freshly connected bridge. Returns false
    /// if another bridge is already attached.
    pub fn attach(&self, sender: mpsc::UnboundedSender<String>) -> bool {
        let mut outbound = self.outbound.write();
        if outbound.as_ref().map_or(false, |tx| !tx.is_closed()) {
            return false;
        }
        *outbound = Some(sender);
        true
    }

    /// Detaches the bridge owning `sender` and fails every in-flight request.
    /// A bridge that was already replaced leaves the current one untouched.
    pub fn detach(&self, sender: &mpsc::UnboundedSender<String>) {
        {
            let mut outbound = self.outbound.write();
            if !outbound.as_ref().map_or(false, |tx| tx.same_channel(sender)) {
                debug!("Stale bridge detached, keeping the current one");
                return;
            }
            *outbound = None;
        }
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            warn!("Bridge detached with {} pending requests", dropped);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.outbound.read().as_ref().map_or(false, |tx| !tx.is_closed())
    }

    pub fn resolve(&self, request_id: &str, ok: bool, data: Option<Value>, error: Option<String>) {
        let Some((_, waiter)) = self.pending.remove(request_id) else {
            debug!("Result for unknown request {}", request_id);
            return;
        };
        let reply = if ok {
            Ok(data)
        } else {
            Err(error.unwrap_or_else(|| "unspecified error".into()))
        };
        let _ = waiter.send(reply);
    }

    async fn request(&self, request: BridgeRequest) -> Result<Option<Value>, TransportError> {
        let request_id = Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&RequestEnvelope {
            request_id: request_id.clone(),
            request,
        })
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        let sent = match self.outbound.read().as_ref() {
            Some(outbound) => outbound.send(frame).is_ok(),
            None => false,
        };
        if !sent {
            self.pending.remove(&request_id);
            return Err(TransportError::Disconnected);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(message))) => Err(TransportError::Rejected(message)),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(TransportError::Timeout(self.timeout))
            }
        }
    }

    async fn request_as<T: DeserializeOwned>(&self, request: BridgeRequest) -> Result<T, TransportError> {
        let data = self
            .request(request)
            .await?
            .ok_or_else(|| TransportError::InvalidResponse("missing data".into()))?;
        serde_json::from_value(data).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn send_text(
        &self,
        to: &str,
        text: &str,
        mentions: &[String],
        quoted_id: Option<&str>,
    ) -> Result<(), TransportError> {
        self.request(BridgeRequest::SendText {
            to: to.to_string(),
            text: text.to_string(),
            mentions: mentions.to_vec(),
            quoted_id: quoted_id.map(str::to_string),
        })
        .await
        .map(|_| ())
    }

    async fn delete_message(
        &self,
        chat: &str,
        message_id: &str,
        participant: Option<&str>,
    ) -> Result<(), TransportError> {
        self.request(BridgeRequest::DeleteMessage {
            chat: chat.to_string(),
            message_id: message_id.to_string(),
            participant: participant.map(str::to_string),
        })
        .await
        .map(|_| ())
    }

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, TransportError> {
        self.request_as(BridgeRequest::GroupMetadata {
            group: group.to_string(),
        })
        .await
    }

    async fn update_participants(
        &self,
        group: &str,
        action: ParticipantAction,
        participants: &[String],
    ) -> Result<Vec<ParticipantResult>, TransportError> {
        let data = self
            .request(BridgeRequest::UpdateParticipants {
                group: group.to_string(),
                action,
                participants: participants.to_vec(),
            })
            .await?;
        match data {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| TransportError::InvalidResponse(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn invite_code(&self, group: &str) -> Result<String, TransportError> {
        self.request_as(BridgeRequest::InviteCode {
            group: group.to_string(),
        })
        .await
    }

    async fn revoke_invite(&self, group: &str) -> Result<(), TransportError> {
        self.request(BridgeRequest::RevokeInvite {
            group: group.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn set_group_setting(&self, group: &str, setting: GroupSetting) -> Result<(), TransportError> {
        self.request(BridgeRequest::GroupSetting {
            group: group.to_string(),
            setting,
        })
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn parse_envelope(frame: &str) -> RequestEnvelope {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn test_request_without_bridge_fails_fast() {
        let transport = BridgeTransport::new(Duration::from_secs(1));
        let err = transport.invite_code("1@g.us").await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
    }

    #[tokio::test]
    async fn test_result_is_routed_to_waiting_request() {
        let transport = Arc::new(BridgeTransport::new(Duration::from_secs(5)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(transport.attach(tx));

        let bridge = transport.clone();
        let responder = tokio::spawn(async move {
            let frame = rx.recv().await.unwrap();
            let envelope = parse_envelope(&frame);
            assert_eq!(
                envelope.request,
                BridgeRequest::InviteCode { group: "1@g.us".into() }
            );
            bridge.resolve(&envelope.request_id, true, Some(json!("AbCdEf")), None);
        });

        assert_eq!(transport.invite_code("1@g.us").await.unwrap(), "AbCdEf");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_result_surfaces_error() {
        let transport = Arc::new(BridgeTransport::new(Duration::from_secs(5)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.attach(tx);

        let bridge = transport.clone();
        tokio::spawn(async move {
            let envelope = parse_envelope(&rx.recv().await.unwrap());
            bridge.resolve(&envelope.request_id, false, None, Some("not-authorized".into()));
        });

        let err = transport
            .remove_participant("1@g.us", "a@s.whatsapp.net")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(ref m) if m == "not-authorized"));
    }

    #[tokio::test]
    async fn test_refused_participant_fails_removal() {
        let transport = Arc::new(BridgeTransport::new(Duration::from_secs(5)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.attach(tx);

        let bridge = transport.clone();
        tokio::spawn(async move {
            let envelope = parse_envelope(&rx.recv().await.unwrap());
            let data = json!([{"id": "a@s.whatsapp.net", "status": "403"}]);
            bridge.resolve(&envelope.request_id, true, Some(data), None);
        });

        let err = transport
            .remove_participant("1@g.us", "a@s.whatsapp.net")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(ref m) if m == "status 403"));
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let transport = BridgeTransport::new(Duration::from_millis(20));
        let (tx, _rx) = mpsc::unbounded_channel();
        transport.attach(tx);

        let err = transport.revoke_invite("1@g.us").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert!(transport.pending.is_empty());
    }

    #[tokio::test]
    async fn test_second_bridge_is_refused_until_detach() {
        let transport = BridgeTransport::new(Duration::from_secs(1));
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        assert!(transport.attach(tx1.clone()));
        assert!(!transport.attach(tx2.clone()));
        transport.detach(&tx1);
        assert!(!transport.is_attached());
        assert!(transport.attach(tx2));
    }

    #[tokio::test]
    async fn test_late_detach_keeps_replacement_bridge() {
        let transport = Arc::new(BridgeTransport::new(Duration::from_secs(5)));
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        assert!(transport.attach(tx_a.clone()));
        // the first bridge's writer exits before its reader cleans up
        drop(rx_a);
        assert!(transport.attach(tx_b.clone()));

        transport.detach(&tx_a);
        assert!(transport.is_attached());

        let bridge = transport.clone();
        tokio::spawn(async move {
            let envelope = parse_envelope(&rx_b.recv().await.unwrap());
            bridge.resolve(&envelope.request_id, true, Some(json!("Live")), None);
        });
        assert_eq!(transport.invite_code("1@g.us").await.unwrap(), "Live");

        transport.detach(&tx_b);
        assert!(!transport.is_attached());
    }
}
