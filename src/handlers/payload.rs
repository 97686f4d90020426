//! Task payload routing.

use crate::config::AgentIdentity;
use crate::dispatch::{MessageHandler, Outbound};
use crate::engine::TaskEngine;
use crate::error::HandlerError;
use crate::messages::{AckRequest, ControlMessage, MessageKind, OutboundMessage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hands task payloads to the engine, advances the manifest cursor, and
/// acknowledges the frame.
///
/// Engine failures are logged but do not suppress the acknowledgement: the
/// control endpoint retransmits task state through regular reconciliation,
/// not through unacked frames.
pub struct PayloadHandler {
    engine: Arc<dyn TaskEngine>,
    cluster_arn: String,
    container_instance_arn: String,
    seq_num: Option<Arc<AtomicI64>>,
}

impl PayloadHandler {
    /// Handler acknowledging on behalf of `identity`, advancing `seq_num`
    /// when the manifest cursor feature is enabled.
    pub fn new(
        engine: Arc<dyn TaskEngine>,
        identity: &AgentIdentity,
        seq_num: Option<Arc<AtomicI64>>,
    ) -> Self {
        Self {
            engine,
            cluster_arn: identity.cluster_arn.clone(),
            container_instance_arn: identity.container_instance_arn.clone(),
            seq_num,
        }
    }
}

#[async_trait]
impl MessageHandler for PayloadHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::Payload
    }

    async fn handle(
        &self,
        msg: &ControlMessage,
        outbound: &dyn Outbound,
    ) -> Result<(), HandlerError> {
        let ControlMessage::Payload(payload) = msg else {
            return Err(HandlerError::MalformedMessage(format!(
                "payload handler routed a {} message",
                msg.kind()
            )));
        };

        // The cursor never moves backwards; a replayed frame leaves it alone.
        if let Some(seq) = &self.seq_num {
            seq.fetch_max(payload.seq_num, Ordering::AcqRel);
        }

        debug!(
            message_id = %payload.message_id,
            tasks = payload.tasks.len(),
            seq_num = payload.seq_num,
            "payload received"
        );

        if let Err(e) = self.engine.dispatch(payload.tasks.clone()).await {
            warn!(message_id = %payload.message_id, error = %e, "task engine rejected payload");
        }

        outbound
            .send(OutboundMessage::Ack(AckRequest {
                message_id: payload.message_id.clone(),
                cluster_arn: self.cluster_arn.clone(),
                container_instance_arn: self.container_instance_arn.clone(),
            }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::error::ClientError;
    use crate::messages::{PayloadMessage, TaskPayload};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl Outbound for RecordingOutbound {
        async fn send(&self, msg: OutboundMessage) -> Result<(), ClientError> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEngine {
        dispatched: Mutex<Vec<Vec<TaskPayload>>>,
        fail: bool,
    }

    #[async_trait]
    impl TaskEngine for RecordingEngine {
        fn version(&self) -> String {
            "test".into()
        }

        async fn dispatch(&self, tasks: Vec<TaskPayload>) -> Result<(), EngineError> {
            self.dispatched.lock().unwrap().push(tasks);
            if self.fail {
                Err(EngineError::Dispatch("engine down".into()))
            } else {
                Ok(())
            }
        }

        fn assign_credentials(
            &self,
            _task_arn: &str,
            _credentials_id: &str,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn identity() -> AgentIdentity {
        AgentIdentity::new("someCluster", "myContainerInstance", "1.2.3", "abc")
    }

    fn payload(seq_num: i64) -> ControlMessage {
        ControlMessage::Payload(PayloadMessage {
            message_id: "m-1".into(),
            cluster_arn: "someCluster".into(),
            container_instance_arn: "myContainerInstance".into(),
            tasks: vec![TaskPayload { arn: "t1".into(), desired_status: "RUNNING".into() }],
            seq_num,
        })
    }

    #[tokio::test]
    async fn dispatches_then_acks() {
        let engine = Arc::new(RecordingEngine::default());
        let outbound = RecordingOutbound::default();
        let handler = PayloadHandler::new(engine.clone(), &identity(), None);

        handler.handle(&payload(5), &outbound).await.expect("handles");

        assert_eq!(engine.dispatched.lock().unwrap().len(), 1);
        let sent = outbound.sent.lock().unwrap();
        match &sent[0] {
            OutboundMessage::Ack(ack) => {
                assert_eq!(ack.message_id, "m-1");
                assert_eq!(ack.cluster_arn, "someCluster");
                assert_eq!(ack.container_instance_arn, "myContainerInstance");
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn seq_num_is_monotonic() {
        let seq = Arc::new(AtomicI64::new(1));
        let handler =
            PayloadHandler::new(Arc::new(RecordingEngine::default()), &identity(), Some(seq.clone()));
        let outbound = RecordingOutbound::default();

        handler.handle(&payload(7), &outbound).await.expect("handles");
        assert_eq!(seq.load(Ordering::Acquire), 7);

        // Replay with an older cursor must not regress.
        handler.handle(&payload(3), &outbound).await.expect("handles");
        assert_eq!(seq.load(Ordering::Acquire), 7);
    }

    #[tokio::test]
    async fn engine_failure_still_acks() {
        let engine = Arc::new(RecordingEngine { fail: true, ..Default::default() });
        let outbound = RecordingOutbound::default();
        let handler = PayloadHandler::new(engine, &identity(), None);

        handler.handle(&payload(1), &outbound).await.expect("handles");
        assert_eq!(outbound.sent.lock().unwrap().len(), 1);
    }
}
