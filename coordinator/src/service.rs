//! RPC facade over the coordinator.
//!
//! Maps protocol messages onto coordinator operations and coordinator
//! errors onto an [`RpcStatus`] carrying `successful: false`. A transport
//! only has to decode a request, call the matching method and encode the
//! reply or status.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use twophase_common::Result;
use twophase_protocol::{IsSuccessful, Payment, PaymentId, RpcResult, RpcStatus};

use crate::coordinator::Coordinator;

/// The `TwoPhaseCommitServer` service surface.
#[async_trait]
pub trait TwoPhaseCommit: Send + Sync {
    /// Reserve `payment.amount` on `payment.from`.
    async fn get_lock(&self, payment: Payment) -> RpcResult;

    /// Apply a reserved payment.
    async fn commit(&self, payment_id: PaymentId) -> RpcResult;

    /// Drop a reserved payment.
    async fn abort(&self, payment_id: PaymentId) -> RpcResult;
}

/// Service implementation backed by a [`Coordinator`].
pub struct TwoPhaseCommitService {
    coordinator: Arc<Coordinator>,
}

impl TwoPhaseCommitService {
    /// Create a service for `coordinator`.
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Get the underlying coordinator.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }
}

fn reply(rpc: &'static str, outcome: Result<()>) -> RpcResult {
    match outcome {
        Ok(()) => Ok(IsSuccessful::yes()),
        Err(e) => {
            let status = RpcStatus::from(e);
            debug!(rpc, code = %status.code, "Call failed");
            Err(status)
        }
    }
}

#[async_trait]
impl TwoPhaseCommit for TwoPhaseCommitService {
    async fn get_lock(&self, payment: Payment) -> RpcResult {
        let outcome = self
            .coordinator
            .get_lock(
                payment.transaction_id(),
                payment.from_account(),
                payment.amount,
            )
            .await;
        reply("GetLock", outcome)
    }

    async fn commit(&self, payment_id: PaymentId) -> RpcResult {
        let outcome = self.coordinator.commit(payment_id.transaction_id()).await;
        reply("Commit", outcome)
    }

    async fn abort(&self, payment_id: PaymentId) -> RpcResult {
        let outcome = self.coordinator.abort(payment_id.transaction_id()).await;
        reply("Abort", outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use twophase_common::{AccountId, TransactionId};
    use twophase_ledger::InMemoryLedger;

    fn create_test_service() -> TwoPhaseCommitService {
        let ledger = Arc::new(InMemoryLedger::with_accounts([(AccountId::new(1), 100)]));
        let coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            "test-node-1".to_string(),
            ledger,
        );
        TwoPhaseCommitService::new(Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_get_lock_reply() {
        let service = create_test_service();
        let payment = Payment::new(TransactionId::new(5), AccountId::new(1), 40);

        assert_eq!(service.get_lock(payment.clone()).await, Ok(IsSuccessful::yes()));

        let status = service.get_lock(payment).await.unwrap_err();
        assert_eq!(status.code, "LOCK_CONFLICT");
        assert!(!status.reply.successful);
    }

    #[tokio::test]
    async fn test_commit_unknown_payment() {
        let service = create_test_service();

        let status = service
            .commit(PaymentId::new(TransactionId::new(999)))
            .await
            .unwrap_err();
        assert_eq!(status.code, "PAYMENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_abort_always_succeeds() {
        let service = create_test_service();
        let id = PaymentId::new(TransactionId::new(3));

        assert_eq!(service.abort(id.clone()).await, Ok(IsSuccessful::yes()));
        assert_eq!(service.abort(id).await, Ok(IsSuccessful::yes()));
    }
}
