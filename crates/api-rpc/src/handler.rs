//! RPC Method Handlers
//!
//! Thin translation between RPC types and the queue coordinator.

use crate::error::to_rpc_error;
use crate::types::{
    AdvanceRequest, JoinRequest, RemoveRequest, RemoveResponse, SettingsRequest,
    SettingsResponse, SnapshotRequest, StatsRequest,
};
use jsonrpsee::types::ErrorObjectOwned;
use queueline_core::application::{QueueCoordinator, SnapshotSubscription};
use queueline_core::domain::{QueueEntry, QueueSnapshot, QueueStats};
use std::sync::Arc;
use tracing::debug;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    coordinator: Arc<QueueCoordinator>,
}

impl RpcHandler {
    pub fn new(coordinator: Arc<QueueCoordinator>) -> Self {
        Self { coordinator }
    }

    /// queue.join.v1
    pub async fn join(&self, params: JoinRequest) -> Result<QueueEntry, ErrorObjectOwned> {
        self.coordinator.join(params).await.map_err(to_rpc_error)
    }

    /// queue.advance.v1
    pub async fn advance(&self, params: AdvanceRequest) -> Result<QueueEntry, ErrorObjectOwned> {
        self.coordinator
            .advance(&params.entry_id, params.status)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.remove.v1
    pub async fn remove(&self, params: RemoveRequest) -> Result<RemoveResponse, ErrorObjectOwned> {
        self.coordinator
            .remove(&params.entry_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(RemoveResponse {
            entry_id: params.entry_id,
            removed: true,
        })
    }

    /// queue.snapshot.v1
    pub async fn snapshot(
        &self,
        params: SnapshotRequest,
    ) -> Result<QueueSnapshot, ErrorObjectOwned> {
        self.coordinator
            .snapshot(&params.business_id, params.include_history)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.stats.v1
    pub async fn stats(&self, params: StatsRequest) -> Result<QueueStats, ErrorObjectOwned> {
        self.coordinator
            .stats(&params.business_id)
            .await
            .map_err(to_rpc_error)
    }

    /// admin.settings.v1
    pub fn settings(&self, params: SettingsRequest) -> Result<SettingsResponse, ErrorObjectOwned> {
        if let Some(minutes) = params.average_service_minutes {
            self.coordinator
                .set_average_service_minutes(minutes)
                .map_err(to_rpc_error)?;
        }

        Ok(SettingsResponse {
            average_service_minutes: self.coordinator.average_service_minutes(),
        })
    }

    /// queue.subscribe.v1
    pub async fn subscribe(
        &self,
        business_id: &str,
    ) -> Result<SnapshotSubscription, ErrorObjectOwned> {
        let subscription = self
            .coordinator
            .subscribe(business_id)
            .await
            .map_err(to_rpc_error)?;
        debug!(business_id, "RPC snapshot subscription opened");
        Ok(subscription)
    }
}
