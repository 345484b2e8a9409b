//! Typed emitter facade called by business handlers after a mutation.
//!
//! Each helper shapes a domain object into the generic event payload and
//! records it through the event service. Emission is best-effort relative to
//! the business operation: failures are logged here and never propagate to
//! the caller.

use serde_json::json;

use crate::events::EventService;
use crate::types::{EventType, ProjectId, TenantId};

/// Fire-and-forget emitters for every domain event kind.
#[derive(Clone)]
pub struct Emitter {
    events: EventService,
}

impl Emitter {
    pub fn new(events: EventService) -> Self {
        Self { events }
    }

    pub async fn emit_project_created(&self, tenant_id: TenantId, project_id: ProjectId, name: &str) {
        let data = json!({ "projectId": project_id.0, "name": name });
        self.emit(EventType::ProjectCreated, tenant_id, Some(project_id), data)
            .await;
    }

    pub async fn emit_project_updated(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        changes: &[&str],
    ) {
        let data = json!({ "projectId": project_id.0, "changes": changes });
        self.emit(EventType::ProjectUpdated, tenant_id, Some(project_id), data)
            .await;
    }

    pub async fn emit_work_item_created(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        work_item_id: &str,
        title: &str,
    ) {
        let data = json!({ "workItemId": work_item_id, "title": title });
        self.emit(EventType::WorkItemCreated, tenant_id, Some(project_id), data)
            .await;
    }

    pub async fn emit_work_item_updated(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        work_item_id: &str,
        changes: &[&str],
    ) {
        let data = json!({ "workItemId": work_item_id, "changes": changes });
        self.emit(EventType::WorkItemUpdated, tenant_id, Some(project_id), data)
            .await;
    }

    pub async fn emit_work_item_completed(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        work_item_id: &str,
    ) {
        let data = json!({ "workItemId": work_item_id });
        self.emit(EventType::WorkItemCompleted, tenant_id, Some(project_id), data)
            .await;
    }

    pub async fn emit_approval_requested(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        approval_id: &str,
        requested_by: &str,
    ) {
        let data = json!({ "approvalId": approval_id, "requestedBy": requested_by });
        self.emit(EventType::ApprovalRequested, tenant_id, Some(project_id), data)
            .await;
    }

    pub async fn emit_approval_decided(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        approval_id: &str,
        approved: bool,
        decided_by: &str,
    ) {
        let data = json!({
            "approvalId": approval_id,
            "approved": approved,
            "decidedBy": decided_by,
        });
        self.emit(EventType::ApprovalDecided, tenant_id, Some(project_id), data)
            .await;
    }

    pub async fn emit_insights_updated(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        period: &str,
    ) {
        let data = json!({ "projectId": project_id.0, "period": period });
        self.emit(EventType::InsightsUpdated, tenant_id, Some(project_id), data)
            .await;
    }

    pub async fn emit_message_created(
        &self,
        tenant_id: TenantId,
        project_id: Option<ProjectId>,
        message_id: &str,
        author_id: &str,
    ) {
        let data = json!({ "messageId": message_id, "authorId": author_id });
        self.emit(EventType::MessageCreated, tenant_id, project_id, data)
            .await;
    }

    pub async fn emit_export_completed(
        &self,
        tenant_id: TenantId,
        project_id: Option<ProjectId>,
        export_id: &str,
        format: &str,
    ) {
        let data = json!({ "exportId": export_id, "format": format });
        self.emit(EventType::ExportCompleted, tenant_id, project_id, data)
            .await;
    }

    /// Record and dispatch; swallow failures so webhook emission can never
    /// fail the business mutation that triggered it.
    async fn emit(
        &self,
        event_type: EventType,
        tenant_id: TenantId,
        project_id: Option<ProjectId>,
        data: serde_json::Value,
    ) {
        if let Err(e) = self
            .events
            .create_event(event_type, tenant_id, project_id, data)
            .await
        {
            tracing::warn!(
                target: "webhook_delivery",
                event_type = %event_type,
                error = %e,
                "Failed to emit webhook event"
            );
        }
    }
}
