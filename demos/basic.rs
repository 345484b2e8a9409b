use std::sync::Arc;
use std::time::Duration;

use brandops_webhooks::{
    Dispatcher, DispatcherConfig, Emitter, EndpointRegistry, EventFilter, EventService,
    EventType, InMemoryStorage, ProjectId, RegistryConfig, Storage, TenantId,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::default(), storage.clone()));
    let registry = EndpointRegistry::new(storage.clone(), RegistryConfig::default());
    let events = EventService::new(storage.clone(), dispatcher.clone());
    let emitter = Emitter::new(events.clone());

    let tenant = TenantId("tenant_a".to_string());

    registry
        .create_endpoint(
            tenant.clone(),
            "https://example.com/webhook",
            "supersecret",
            vec![EventType::WorkItemCreated],
        )
        .await
        .expect("endpoint registration failed");

    emitter
        .emit_work_item_created(
            tenant.clone(),
            ProjectId("proj_1".to_string()),
            "wi_1",
            "Draft launch brief",
        )
        .await;

    tokio::time::sleep(Duration::from_secs(1)).await;

    for event in events.get_events(&tenant, &EventFilter::default(), None).await {
        println!("{} {} -> {:?}", event.id, event.event_type, event.status);
    }

    dispatcher.shutdown().await;
}
