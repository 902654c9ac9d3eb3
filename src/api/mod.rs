// HTTP APIs: webhook receiver plus operational endpoints

pub mod adapters;
pub mod compatibility;
pub mod connection;
pub mod webhooks;

pub use adapters::{create_adapter_router, AdapterApiState};
pub use compatibility::create_compatibility_router;
pub use connection::{create_connection_router, ConnectionAppState};
pub use webhooks::{create_webhook_router, WebhookAppState, WebhookPlatformConfig};
