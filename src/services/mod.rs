//! Service layer
//!
//! The operation engine, its dispatcher, and the collaborators they talk
//! to: the git gateway, credential prompts, cancellation and notifications.

pub mod cancellation;
pub mod config;
pub mod credentials_service;
pub mod dispatcher;
pub mod gateway;
pub mod git_service;
pub mod notifications;
pub mod operation;

pub use cancellation::CancellationToken;
pub use config::OpsConfig;
pub use credentials_service::{CredentialPrompt, CredentialProvider};
pub use dispatcher::OperationDispatcher;
pub use gateway::{MutationGateway, TransferCallbacks};
pub use git_service::{GatewayOptions, Git2Gateway};
pub use notifications::{NotificationBus, OperationEvent, ResultSink};
pub use operation::{ConfirmationDialog, Operation, OperationContext};
