pub mod audit_log;
pub mod classifier;
pub mod credential_engine;
pub mod emergency_revocation;
pub mod inventory;
pub mod locks;
pub mod notifier;
pub mod provider_registry;
pub mod retry;
pub mod rotation_orchestrator;
pub mod scheduler;

pub use audit_log::AuditTrail;
pub use classifier::{classify, HealthClassifier};
pub use credential_engine::{
    CheckReport, CredentialEngine, CycleReport, DiscoveryReport, EngineDeps, Escalation,
    RefreshFailure, RefreshSummary, StatusReport,
};
pub use emergency_revocation::EmergencyRevocationController;
pub use inventory::{CredentialQuery, Inventory, InventoryItem, InventoryStore, SliceFreshness};
pub use locks::{RotationLease, RotationLocks};
pub use notifier::Notifier;
pub use provider_registry::ProviderRegistry;
pub use retry::RetryPolicy;
pub use rotation_orchestrator::{CleanupInstruction, RotationOrchestrator, RotationReport};
pub use scheduler::{PolicySource, Scheduler, SchedulerStats};
