//! relay-core: framework-agnostic core of the Relay tenant gateway.

pub mod app;
pub mod capability;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod gate;
pub mod proxy;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod tenant;

pub use app::{Invocation, RelayApp, RelayAppBuilder};
pub use capability::{CapabilityRequest, Envelope, HttpMethod, ProxyResult, Source};
pub use config::{RelayConfig, RelayConfigSnapshot};
pub use errors::{ErrorKind, RelayError, RelayResult};
pub use fallback::{echo_with_placeholder_id, FallbackPayload, FallbackProvider};
pub use gate::{AccessGate, Decision, DenyReason, Navigation, OnboardingGate, Principal, Role};
pub use proxy::{FallbackMode, ProxyExecutor, Upstream, UpstreamError, UpstreamResponse};
pub use registry::{CapabilityDef, CapabilityRegistry};
pub use resolver::{MemoryTenantStore, ResolverOptions, TenantHint, TenantResolver, TenantStore};
pub use schema::{SchemaErrors, Shape};
pub use tenant::{Branding, SubscriptionTier, TenantContext, TenantId, TenantRecord};
