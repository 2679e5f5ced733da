//! # ic-egress
//!
//! TLS-terminating MITM egress proxy for container-mode sessions.
//!
//! The container has no direct network; its only way out is this proxy.
//! For every CONNECT the proxy checks the host against the provider
//! allowlist, terminates TLS with a per-host leaf signed by the
//! IronCurtain CA, and then, per HTTPS request inside the tunnel:
//! enforces the endpoint allowlist, swaps the agent's fake sentinel key
//! for the real credential, optionally rewrites the JSON body (e.g.
//! stripping server-side tool entries from an Anthropic request), and
//! forwards upstream. The agent never sees a real key; the proxy never
//! logs one.

mod ca;
mod endpoints;
mod error;
mod proxy;

pub use ca::CertificateAuthority;
pub use endpoints::{
    builtin_providers, EndpointRule, FakeKeys, KeyInjection, ProviderEndpoints, RequestRewriter,
};
pub use error::EgressError;
pub use proxy::{EgressConfig, EgressProxy};
