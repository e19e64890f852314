//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the hub's HTTP surface and the
//! viewer's channel manager.

/// Upstream chart API quote sources.
pub mod provider;

/// Push channel envelope codec.
pub mod protocol;

/// Subscriber registry and heartbeat sweep.
pub mod hub;

/// WebSocket and pull endpoints.
pub mod server;

/// Client channel manager, reconnect policy and pull client.
pub mod client;

/// File-backed snapshot cache.
pub mod cache;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
