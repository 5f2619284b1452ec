//! The enable/disable switch shared by every traced client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::{QueryClient, TracedClient};
use crate::config::TracingConfig;
use crate::parent::ParentSpanRegistry;

#[derive(Debug)]
struct Shared {
    config: TracingConfig,
    enabled: AtomicBool,
    registry: ParentSpanRegistry,
}

/// One instrumentation instance: configuration, on/off state and the
/// parent-span table. Clones share all three.
///
/// Clients are installed with [`Instrumentation::install`] and consult the
/// shared state on every query, so enabling or disabling affects clients
/// that were installed earlier, including clients installed while the
/// instrumentation was still disabled.
///
/// ```rust,ignore
/// use sql_query_tracing::{Instrumentation, SeaOrmClient, TracingConfig};
///
/// let instrumentation = Instrumentation::new(TracingConfig::default());
/// let client = instrumentation.install(SeaOrmClient::new(db, descriptor));
///
/// instrumentation.disable(); // queries run untraced
/// instrumentation.enable();  // spans resume
/// ```
#[derive(Debug, Clone)]
pub struct Instrumentation {
    shared: Arc<Shared>,
}

impl Instrumentation {
    pub fn new(config: TracingConfig) -> Self {
        let enabled = AtomicBool::new(config.enabled);
        Self {
            shared: Arc::new(Shared {
                config,
                enabled,
                registry: ParentSpanRegistry::new(),
            }),
        }
    }

    pub fn config(&self) -> &TracingConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &ParentSpanRegistry {
        &self.shared.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Turn instrumentation on. Returns `false` if it already was.
    pub fn enable(&self) -> bool {
        let changed = !self.shared.enabled.swap(true, Ordering::AcqRel);
        if changed {
            tracing::debug!(target: "sql_query_tracing", "query instrumentation enabled");
        }
        changed
    }

    /// Turn instrumentation off. Returns `false` if it already was off.
    ///
    /// Parents stored for queries built earlier are kept, so a query built
    /// before a disable/enable cycle still finds its parent when it runs.
    /// They are released as those queries are dropped.
    pub fn disable(&self) -> bool {
        let changed = self.shared.enabled.swap(false, Ordering::AcqRel);
        if changed {
            tracing::debug!(target: "sql_query_tracing", "query instrumentation disabled");
        }
        changed
    }

    /// Wrap `client` so its queries are traced.
    ///
    /// A client that fails its compatibility check is still wrapped, but
    /// stays inert: its queries run exactly as before and produce no spans.
    pub fn install<C: QueryClient>(&self, client: C) -> TracedClient<C> {
        let active = match client.check_compatibility() {
            Ok(()) => {
                tracing::debug!(
                    target: "sql_query_tracing",
                    driver = client.driver_name(),
                    "installed query instrumentation"
                );
                true
            }
            Err(err) => {
                tracing::warn!(
                    target: "sql_query_tracing",
                    driver = client.driver_name(),
                    error = %err,
                    "query instrumentation inactive for this client"
                );
                false
            }
        };
        TracedClient::new(client, self.clone(), active)
    }

    /// Remove instrumentation from a client, returning the original.
    pub fn uninstall<C: QueryClient>(&self, client: TracedClient<C>) -> C {
        client.into_inner()
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new(TracingConfig::default())
    }
}
