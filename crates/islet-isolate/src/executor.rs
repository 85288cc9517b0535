//! The tier ladder.
//!
//! Each submission attempts the strongest configured tier; a bring-up
//! failure decays to the next tier. Every decay is reported through the
//! fallback hook so the orchestrator can audit it; the caller only ever
//! sees the final outcome.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::broker::{DeadlineServices, HostServices};
use crate::error::{IsolateError, IsolateResult};
use crate::inprocess::{run_in_process, run_on_thread, IsolateOutcome};
use crate::protocol::{EngineLimits, JobSpec};
use crate::tier::Tier;
use crate::worker::run_subprocess;

/// Isolate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolateConfig {
    /// Engine resource limits shipped with every job.
    pub limits: EngineLimits,
    /// Strongest tier to attempt.
    pub start_tier: Tier,
    /// Explicit worker binary path (discovered when absent).
    pub worker_path: Option<PathBuf>,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            limits: EngineLimits::default(),
            start_tier: Tier::Kernel,
            worker_path: None,
        }
    }
}

/// Executes submissions through the tier ladder.
pub struct IsolateExecutor {
    config: IsolateConfig,
    workspace_root: PathBuf,
}

impl IsolateExecutor {
    /// Create an executor over a workspace root.
    #[must_use]
    pub fn new(config: IsolateConfig, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            workspace_root: workspace_root.into(),
        }
    }

    /// The configured engine limits.
    #[must_use]
    pub fn limits(&self) -> EngineLimits {
        self.config.limits
    }

    /// Execute one job, decaying tiers on bring-up failure.
    ///
    /// `on_fallback` fires once per decay with the tier that failed and
    /// the cause. Per-call deadlines are enforced here by wrapping the
    /// services.
    ///
    /// # Errors
    ///
    /// Returns the last tier's error when every tier fails.
    pub async fn execute(
        &self,
        job: JobSpec,
        services: Arc<dyn HostServices>,
        mut on_fallback: impl FnMut(Tier, &IsolateError),
    ) -> IsolateResult<(Tier, IsolateOutcome)> {
        let services: Arc<dyn HostServices> =
            Arc::new(DeadlineServices::new(SharedServices(services)));

        let mut tier = Some(self.config.start_tier);
        let mut last_error = None;
        while let Some(current) = tier {
            match self.run_tier(current, job.clone(), Arc::clone(&services)).await {
                Ok(outcome) => return Ok((current, outcome)),
                Err(err) if err.is_bring_up() => {
                    debug!(tier = %current, %err, "tier bring-up failed, decaying");
                    on_fallback(current, &err);
                    last_error = Some(err);
                    tier = current.next();
                },
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or_else(|| IsolateError::BringUp {
            tier: Tier::InProcess,
            message: "no tier available".to_string(),
        }))
    }

    async fn run_tier(
        &self,
        tier: Tier,
        job: JobSpec,
        services: Arc<dyn HostServices>,
    ) -> IsolateResult<IsolateOutcome> {
        match tier {
            Tier::Kernel | Tier::Subprocess => {
                run_subprocess(
                    tier,
                    job,
                    &self.workspace_root,
                    self.config.worker_path.as_deref(),
                    services,
                )
                .await
            },
            Tier::Thread => run_on_thread(job, services).await,
            Tier::InProcess => run_in_process(&job, services).await,
        }
    }
}

/// Adapter so an `Arc<dyn HostServices>` can be re-wrapped by
/// [`DeadlineServices`].
struct SharedServices(Arc<dyn HostServices>);

#[async_trait::async_trait]
impl HostServices for SharedServices {
    async fn tool_call(
        &self,
        qualified_name: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, islet_core::ErrorRecord> {
        self.0.tool_call(qualified_name, params).await
    }

    async fn binding_call(
        &self,
        binding: &str,
        method: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, islet_core::ErrorRecord> {
        self.0.binding_call(binding, method, args).await
    }

    async fn network_call(
        &self,
        url: &str,
        method: &str,
        headers: Option<std::collections::BTreeMap<String, String>>,
        body: Option<String>,
    ) -> Result<serde_json::Value, islet_core::ErrorRecord> {
        self.0.network_call(url, method, headers, body).await
    }

    async fn fs_call(
        &self,
        operation: crate::protocol::FsOperation,
    ) -> Result<serde_json::Value, islet_core::ErrorRecord> {
        self.0.fs_call(operation).await
    }

    fn log(&self, line: String) {
        self.0.log(line);
    }

    fn security_violation(&self, description: String) {
        self.0.security_violation(description);
    }
}
