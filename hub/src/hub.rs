use std::sync::Arc;

use cerberus_logging::LogLevel;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::{
    aggregate::{aggregate, Aggregate},
    config::HubConfig,
    decision::{Decision, HubStatus},
    error::{ConfigError, GuardianError},
    guardian::{Guardian, GuardianFactory, GuardianId, GuardianStyle, InputLimit, StandardGuardianFactory},
    pool::{GuardianPool, Transition},
    selector::{RandomStyleSelector, StyleSelector},
    telemetry::HubTelemetry,
    threat::Verdict,
};

/// Builder for [`GuardianHub`].
pub struct GuardianHubBuilder {
    config: HubConfig,
    factory: Option<Arc<dyn GuardianFactory>>,
    selector: Option<Box<dyn StyleSelector>>,
    telemetry: Option<HubTelemetry>,
}

impl GuardianHubBuilder {
    /// Starts from `config`.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            factory: None,
            selector: None,
            telemetry: None,
        }
    }

    /// Overrides how guardians are constructed.
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn GuardianFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Overrides spawn style selection. Defaults to a [`RandomStyleSelector`] using the
    /// configured seed.
    #[must_use]
    pub fn selector(mut self, selector: Box<dyn StyleSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn telemetry(mut self, telemetry: HubTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Validates the configuration and seeds the pool.
    pub fn build(self) -> Result<GuardianHub, ConfigError> {
        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(StandardGuardianFactory::new(InputLimit::new(
                self.config.max_input_bytes,
            )))
        });
        let selector = self
            .selector
            .unwrap_or_else(|| Box::new(RandomStyleSelector::from_seed_option(self.config.seed)));
        let pool = GuardianPool::new(&self.config, factory, selector)?;
        let hub = GuardianHub {
            pool: RwLock::new(pool),
            config: self.config,
            telemetry: self.telemetry,
        };
        for guardian in hub.pool.read().snapshot() {
            hub.log(
                LogLevel::Info,
                "hub.guardian.seeded",
                json!({ "guardian_id": guardian.id(), "style": guardian.style() }),
            );
        }
        Ok(hub)
    }
}

/// Screens text through every pooled guardian and grows the pool on serious threats.
///
/// Share it behind an `Arc`; `analyze` takes `&self` and may run concurrently. Only the
/// growth/shutdown step is serialized, under the pool's write lock.
pub struct GuardianHub {
    pool: RwLock<GuardianPool>,
    config: HubConfig,
    telemetry: Option<HubTelemetry>,
}

impl GuardianHub {
    /// Returns a builder.
    #[must_use]
    pub fn builder(config: HubConfig) -> GuardianHubBuilder {
        GuardianHubBuilder::new(config)
    }

    /// Hub with the built-in guardians and no telemetry.
    pub fn new(config: HubConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Current pool status.
    #[must_use]
    pub fn status(&self) -> HubStatus {
        self.pool.read().status()
    }

    /// Whether the hub has halted.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.pool.read().is_shutdown()
    }

    /// Screens `text`. Never fails: guardian faults are downgraded and a halted hub
    /// answers with a blocking decision.
    pub async fn analyze(&self, text: &str) -> Decision {
        let members = {
            let pool = self.pool.read();
            if pool.is_shutdown() {
                let decision = Decision::halted(pool.len());
                drop(pool);
                self.log(
                    LogLevel::Warn,
                    "hub.request.halted",
                    json!({ "pool_size": decision.pool_size_after }),
                );
                return decision;
            }
            pool.snapshot()
        };

        let verdicts = self.fan_out(members, text).await;
        let aggregate = aggregate(verdicts, self.config.safe_threshold);
        if aggregate.highest_threat.is_growth_trigger() {
            self.report_threat(&aggregate);
        }

        let (transition, pool_size, shutdown) = {
            let mut pool = self.pool.write();
            let transition = pool.apply(aggregate.highest_threat);
            (transition, pool.len(), pool.is_shutdown())
        };
        self.report_transition(&transition, pool_size).await;

        Decision::evaluated(aggregate, pool_size, shutdown)
    }

    /// Runs every guardian of the snapshot concurrently; results keep snapshot order.
    async fn fan_out(&self, members: Vec<Arc<dyn Guardian>>, text: &str) -> Vec<Verdict> {
        let limit = self.config.evaluation_limit();
        let text: Arc<str> = Arc::from(text);
        let evaluations = members.into_iter().map(|guardian| {
            let text = Arc::clone(&text);
            async move {
                let id = guardian.id().clone();
                let style = guardian.style();
                let task = tokio::task::spawn_blocking(move || guardian.evaluate(&text));
                let outcome = match tokio::time::timeout(limit, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => Err(GuardianError::Fault(join_error.to_string())),
                    Err(_) => Err(GuardianError::EvaluationTimeout(limit)),
                };
                (id, style, outcome)
            }
        });

        join_all(evaluations)
            .await
            .into_iter()
            .map(|(id, style, outcome)| match outcome {
                Ok(verdict) => verdict,
                Err(error) => {
                    self.report_fault(&id, style, &error);
                    Verdict::fault(id, style, &error)
                }
            })
            .collect()
    }

    fn report_fault(&self, id: &GuardianId, style: GuardianStyle, error: &GuardianError) {
        tracing::warn!(guardian_id = %id, %style, %error, "guardian evaluation failed");
        self.log(
            LogLevel::Warn,
            "hub.guardian.fault",
            json!({ "guardian_id": id, "style": style, "error": error.to_string() }),
        );
    }

    fn report_threat(&self, aggregate: &Aggregate) {
        for verdict in &aggregate.contributing {
            self.log(
                LogLevel::Warn,
                "hub.threat.detected",
                json!({
                    "guardian_id": verdict.guardian_id,
                    "style": verdict.style,
                    "level": verdict.level,
                    "reasons": verdict.reasons,
                }),
            );
        }
    }

    async fn report_transition(&self, transition: &Transition, pool_size: usize) {
        for record in &transition.spawned {
            self.log(
                LogLevel::Warn,
                "hub.guardian.spawned",
                json!({ "guardian_id": record.id, "style": record.style, "pool_size": pool_size }),
            );
        }
        if !transition.spawned.is_empty() {
            tracing::debug!(spawned = transition.spawned.len(), pool_size, "guardian pool grew");
            self.emit(
                "hub.guardian.spawned",
                json!({ "spawned": transition.spawned, "pool_size": pool_size }),
            )
            .await;
        }
        if transition.entered_shutdown {
            tracing::error!(pool_size, max = self.config.max_guardians, "guardian hub shut down");
            let payload = json!({
                "reason": "max_guardians_reached",
                "pool_size": pool_size,
                "max_guardians": self.config.max_guardians,
            });
            self.log(LogLevel::Critical, "hub.shutdown", payload.clone());
            self.emit("hub.shutdown", payload).await;
        }
    }

    fn log(&self, level: LogLevel, event: &str, fields: Value) {
        if let Some(telemetry) = &self.telemetry {
            if let Err(err) = telemetry.log(level, event, fields) {
                tracing::warn!(%err, event, "telemetry log failed");
            }
        }
    }

    async fn emit(&self, kind: &str, payload: Value) {
        if let Some(telemetry) = &self.telemetry {
            if let Err(err) = telemetry.event(kind, payload).await {
                tracing::warn!(%err, kind, "telemetry event failed");
            }
        }
    }
}
