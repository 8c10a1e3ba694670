//! # Orchestration System Bootstrap
//!
//! Wires the registry, job store, notification hub, broker and executor from
//! a loaded configuration and owns the background loops: broker workers, the
//! idle connection reaper and the job cleanup sweeper. All loops stop through
//! one `watch` shutdown channel.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::broker::{InMemoryJobBroker, JobBroker};
use super::callbacks::{CallbackDispatcher, CallbackNotifier, LoggingCallbackNotifier};
use super::executor::OrchestrationExecutor;
use super::step_service::StepServiceRegistry;
use super::worker::JobWorker;
use crate::config::ConfigManager;
use crate::error::OrchestrationResult;
use crate::jobs::{spawn_cleanup_sweeper, InMemoryJobRepository, JobRepository, JobStore};
use crate::notifications::{spawn_idle_reaper, ChannelTransport, NotificationHub, RealtimeTransport};
use crate::registry::{InMemoryWorkflowRepository, WorkflowRegistry, WorkflowRepository};

/// Pluggable collaborators; `Default` gives the in-process implementations
pub struct SystemComponents {
    pub workflow_repository: Arc<dyn WorkflowRepository>,
    pub job_repository: Arc<dyn JobRepository>,
    /// `None` uses a `ChannelTransport` sized by the notifications config
    pub transport: Option<Arc<dyn RealtimeTransport>>,
    pub callback_notifier: Arc<dyn CallbackNotifier>,
}

impl Default for SystemComponents {
    fn default() -> Self {
        Self {
            workflow_repository: Arc::new(InMemoryWorkflowRepository::new()),
            job_repository: Arc::new(InMemoryJobRepository::new()),
            transport: None,
            callback_notifier: Arc::new(LoggingCallbackNotifier),
        }
    }
}

pub struct OrchestrationSystem {
    config_manager: Arc<ConfigManager>,
    executor: Arc<OrchestrationExecutor>,
    channel_transport: Option<Arc<ChannelTransport>>,
    broker: Option<Arc<InMemoryJobBroker>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl OrchestrationSystem {
    /// Bootstrap with in-process collaborators
    pub async fn bootstrap(
        config_manager: Arc<ConfigManager>,
        services: StepServiceRegistry,
    ) -> OrchestrationResult<Self> {
        Self::bootstrap_with(config_manager, services, SystemComponents::default()).await
    }

    pub async fn bootstrap_with(
        config_manager: Arc<ConfigManager>,
        services: StepServiceRegistry,
        components: SystemComponents,
    ) -> OrchestrationResult<Self> {
        let config = config_manager.config().clone();
        info!(environment = %config_manager.environment(), "🚀 Bootstrapping orchestration system");

        let registry = Arc::new(WorkflowRegistry::new(components.workflow_repository));
        if config.workflows.load_builtin_templates {
            registry.load_builtin_templates().await?;
        }
        if let Some(dir) = &config.workflows.template_directory {
            if dir.is_dir() {
                registry.load_templates_from_dir(dir).await?;
            } else {
                warn!(
                    directory = %dir.display(),
                    "Template directory not found, skipping"
                );
            }
        }

        let services = Arc::new(services);
        let missing = registry_missing_bindings(&registry, &services).await?;
        if !missing.is_empty() {
            warn!(
                service_refs = ?missing,
                "Workflows reference step services with no binding"
            );
        }

        let store = Arc::new(JobStore::new(components.job_repository, config.jobs.clone()));

        let (transport, channel_transport): (Arc<dyn RealtimeTransport>, _) =
            match components.transport {
                Some(transport) => (transport, None),
                None => {
                    let channels =
                        Arc::new(ChannelTransport::new(config.notifications.channel_capacity));
                    (channels.clone() as Arc<dyn RealtimeTransport>, Some(channels))
                }
            };
        let hub = Arc::new(NotificationHub::new(transport, config.notifications.clone()));

        let callbacks = Arc::new(CallbackDispatcher::new(
            components.callback_notifier,
            config.callbacks.clone(),
        ));

        let mut executor = OrchestrationExecutor::new(
            registry,
            store.clone(),
            hub.clone(),
            services,
            config.executor.clone(),
        )
        .with_callbacks(callbacks)
        .with_default_max_retries(config.jobs.default_max_retries);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let mut receiver = None;
        let broker = if config.broker.enabled {
            let (broker, jobs) = InMemoryJobBroker::new(config.broker.queue_capacity);
            let broker = Arc::new(broker);
            executor = executor.with_broker(broker.clone() as Arc<dyn JobBroker>);
            receiver = Some(jobs);
            Some(broker)
        } else {
            None
        };
        let executor = Arc::new(executor);

        if let Some(receiver) = receiver {
            for id in 0..config.broker.worker_count {
                let worker =
                    JobWorker::new(id, executor.clone(), receiver.clone(), shutdown_rx.clone());
                tasks.push(worker.spawn());
            }
        }

        tasks.push(spawn_idle_reaper(
            hub,
            config.notifications.reap_interval(),
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_cleanup_sweeper(
            store,
            config.jobs.cleanup_interval(),
            config.jobs.retention(),
            shutdown_rx,
        ));

        info!(
            workers = if config.broker.enabled { config.broker.worker_count } else { 0 },
            background_tasks = tasks.len(),
            "✅ Orchestration system started"
        );

        Ok(Self {
            config_manager,
            executor,
            channel_transport,
            broker,
            shutdown,
            tasks,
        })
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    pub fn executor(&self) -> &Arc<OrchestrationExecutor> {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        self.executor.registry()
    }

    pub fn store(&self) -> &Arc<JobStore> {
        self.executor.store()
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        self.executor.hub()
    }

    /// The built-in transport, when no custom one was supplied
    pub fn channel_transport(&self) -> Option<&Arc<ChannelTransport>> {
        self.channel_transport.as_ref()
    }

    pub fn broker(&self) -> Option<&Arc<InMemoryJobBroker>> {
        self.broker.as_ref()
    }

    /// Signal every background loop and wait for them to stop
    pub async fn shutdown(self) {
        info!("🛑 Shutting down orchestration system");
        // Receivers may all be gone already; nothing to signal then
        let _ = self.shutdown.send(true);

        for task in self.tasks {
            if let Err(error) = task.await {
                warn!(error = %error, "Background task ended abnormally");
            }
        }
        info!("✅ Orchestration system stopped");
    }
}

async fn registry_missing_bindings(
    registry: &WorkflowRegistry,
    services: &StepServiceRegistry,
) -> OrchestrationResult<Vec<String>> {
    let workflows = registry.list(&Default::default()).await?;
    let mut missing: Vec<String> = workflows
        .iter()
        .flat_map(|workflow| services.missing_bindings(workflow))
        .collect();
    missing.sort();
    missing.dedup();
    Ok(missing)
}
