use crate::artifacts::ArtifactSet;
use crate::changes::{tree_indicates_change, ChangeDelta};
use crate::events::{EventBus, ModelEvent, ModelObserver, SubscriptionId};
use crate::launcher::build_launch_descriptor;
use crate::model::{EnvironmentSnapshot, GenerationStatus, ProjectChange, ProjectState};
use crate::supervisor::{ProcessSupervisor, POLL_INTERVAL};
use crate::CoreError;
use berth_runtime::{BuildRequest, Collaborators, EnvironmentSlot};
use berth_schema::{parse_config_str, EnvironmentId, ParsedConfig, ProjectId};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Oldest build-tool plugin major version the generation pipeline supports.
pub const MINIMUM_PLUGIN_MAJOR_VERSION: u32 = 4;

struct ProjectContext {
    state: Mutex<ProjectState>,
    /// One guard mutex per environment id: a second `generate` for an id
    /// already mid-pipeline waits here, while other ids run unaffected.
    generation_guards: Mutex<HashMap<EnvironmentId, Arc<Mutex<()>>>>,
}

impl ProjectContext {
    fn state(&self) -> MutexGuard<'_, ProjectState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn generation_guard(&self, environment_id: &EnvironmentId) -> Arc<Mutex<()>> {
        let mut guards = self
            .generation_guards
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Arc::clone(guards.entry(environment_id.clone()).or_default())
    }
}

struct EngineInner {
    collaborators: Collaborators,
    bus: EventBus,
    projects: Mutex<HashMap<ProjectId, Arc<ProjectContext>>>,
    poll_interval: Duration,
    minimum_plugin_major: u32,
}

/// Central orchestrator for project environment lifecycles.
///
/// The engine owns the tracked projects, reconciles configuration refreshes
/// into the environment model, classifies filesystem change batches, runs
/// the generation pipeline, and supervises launched processes. Cheap to
/// clone; clones share all state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_options(collaborators, POLL_INTERVAL, MINIMUM_PLUGIN_MAJOR_VERSION)
    }

    /// Construct with a custom supervisor poll interval and minimum
    /// supported plugin major version.
    pub fn with_options(
        collaborators: Collaborators,
        poll_interval: Duration,
        minimum_plugin_major: u32,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                collaborators,
                bus: EventBus::new(),
                projects: Mutex::new(HashMap::new()),
                poll_interval,
                minimum_plugin_major,
            }),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn ModelObserver>) -> SubscriptionId {
        self.inner.bus.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.bus.unsubscribe(id);
    }

    /// Start tracking a project. Re-registering a known id keeps the
    /// existing state.
    pub fn register_project(&self, id: ProjectId, name: impl Into<String>) {
        let name = name.into();
        let mut projects = self.projects();
        projects.entry(id.clone()).or_insert_with(|| {
            info!("tracking project {id} ('{name}')");
            Arc::new(ProjectContext {
                state: Mutex::new(ProjectState::new(name, self.inner.minimum_plugin_major)),
                generation_guards: Mutex::new(HashMap::new()),
            })
        });
    }

    /// Stop tracking a project: every supervised process is stopped and the
    /// environment mapping cleared. Safe to call for unknown ids.
    pub fn dispose_project(&self, project: &ProjectId) {
        let context = self.projects().remove(project);
        let Some(context) = context else {
            debug!("dispose: project {project} is not tracked");
            return;
        };
        let mut state = context.state();
        for environment in state.environments.values_mut() {
            environment.discard_process(true);
        }
        state.environments.clear();
        info!("disposed project {project}");
    }

    /// Apply a model update: build directory, environment configuration,
    /// and the compatibility gate.
    ///
    /// However many sub-steps change the model, observers see at most one
    /// `EnvironmentsChanged` per call, plus an independent
    /// `EnablementChanged` when the gate transitioned. Dispatch happens
    /// after the project lock is released.
    pub fn refresh(&self, project: &ProjectId, change: ProjectChange) -> Result<(), CoreError> {
        let context = self.project(project)?;
        let mut environments_changed = false;
        let mut enablement: Option<bool> = None;

        {
            let mut state = context.state();

            // The gate runs on every configuration refresh and fails closed
            // when no version information accompanies the configuration.
            if change.configuration.is_some() {
                let check = state.gate.check(change.declared_plugin_version.as_deref());
                if check.transitioned {
                    state.enabled = check.eligible;
                    enablement = Some(check.eligible);
                    if check.eligible {
                        info!("project {project} re-enabled: compatible build-tool plugin");
                    } else {
                        warn!(
                            "project {project} disabled: declared build-tool plugin version \
                             {:?} is below supported major {}",
                            change.declared_plugin_version, self.inner.minimum_plugin_major
                        );
                    }
                }
            }

            if let Some(directory) = change.build_directory {
                if state.build_directory.as_ref() != Some(&directory) {
                    debug!(
                        "build directory for {project} is now {}",
                        directory.display()
                    );
                    state.build_directory = Some(directory);
                    environments_changed = true;
                }
            }

            if let Some(configuration) = change.configuration {
                environments_changed |= state.reconcile_environments(configuration);
            }
        }

        if environments_changed {
            self.inner.bus.emit(&ModelEvent::EnvironmentsChanged {
                project: project.clone(),
            });
        }
        if let Some(enabled) = enablement {
            self.inner.bus.emit(&ModelEvent::EnablementChanged {
                project: project.clone(),
                enabled,
            });
        }
        Ok(())
    }

    /// Refresh from a raw configuration document. A malformed document is
    /// logged and treated as an empty environment list rather than aborting
    /// the project.
    pub fn refresh_from_descriptor(
        &self,
        project: &ProjectId,
        descriptor: &str,
        mut change: ProjectChange,
    ) -> Result<(), CoreError> {
        let configuration = match parse_config_str(descriptor) {
            Ok(configuration) => configuration,
            Err(e) => {
                warn!(
                    "malformed environment configuration for {project}: {e}; \
                     continuing with an empty environment set"
                );
                ParsedConfig::default()
            }
        };
        change.configuration = Some(configuration);
        self.refresh(project, change)
    }

    /// Run the generation pipeline for one environment: discard stale
    /// process/launch state, rebuild, resynchronize the output view, parse
    /// the generated launch document, and start supervision.
    ///
    /// Re-entrant per environment id but serialized for the same id; a
    /// failure leaves the environment `Failed` with its prior process state
    /// already discarded.
    pub fn generate(
        &self,
        project: &ProjectId,
        environment_id: &EnvironmentId,
    ) -> Result<(), CoreError> {
        if environment_id.is_empty() {
            return Err(CoreError::EmptyEnvironmentId);
        }
        let context = self.project(project)?;

        let guard = context.generation_guard(environment_id);
        let _running = guard.lock().unwrap_or_else(|e| e.into_inner());

        let (project_name, build_directory) = {
            let mut state = context.state();
            let Some(directory) = state.build_directory.clone() else {
                return Err(CoreError::NoBuildDirectory(project.to_string()));
            };
            let name = state.name.clone();
            let Some(environment) = state.environments.get_mut(environment_id) else {
                warn!("cannot generate: no environment '{environment_id}' in project {project}");
                return Ok(());
            };
            environment.discard_process(true);
            environment.status = GenerationStatus::Generating;
            (name, directory)
        };

        info!("generating environment '{environment_id}' for project {project}");

        // The external build runs without any lock held; it is blocking and
        // potentially long.
        let request = BuildRequest::new(
            project.clone(),
            project_name.clone(),
            environment_id.clone(),
        );
        let artifacts = match self.inner.collaborators.build.execute_build(&request) {
            Ok(produced) => ArtifactSet::from(produced),
            Err(e) => {
                warn!("build failed for '{environment_id}': {e}");
                self.mark_failed(&context, environment_id);
                return Err(CoreError::BuildFailed(
                    environment_id.to_string(),
                    e.to_string(),
                ));
            }
        };

        // Refresh the output view before anything resolves files from it.
        if let Err(e) = self.inner.collaborators.resync.resync(&build_directory) {
            self.mark_failed(&context, environment_id);
            return Err(e.into());
        }

        {
            let mut state = context.state();
            // The artifact set is replaced wholesale, never merged.
            state.artifacts = artifacts;
            let Some(environment) = state.environments.get_mut(environment_id) else {
                // Removed by a concurrent configuration refresh mid-pipeline.
                debug!("environment '{environment_id}' disappeared during generation");
                return Ok(());
            };
            environment.status = GenerationStatus::Generated;
            environment.generated_at = Some(Utc::now());
        }

        match self
            .inner
            .collaborators
            .config
            .load(&build_directory, environment_id)
        {
            Ok(Some(config)) => {
                match build_launch_descriptor(
                    &project_name,
                    environment_id,
                    &build_directory,
                    &config,
                ) {
                    Ok(descriptor) => {
                        let slot = EnvironmentSlot::new(environment_id.clone(), project_name);
                        let supervisor = ProcessSupervisor::spawn_with_interval(
                            slot,
                            Arc::clone(&self.inner.collaborators.process),
                            self.inner.poll_interval,
                        );
                        let mut state = context.state();
                        if let Some(environment) = state.environments.get_mut(environment_id) {
                            environment.launch = Some(descriptor);
                            environment.supervisor = Some(supervisor);
                        } else {
                            let _ = supervisor.stop(true);
                        }
                    }
                    Err(e) => {
                        warn!("could not prepare launch for '{environment_id}': {e}");
                    }
                }
            }
            Ok(None) => {
                debug!("no generated launch document for '{environment_id}'");
            }
            Err(e) => {
                warn!("failed to load generated configuration for '{environment_id}': {e}");
            }
        }

        self.inner.bus.emit(&ModelEvent::EnvironmentGenerated {
            environment: environment_id.clone(),
        });
        Ok(())
    }

    /// Stop an environment's supervised process. A missing environment or
    /// absent process is a logged no-op; a termination failure surfaces as
    /// an error with the supervisor parked in `Unknown`.
    pub fn stop_environment(
        &self,
        project: &ProjectId,
        environment_id: &EnvironmentId,
        force: bool,
    ) -> Result<(), CoreError> {
        let context = self.project(project)?;
        let state = context.state();
        let Some(environment) = state.environments.get(environment_id) else {
            warn!("cannot stop: no environment '{environment_id}' in project {project}");
            return Ok(());
        };
        let Some(supervisor) = environment.supervisor.as_ref() else {
            debug!("environment '{environment_id}' has no supervised process");
            return Ok(());
        };
        supervisor.stop(force)
    }

    /// Classify a filesystem change batch against the project's outputs.
    ///
    /// Classification runs synchronously on the caller's delivery path and
    /// returns whether the batch was relevant. When it is, regeneration of
    /// every currently-generated environment is dispatched to background
    /// threads, keeping the delivery path free of build work.
    pub fn notify_filesystem_change(
        &self,
        project: &ProjectId,
        delta: &ChangeDelta,
    ) -> Result<bool, CoreError> {
        let context = self.project(project)?;
        let (output_directory, artifacts, generated): (PathBuf, ArtifactSet, Vec<EnvironmentId>) = {
            let state = context.state();
            let Some(directory) = state.build_directory.clone() else {
                // Nothing to compare against until the first refresh.
                return Ok(false);
            };
            let generated = state
                .environments
                .values()
                .filter(|environment| environment.status == GenerationStatus::Generated)
                .map(|environment| environment.id.clone())
                .collect();
            (directory, state.artifacts.clone(), generated)
        };

        if !tree_indicates_change(delta, &output_directory, &artifacts) {
            return Ok(false);
        }
        debug!("change batch is relevant to project {project}");

        for environment_id in generated {
            let engine = self.clone();
            let project = project.clone();
            thread::spawn(move || {
                if let Err(e) = engine.generate(&project, &environment_id) {
                    warn!("regeneration of '{environment_id}' failed: {e}");
                }
            });
        }
        Ok(true)
    }

    pub fn is_enabled(&self, project: &ProjectId) -> Result<bool, CoreError> {
        Ok(self.project(project)?.state().enabled)
    }

    /// Sorted immutable snapshots of the project's environments.
    pub fn environment_snapshots(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<EnvironmentSnapshot>, CoreError> {
        Ok(self.project(project)?.state().snapshots())
    }

    fn projects(&self) -> MutexGuard<'_, HashMap<ProjectId, Arc<ProjectContext>>> {
        self.inner.projects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn project(&self, project: &ProjectId) -> Result<Arc<ProjectContext>, CoreError> {
        self.projects()
            .get(project)
            .cloned()
            .ok_or_else(|| CoreError::ProjectNotFound(project.to_string()))
    }

    fn mark_failed(&self, context: &ProjectContext, environment_id: &EnvironmentId) {
        let mut state = context.state();
        if let Some(environment) = state.environments.get_mut(environment_id) {
            environment.status = GenerationStatus::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;
    use crate::supervisor::ProcessState;
    use berth_runtime::{BuildArtifacts, MockRuntime};
    use berth_schema::GeneratedConfig;
    use std::path::Path;
    use std::time::Instant;

    const TICK: Duration = Duration::from_millis(5);

    fn engine() -> (Engine, Arc<MockRuntime>) {
        let mock = Arc::new(MockRuntime::new());
        let engine = Engine::with_options(
            Collaborators::shared(Arc::clone(&mock)),
            TICK,
            MINIMUM_PLUGIN_MAJOR_VERSION,
        );
        (engine, mock)
    }

    fn project() -> ProjectId {
        ProjectId::new("p1")
    }

    fn env() -> EnvironmentId {
        EnvironmentId::new("equinox-test")
    }

    fn recorded_events(engine: &Engine) -> Arc<Mutex<Vec<ModelEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        engine.subscribe(Arc::new(move |event: &ModelEvent| {
            sink.lock().unwrap().push(event.clone());
        }));
        events
    }

    fn config_for(id: &str) -> ParsedConfig {
        parse_config_str(&format!(
            "[[environment]]\nid = \"{id}\"\nframework = \"equinox\"\n"
        ))
        .unwrap()
    }

    fn registered(engine: &Engine) {
        engine.register_project(project(), "demo");
        engine
            .refresh(
                &project(),
                ProjectChange::new()
                    .build_directory("/p/target")
                    .configuration(config_for("equinox-test"))
                    .declared_plugin_version("4.1.0"),
            )
            .unwrap();
    }

    fn wait_until(what: &str, predicate: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !predicate() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(TICK);
        }
    }

    #[test]
    fn refresh_fires_environments_changed_at_most_once() {
        let (engine, _mock) = engine();
        engine.register_project(project(), "demo");
        let events = recorded_events(&engine);

        // Build directory AND configuration change in one call.
        registered(&engine);

        let environment_events: Vec<ModelEvent> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ModelEvent::EnvironmentsChanged { .. }))
            .cloned()
            .collect();
        assert_eq!(environment_events.len(), 1);
    }

    #[test]
    fn identical_refresh_is_silent() {
        let (engine, _mock) = engine();
        registered(&engine);
        let events = recorded_events(&engine);

        engine
            .refresh(
                &project(),
                ProjectChange::new()
                    .build_directory("/p/target")
                    .configuration(config_for("equinox-test"))
                    .declared_plugin_version("4.1.0"),
            )
            .unwrap();
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn gate_transition_fires_enablement_changed_once() {
        let (engine, _mock) = engine();
        registered(&engine);
        let events = recorded_events(&engine);

        for _ in 0..2 {
            engine
                .refresh(
                    &project(),
                    ProjectChange::new()
                        .configuration(config_for("equinox-test"))
                        .declared_plugin_version("3.0.0"),
                )
                .unwrap();
        }

        let enablement: Vec<ModelEvent> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ModelEvent::EnablementChanged { .. }))
            .cloned()
            .collect();
        assert_eq!(
            enablement,
            vec![ModelEvent::EnablementChanged {
                project: project(),
                enabled: false,
            }]
        );
        assert!(!engine.is_enabled(&project()).unwrap());
    }

    #[test]
    fn refresh_without_version_information_fails_closed() {
        let (engine, _mock) = engine();
        engine.register_project(project(), "demo");
        engine
            .refresh(
                &project(),
                ProjectChange::new().configuration(config_for("equinox-test")),
            )
            .unwrap();
        assert!(!engine.is_enabled(&project()).unwrap());
    }

    #[test]
    fn malformed_descriptor_refreshes_to_empty_set() {
        let (engine, _mock) = engine();
        registered(&engine);

        engine
            .refresh_from_descriptor(
                &project(),
                "this is [ not toml",
                ProjectChange::new().declared_plugin_version("4.1.0"),
            )
            .unwrap();
        assert!(engine.environment_snapshots(&project()).unwrap().is_empty());
    }

    #[test]
    fn generate_requires_a_non_empty_id() {
        let (engine, _mock) = engine();
        registered(&engine);
        assert!(matches!(
            engine.generate(&project(), &EnvironmentId::new("")),
            Err(CoreError::EmptyEnvironmentId)
        ));
    }

    #[test]
    fn generate_for_unknown_environment_is_a_no_op() {
        let (engine, mock) = engine();
        registered(&engine);
        engine
            .generate(&project(), &EnvironmentId::new("no-such-env"))
            .unwrap();
        assert!(mock.build_invocations().is_empty());
    }

    #[test]
    fn generate_for_unknown_project_is_an_error() {
        let (engine, _mock) = engine();
        assert!(matches!(
            engine.generate(&ProjectId::new("ghost"), &env()),
            Err(CoreError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn build_failure_marks_the_environment_failed() {
        let (engine, mock) = engine();
        registered(&engine);
        mock.fail_next_build();

        let result = engine.generate(&project(), &env());
        assert!(matches!(result, Err(CoreError::BuildFailed(_, _))));

        let snapshots = engine.environment_snapshots(&project()).unwrap();
        assert_eq!(snapshots[0].status, GenerationStatus::Failed);
        assert!(snapshots[0].process.is_none());
        // The build ran, the resync did not.
        assert_eq!(mock.build_invocations().len(), 1);
        assert!(mock.resync_invocations().is_empty());
    }

    #[test]
    fn generate_pipeline_reaches_generated_and_supervised() {
        let (engine, mock) = engine();
        registered(&engine);
        let events = recorded_events(&engine);
        mock.set_generated_config(
            env(),
            GeneratedConfig {
                main_class: "org.example.Main".to_owned(),
                program_arguments: Vec::new(),
                vm_arguments: vec![
                    "-Xmx256m".to_owned(),
                    "-Xrunjdwp:transport=dt_socket".to_owned(),
                ],
                classpath: Some("lib/app.jar".to_owned()),
            },
        );

        engine.generate(&project(), &env()).unwrap();

        let snapshots = engine.environment_snapshots(&project()).unwrap();
        assert_eq!(snapshots[0].status, GenerationStatus::Generated);
        assert!(snapshots[0].generated_at.is_some());
        assert_eq!(snapshots[0].process, Some(ProcessState::Starting));
        assert_eq!(mock.resync_invocations(), vec![PathBuf::from("/p/target")]);
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| *e == ModelEvent::EnvironmentGenerated { environment: env() }));
    }

    #[test]
    fn generate_without_launch_document_still_generates() {
        let (engine, mock) = engine();
        registered(&engine);

        engine.generate(&project(), &env()).unwrap();

        let snapshots = engine.environment_snapshots(&project()).unwrap();
        assert_eq!(snapshots[0].status, GenerationStatus::Generated);
        assert!(snapshots[0].process.is_none());
        assert_eq!(mock.build_invocations().len(), 1);
    }

    #[test]
    fn generate_skips_the_test_phase() {
        let (engine, mock) = engine();
        registered(&engine);
        engine.generate(&project(), &env()).unwrap();
        assert!(mock.build_invocations()[0].skip_phases.contains("test"));
    }

    #[test]
    fn successful_build_replaces_the_artifact_set_wholesale() {
        let (engine, mock) = engine();
        registered(&engine);
        mock.set_build_artifacts(BuildArtifacts {
            primary: Some(PathBuf::from("/p/target/app.jar")),
            attached: Vec::new(),
        });
        engine.generate(&project(), &env()).unwrap();

        // A change to the newly tracked artifact is now relevant.
        let delta = ChangeDelta::new("/p/target", ChangeKind::NONE)
            .with_child(ChangeDelta::new("/p/target/app.jar", ChangeKind::CONTENT));
        assert!(engine.notify_filesystem_change(&project(), &delta).unwrap());
    }

    #[test]
    fn irrelevant_change_batches_are_dropped() {
        let (engine, _mock) = engine();
        registered(&engine);
        let delta = ChangeDelta::new("/p/target", ChangeKind::NONE).with_child(ChangeDelta::new(
            "/p/target/classes/App.class",
            ChangeKind::CONTENT,
        ));
        assert!(!engine.notify_filesystem_change(&project(), &delta).unwrap());
    }

    #[test]
    fn relevant_change_regenerates_generated_environments() {
        let (engine, mock) = engine();
        registered(&engine);
        engine.generate(&project(), &env()).unwrap();
        assert_eq!(mock.build_invocations().len(), 1);

        let delta = ChangeDelta::new(Path::new("/p/src/Main.java"), ChangeKind::CONTENT);
        assert!(engine.notify_filesystem_change(&project(), &delta).unwrap());

        let mock_for_wait = Arc::clone(&mock);
        wait_until("background regeneration", move || {
            mock_for_wait.build_invocations().len() == 2
        });
    }

    #[test]
    fn dispose_is_idempotent_and_stops_processes() {
        let (engine, mock) = engine();
        registered(&engine);
        mock.set_generated_config(
            env(),
            GeneratedConfig {
                main_class: "org.example.Main".to_owned(),
                program_arguments: Vec::new(),
                vm_arguments: Vec::new(),
                classpath: None,
            },
        );
        engine.generate(&project(), &env()).unwrap();

        engine.dispose_project(&project());
        engine.dispose_project(&project());
        assert_eq!(mock.termination_invocations().len(), 1);
        assert!(engine.is_enabled(&project()).is_err());
    }

    #[test]
    fn stop_environment_is_safe_without_a_process() {
        let (engine, _mock) = engine();
        registered(&engine);
        engine.stop_environment(&project(), &env(), false).unwrap();
        engine
            .stop_environment(&project(), &EnvironmentId::new("ghost"), false)
            .unwrap();
    }
}
