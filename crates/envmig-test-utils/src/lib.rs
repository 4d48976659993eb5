//! Testing utilities for envmig workspace
//!
//! Shared fakes and fixtures:
//! - [`InMemoryBackend`]: a `ManagementApi` holding environments, keys and aliases in memory
//! - [`ScriptedExecutor`]: a `MigrationExecutor` that records attempts and fails on demand
//! - Fixture helpers for migration directories and configuration

#![allow(missing_docs)]

use async_trait::async_trait;
use envmig_core::{
    Alias, ApiKey, BackendError, Entry, Environment, EnvironmentId, EnvironmentLink,
    EnvironmentStatus, ExecutionError, Locale, ManagementApi, MigrateConfig, MigrationDescriptor,
    MigrationExecutor, MigrationTarget, Secret, Space,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_LOCALE: &str = "en-US";
pub const VERSION_CONTENT_TYPE: &str = "versionTracking";
pub const VERSION_FIELD: &str = "version";

/// Backend operation, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Space,
    GetEnvironment,
    CreateEnvironment,
    DeleteEnvironment,
    EnvironmentStatus,
    ApiKeys,
    UpdateApiKey,
    Locales,
    Entries,
    UpdateEntry,
    PublishEntry,
    GetAlias,
    UpdateAlias,
}

/// Recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Space,
    GetEnvironment(String),
    CreateEnvironment { id: String, source: Option<String> },
    DeleteEnvironment(String),
    EnvironmentStatus(String),
    ApiKeys,
    UpdateApiKey(String),
    Locales(String),
    Entries { environment: String, content_type: String },
    UpdateEntry { environment: String, entry: String },
    PublishEntry { environment: String, entry: String },
    GetAlias(String),
    UpdateAlias { alias: String, environment: String },
}

impl Call {
    fn op(&self) -> Op {
        match self {
            Self::Space => Op::Space,
            Self::GetEnvironment(_) => Op::GetEnvironment,
            Self::CreateEnvironment { .. } => Op::CreateEnvironment,
            Self::DeleteEnvironment(_) => Op::DeleteEnvironment,
            Self::EnvironmentStatus(_) => Op::EnvironmentStatus,
            Self::ApiKeys => Op::ApiKeys,
            Self::UpdateApiKey(_) => Op::UpdateApiKey,
            Self::Locales(_) => Op::Locales,
            Self::Entries { .. } => Op::Entries,
            Self::UpdateEntry { .. } => Op::UpdateEntry,
            Self::PublishEntry { .. } => Op::PublishEntry,
            Self::GetAlias(_) => Op::GetAlias,
            Self::UpdateAlias { .. } => Op::UpdateAlias,
        }
    }
}

#[derive(Debug, Clone)]
struct FakeEnvironment {
    environment: Environment,
    locales: Vec<Locale>,
    entries: Vec<Entry>,
}

impl FakeEnvironment {
    fn empty(id: &EnvironmentId, status: EnvironmentStatus) -> Self {
        Self {
            environment: Environment {
                id: id.clone(),
                name: id.to_string(),
                status,
            },
            locales: vec![Locale {
                code: DEFAULT_LOCALE.to_string(),
                default: true,
            }],
            entries: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct State {
    space: Space,
    environments: BTreeMap<EnvironmentId, FakeEnvironment>,
    status_script: VecDeque<EnvironmentStatus>,
    auto_ready: bool,
    api_keys: Vec<ApiKey>,
    aliases: BTreeMap<String, Alias>,
    failing: HashSet<Op>,
    failing_keys: HashSet<String>,
    calls: Vec<Call>,
}

/// In-memory `ManagementApi`
///
/// Created environments start `provisioning`; each status query consumes the
/// next scripted status, and once the script is empty the environment becomes
/// `ready` (unless [`InMemoryBackend::never_ready`] was set). Updates check
/// `version` like the real backend and answer 409 on mismatch.
#[derive(Debug)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

fn injected(op: Op) -> BackendError {
    BackendError::Status {
        status: 500,
        message: format!("injected failure: {op:?}"),
    }
}

fn conflict(what: &str) -> BackendError {
    BackendError::Status {
        status: 409,
        message: format!("version mismatch for {what}"),
    }
}

impl InMemoryBackend {
    pub fn new(space_id: &str) -> Self {
        Self {
            state: Mutex::new(State {
                space: Space {
                    id: space_id.to_string(),
                    name: format!("{space_id} space"),
                },
                environments: BTreeMap::new(),
                status_script: VecDeque::new(),
                auto_ready: true,
                api_keys: Vec::new(),
                aliases: BTreeMap::new(),
                failing: HashSet::new(),
                failing_keys: HashSet::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Add a ready environment with the default locale
    pub fn with_environment(self, id: &str) -> Self {
        {
            let mut state = self.state.lock();
            let id = EnvironmentId::new(id);
            state
                .environments
                .insert(id.clone(), FakeEnvironment::empty(&id, EnvironmentStatus::Ready));
        }
        self
    }

    /// Add an entry to an existing environment
    pub fn with_entry(self, environment: &str, entry: Entry) -> Self {
        {
            let mut state = self.state.lock();
            if let Some(env) = state.environments.get_mut(&EnvironmentId::new(environment)) {
                env.entries.push(entry);
            }
        }
        self
    }

    /// Add a version record holding `version`
    pub fn with_version_record(self, environment: &str, version: &str) -> Self {
        let count = self
            .state
            .lock()
            .environments
            .get(&EnvironmentId::new(environment))
            .map_or(0, |e| e.entries.len());
        self.with_entry(environment, version_entry(&format!("version-{count}"), version))
    }

    pub fn with_api_key(self, id: &str, environments: &[&str]) -> Self {
        let links = environments.iter().copied().map(EnvironmentLink::environment).collect();
        self.with_api_key_links(id, links)
    }

    pub fn with_api_key_links(self, id: &str, environments: Vec<EnvironmentLink>) -> Self {
        self.state.lock().api_keys.push(ApiKey {
            id: id.to_string(),
            name: format!("{id} key"),
            description: None,
            environments,
            version: 1,
        });
        self
    }

    pub fn with_alias(self, name: &str, environment: &str) -> Self {
        self.state.lock().aliases.insert(
            name.to_string(),
            Alias {
                id: name.to_string(),
                environment: EnvironmentId::new(environment),
                version: 1,
            },
        );
        self
    }

    /// Statuses returned by successive status queries
    pub fn with_status_script(self, statuses: impl IntoIterator<Item = EnvironmentStatus>) -> Self {
        self.state.lock().status_script.extend(statuses);
        self
    }

    /// Environments stay in their last status once the script is exhausted
    pub fn never_ready(self) -> Self {
        self.state.lock().auto_ready = false;
        self
    }

    /// Every call of `op` fails with a 500
    pub fn failing(self, op: Op) -> Self {
        self.state.lock().failing.insert(op);
        self
    }

    /// Updates of key `id` fail with a 500
    pub fn failing_api_key(self, id: &str) -> Self {
        self.state.lock().failing_keys.insert(id.to_string());
        self
    }

    /// All recorded calls in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of `op`
    pub fn count(&self, op: Op) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn environment_ids(&self) -> Vec<String> {
        self.state.lock().environments.keys().map(ToString::to_string).collect()
    }

    /// Version stored in the environment's version record(s)
    pub fn stored_versions(&self, environment: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .environments
            .get(&EnvironmentId::new(environment))
            .map(|env| {
                env.entries
                    .iter()
                    .filter(|e| e.content_type == VERSION_CONTENT_TYPE)
                    .filter_map(|e| e.localized_str(VERSION_FIELD, DEFAULT_LOCALE))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Single stored version, if exactly one record exists
    pub fn stored_version(&self, environment: &str) -> Option<String> {
        let mut versions = self.stored_versions(environment);
        if versions.len() == 1 {
            versions.pop()
        } else {
            None
        }
    }

    pub fn alias_target(&self, name: &str) -> Option<EnvironmentId> {
        self.state.lock().aliases.get(name).map(|a| a.environment.clone())
    }

    pub fn api_key(&self, id: &str) -> Option<ApiKey> {
        self.state.lock().api_keys.iter().find(|k| k.id == id).cloned()
    }

    /// Record `call`, failing if its operation is marked failing
    fn enter(&self, call: Call) -> Result<parking_lot::MutexGuard<'_, State>, BackendError> {
        let mut state = self.state.lock();
        let op = call.op();
        state.calls.push(call);
        if state.failing.contains(&op) {
            return Err(injected(op));
        }
        Ok(state)
    }
}

fn environment_mut<'s>(
    state: &'s mut State,
    id: &EnvironmentId,
) -> Result<&'s mut FakeEnvironment, BackendError> {
    state
        .environments
        .get_mut(id)
        .ok_or_else(|| BackendError::not_found(format!("environment {id}")))
}

#[async_trait]
impl ManagementApi for InMemoryBackend {
    async fn space(&self) -> Result<Space, BackendError> {
        let state = self.enter(Call::Space)?;
        Ok(state.space.clone())
    }

    async fn environment(&self, id: &EnvironmentId) -> Result<Environment, BackendError> {
        let mut state = self.enter(Call::GetEnvironment(id.to_string()))?;
        Ok(environment_mut(&mut state, id)?.environment.clone())
    }

    async fn create_environment(
        &self,
        id: &EnvironmentId,
        name: &str,
        source: Option<EnvironmentId>,
    ) -> Result<Environment, BackendError> {
        let mut state = self.enter(Call::CreateEnvironment {
            id: id.to_string(),
            source: source.as_ref().map(ToString::to_string),
        })?;
        if state.environments.contains_key(id) {
            return Err(BackendError::Status {
                status: 409,
                message: format!("environment {id} already exists"),
            });
        }

        let mut created = match &source {
            Some(source) => {
                let mut copy = environment_mut(&mut state, source)?.clone();
                copy.environment.id = id.clone();
                copy
            }
            None => FakeEnvironment::empty(id, EnvironmentStatus::Provisioning),
        };
        created.environment.name = name.to_string();
        created.environment.status = EnvironmentStatus::Provisioning;

        let environment = created.environment.clone();
        state.environments.insert(id.clone(), created);
        Ok(environment)
    }

    async fn delete_environment(&self, id: &EnvironmentId) -> Result<(), BackendError> {
        let mut state = self.enter(Call::DeleteEnvironment(id.to_string()))?;
        state
            .environments
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BackendError::not_found(format!("environment {id}")))
    }

    async fn environment_status(
        &self,
        id: &EnvironmentId,
    ) -> Result<EnvironmentStatus, BackendError> {
        let mut state = self.enter(Call::EnvironmentStatus(id.to_string()))?;
        let next = state.status_script.pop_front();
        let auto_ready = state.auto_ready;
        let env = environment_mut(&mut state, id)?;
        match next {
            Some(status) => env.environment.status = status,
            None if auto_ready => env.environment.status = EnvironmentStatus::Ready,
            None => {}
        }
        Ok(env.environment.status)
    }

    async fn api_keys(&self) -> Result<Vec<ApiKey>, BackendError> {
        let state = self.enter(Call::ApiKeys)?;
        Ok(state.api_keys.clone())
    }

    async fn update_api_key(&self, key: &ApiKey) -> Result<ApiKey, BackendError> {
        let mut state = self.enter(Call::UpdateApiKey(key.id.clone()))?;
        if state.failing_keys.contains(&key.id) {
            return Err(injected(Op::UpdateApiKey));
        }
        let stored = state
            .api_keys
            .iter_mut()
            .find(|k| k.id == key.id)
            .ok_or_else(|| BackendError::not_found(format!("api key {}", key.id)))?;
        if stored.version != key.version {
            return Err(conflict(&key.id));
        }
        *stored = key.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn locales(&self, environment: &EnvironmentId) -> Result<Vec<Locale>, BackendError> {
        let mut state = self.enter(Call::Locales(environment.to_string()))?;
        Ok(environment_mut(&mut state, environment)?.locales.clone())
    }

    async fn entries(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
    ) -> Result<Vec<Entry>, BackendError> {
        let mut state = self.enter(Call::Entries {
            environment: environment.to_string(),
            content_type: content_type.to_string(),
        })?;
        Ok(environment_mut(&mut state, environment)?
            .entries
            .iter()
            .filter(|e| e.content_type == content_type)
            .cloned()
            .collect())
    }

    async fn update_entry(
        &self,
        environment: &EnvironmentId,
        entry: &Entry,
    ) -> Result<Entry, BackendError> {
        let mut state = self.enter(Call::UpdateEntry {
            environment: environment.to_string(),
            entry: entry.id.clone(),
        })?;
        let stored = environment_mut(&mut state, environment)?
            .entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| BackendError::not_found(format!("entry {}", entry.id)))?;
        if stored.version != entry.version {
            return Err(conflict(&entry.id));
        }
        stored.fields = entry.fields.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn publish_entry(
        &self,
        environment: &EnvironmentId,
        entry: &Entry,
    ) -> Result<Entry, BackendError> {
        let mut state = self.enter(Call::PublishEntry {
            environment: environment.to_string(),
            entry: entry.id.clone(),
        })?;
        let stored = environment_mut(&mut state, environment)?
            .entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| BackendError::not_found(format!("entry {}", entry.id)))?;
        if stored.version != entry.version {
            return Err(conflict(&entry.id));
        }
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn alias(&self, name: &str) -> Result<Alias, BackendError> {
        let state = self.enter(Call::GetAlias(name.to_string()))?;
        state
            .aliases
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("environment alias {name}")))
    }

    async fn update_alias(&self, alias: &Alias) -> Result<Alias, BackendError> {
        let mut state = self.enter(Call::UpdateAlias {
            alias: alias.id.clone(),
            environment: alias.environment.to_string(),
        })?;
        if !state.environments.contains_key(&alias.environment) {
            return Err(BackendError::Status {
                status: 422,
                message: format!("environment {} does not exist", alias.environment),
            });
        }
        let stored = state
            .aliases
            .get_mut(&alias.id)
            .ok_or_else(|| BackendError::not_found(format!("environment alias {}", alias.id)))?;
        if stored.version != alias.version {
            return Err(conflict(&alias.id));
        }
        stored.environment = alias.environment.clone();
        stored.version += 1;
        Ok(stored.clone())
    }
}

/// Version record entry holding `version` under the default locale
pub fn version_entry(id: &str, version: &str) -> Entry {
    let mut entry = Entry::new(id, VERSION_CONTENT_TYPE, 1);
    entry.set_localized(VERSION_FIELD, DEFAULT_LOCALE, version);
    entry
}

/// `MigrationExecutor` that records attempts and fails on chosen versions
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    failing: HashSet<String>,
    attempted: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, version: &str) -> Self {
        self.failing.insert(version.to_string());
        self
    }

    /// Versions attempted, in order
    pub fn attempted(&self) -> Vec<String> {
        self.attempted.lock().iter().map(|(v, _)| v.clone()).collect()
    }

    /// Environments targeted, in order
    pub fn targets(&self) -> Vec<String> {
        self.attempted.lock().iter().map(|(_, e)| e.clone()).collect()
    }
}

#[async_trait]
impl MigrationExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        migration: &MigrationDescriptor,
        target: &MigrationTarget,
    ) -> Result<(), ExecutionError> {
        let version = migration.version.to_string();
        self.attempted
            .lock()
            .push((version.clone(), target.environment.to_string()));

        if self.failing.contains(&version) {
            return Err(ExecutionError::Failed {
                path: migration.path.clone(),
                code: Some(1),
                stderr: format!("scripted failure for {version}"),
            });
        }
        Ok(())
    }
}

/// Workspace root whose `migrations/` holds one file per version
pub fn workspace_with_migrations(versions: &[&str]) -> tempfile::TempDir {
    let root = tempfile::tempdir().expect("create temp dir");
    let dir = root.path().join("migrations");
    std::fs::create_dir(&dir).expect("create migrations dir");
    for version in versions {
        let file = envmig_core::codec::to_file(version).expect("valid version");
        std::fs::write(dir.join(file), "module.exports = function (migration) {};\n")
            .expect("write migration");
    }
    root
}

/// Configuration for `git_ref` rooted at `workspace`, with fast polling
pub fn test_config(workspace: &Path, git_ref: &str) -> MigrateConfig {
    MigrateConfig::new("space1", Secret::new("CFPAT-test"), git_ref, workspace)
        .with_poll_interval(Duration::from_millis(1))
        .with_max_poll_attempts(5)
        .expect("non-zero attempts")
}
