// session.rs — Session lifecycle and composition.
//
// start() wires the pieces together: directory tree → policy artifacts →
// mediator (served on a Unix socket in the session's sockets dir) →
// agent. The built-in agent connects to that socket as a JSON-RPC client;
// container mode additionally starts the MITM egress proxy on a second
// socket and boots the container against both.
//
// Status machine: Initializing → Ready → Processing → Ready | Closed.
// close() stops processes and keeps the directory for forensics and
// --resume; destroy() is the explicit teardown that deletes the tree.
// Nothing ever deletes on crash.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rmcp::service::{RoleClient, RunningService};
use rmcp::ServiceExt;
use uuid::Uuid;

use ic_agent::{
    mediator_tools, AgentConfig, BudgetStatus, BudgetTracker, CodeAgent, Isolate, IsolateConfig,
    StopReason,
};
use ic_approver::AutoApprover;
use ic_container::{AgentAdapter, ContainerRuntime, ContainerSession, ContainerSpec, DEFAULT_DOCKERFILE};
use ic_downstream::DownstreamConfig;
use ic_egress::{builtin_providers, CertificateAuthority, EgressConfig, EgressProxy, FakeKeys};
use ic_escalation::{
    EscalationDecision, EscalationDir, EscalationRequest, EscalationWatcher, ResolveStatus,
    SessionRegistration, SessionRegistry,
};
use ic_mediator::{serve_unix, Mediator, MediatorConfig};
use ic_policy::{AnnotationsFile, CompiledPolicy};
use ic_provider::{ChatApi, ChatMessage, ChatProvider, HttpChatClient, ProviderKeys};

use crate::config::Settings;
use crate::error::SessionError;
use crate::paths::{validate_session_id, HomePaths, SessionPaths};

/// Session status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Initializing,
    Ready,
    Processing,
    Closed,
}

/// Which agent runs the session.
pub enum AgentChoice {
    /// The built-in code-interpreter agent.
    Builtin,
    /// An external agent in a container.
    Container(AgentAdapter),
}

/// Options for starting (or resuming) a session.
pub struct StartOptions {
    /// Explicit id (resume) or None for a fresh one.
    pub session_id: Option<String>,
    /// Label shown in the escalation listener dashboard.
    pub label: String,
    pub agent: AgentChoice,
    /// Chat backend override; None builds an HTTP client from settings.
    pub chat_api: Option<Arc<dyn ChatApi>>,
}

impl StartOptions {
    pub fn builtin(label: impl Into<String>) -> Self {
        Self {
            session_id: None,
            label: label.into(),
            agent: AgentChoice::Builtin,
            chat_api: None,
        }
    }
}

enum AgentHandle {
    Builtin {
        agent: CodeAgent,
        // Keeps the client connection (and its reader task) alive.
        _client: RunningService<RoleClient, ()>,
    },
    Container {
        container: ContainerSession,
        adapter: AgentAdapter,
        transcript: Vec<ChatMessage>,
        budget: BudgetTracker,
    },
}

/// Creates and resumes sessions under one home directory.
pub struct SessionManager {
    settings: Settings,
    home: HomePaths,
}

impl SessionManager {
    pub fn new(settings: Settings) -> Self {
        let home = HomePaths::new(&settings.home);
        Self { settings, home }
    }

    pub fn home(&self) -> &HomePaths {
        &self.home
    }

    /// Ids of every session directory on disk.
    pub fn list_sessions(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.home.sessions_dir()) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        ids.sort();
        ids
    }

    /// Start a new session, or resume one when `session_id` names an
    /// existing directory.
    pub async fn start(&self, options: StartOptions) -> Result<Session, SessionError> {
        let StartOptions {
            session_id: requested_id,
            label,
            agent: agent_choice,
            chat_api,
        } = options;

        let session_id = match &requested_id {
            Some(id) => {
                validate_session_id(id)?;
                id.clone()
            }
            None => format!("s-{}", &Uuid::new_v4().simple().to_string()[..12]),
        };
        let paths = SessionPaths::for_session(&self.settings.home, &session_id)?;
        let resumed = paths.exists();
        if requested_id.is_some() && !resumed {
            return Err(SessionError::UnknownSession(session_id));
        }
        paths.create_all()?;

        // Policy artifacts. Missing artifacts mean an empty (default-deny)
        // policy, which only structural allows can pass.
        let annotations = if self.home.annotations().exists() {
            AnnotationsFile::load(self.home.annotations()).map_err(ic_mediator::MediatorError::from)?
        } else {
            tracing::warn!("no tool-annotations.json: every tool call will be denied");
            AnnotationsFile {
                generated_at: Utc::now(),
                servers: Default::default(),
            }
        };
        let policy = if self.home.compiled_policy().exists() {
            CompiledPolicy::load(self.home.compiled_policy())
                .map_err(ic_mediator::MediatorError::from)?
        } else {
            CompiledPolicy {
                generated_at: Utc::now(),
                constitution_hash: String::new(),
                input_hash: String::new(),
                rules: Vec::new(),
            }
        };
        let downstream = if self.home.server_config().exists() {
            DownstreamConfig::load(self.home.server_config())
                .map_err(ic_mediator::MediatorError::from)?
        } else {
            DownstreamConfig::default()
        };

        let mut mediator_config = MediatorConfig::for_session(&session_id, &paths.root);
        mediator_config.escalation_timeout =
            Duration::from_secs(self.settings.user.escalation_timeout_seconds);
        if let Some(path) = &self.settings.audit_log_path {
            mediator_config.audit_log_path = path.clone();
        }
        if let Some(dir) = &self.settings.escalation_dir {
            mediator_config.escalation_dir = dir.clone();
        }
        // The trust anchors of the installation are never readable or
        // writable, whatever the compiled policy says.
        mediator_config.protected_paths = vec![self.home.ca_dir(), self.home.config()];
        if let Some(ssh) = dirs::home_dir().map(|h| h.join(".ssh")) {
            mediator_config.protected_paths.push(ssh);
        }
        mediator_config.sandbox_warn_only =
            matches!(self.settings.sandbox_policy, crate::config::SandboxPolicy::Warn);

        let approver = self.build_approver()?;
        let escalation_dir = EscalationDir::new(&mediator_config.escalation_dir);
        let (mediator, start_errors) =
            Mediator::start(mediator_config, annotations, policy, downstream, approver).await?;
        for (server, error) in &start_errors {
            tracing::warn!(server = %server, error = %error, "downstream server unavailable");
        }
        if let Some(dir) = &self.settings.allowed_directory {
            mediator.manager().add_root(dir.clone()).await;
        }

        // Serve the mediator on the session socket. The same shutdown
        // channel stops the egress proxy in container mode.
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let socket_path = paths.mediator_socket();
        let mediator_task = tokio::spawn({
            let mediator = mediator.clone();
            let socket_path = socket_path.clone();
            let shutdown_rx = shutdown_rx.clone();
            async move {
                if let Err(error) = serve_unix(mediator, socket_path, shutdown_rx).await {
                    tracing::error!(error = %error, "mediator server stopped");
                }
            }
        });

        // Announce the session to escalation listeners.
        let registry = SessionRegistry::new(self.home.pty_registry_dir());
        registry.register(&SessionRegistration::for_current_process(
            &session_id,
            escalation_dir.path(),
            &label,
        ))?;

        let (agent, egress_task) = match agent_choice {
            AgentChoice::Builtin => {
                let agent = self.start_builtin_agent(&paths, chat_api).await?;
                (agent, None)
            }
            AgentChoice::Container(adapter) => {
                let (agent, task) = self
                    .start_container_agent(&session_id, &paths, adapter, shutdown_rx.clone())
                    .await?;
                (agent, Some(task))
            }
        };

        let session = Session {
            id: session_id,
            status: SessionStatus::Ready,
            paths,
            escalation_dir: escalation_dir.clone(),
            watcher: EscalationWatcher::new(escalation_dir),
            registry,
            mediator,
            shutdown: shutdown_tx,
            mediator_task,
            egress_task,
            agent,
        };
        session.log_line(if resumed { "session resumed" } else { "session started" });
        Ok(session)
    }

    fn build_approver(&self) -> Result<Option<AutoApprover>, SessionError> {
        let auto = &self.settings.user.auto_approve;
        if !auto.enabled {
            return Ok(None);
        }
        let Some(model_id) = auto.model_id.clone() else {
            tracing::warn!("autoApprove.enabled without modelId; escalations go to the human");
            return Ok(None);
        };
        let Some(provider) = ChatProvider::for_model(&model_id) else {
            tracing::warn!(model = %model_id, "unknown auto-approve model; escalations go to the human");
            return Ok(None);
        };
        let Some(key) = self.settings.user.provider_api_keys.get(provider) else {
            tracing::warn!(provider = provider.name(), "no key for auto-approve provider");
            return Ok(None);
        };
        let client = HttpChatClient::new(provider, key, Duration::from_secs(20))?;
        Ok(Some(AutoApprover::new(Box::new(client), model_id)))
    }

    /// Connect the built-in agent to the mediator socket.
    async fn start_builtin_agent(
        &self,
        paths: &SessionPaths,
        chat_api: Option<Arc<dyn ChatApi>>,
    ) -> Result<AgentHandle, SessionError> {
        let socket = paths.mediator_socket();
        let stream = connect_with_retry(&socket).await?;
        let (read, write) = stream.into_split();
        let client = ()
            .serve((read, write))
            .await
            .map_err(|e| SessionError::AgentConnect(e.to_string()))?;

        let tool_names: Vec<String> = client
            .list_tools(None)
            .await
            .map_err(|e| SessionError::AgentConnect(e.to_string()))?
            .tools
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        let peer = client.peer().clone();

        let api: Arc<dyn ChatApi> = match chat_api {
            Some(api) => api,
            None => {
                let model = &self.settings.user.agent_model_id;
                let provider = ChatProvider::for_model(model).unwrap_or(ChatProvider::Anthropic);
                let key = self
                    .settings
                    .user
                    .provider_api_keys
                    .get(provider)
                    .ok_or_else(|| {
                        SessionError::AgentConnect(format!(
                            "no API key configured for provider '{}'",
                            provider.name()
                        ))
                    })?;
                Arc::new(HttpChatClient::new(provider, key, Duration::from_secs(300))?)
            }
        };

        let isolate = Isolate::new(
            IsolateConfig::default(),
            mediator_tools(peer, tokio::runtime::Handle::current(), tool_names),
        );
        let budget = BudgetTracker::new(
            self.settings.user.resource_budget.clone(),
            3e-6,
            15e-6,
        );
        let agent = CodeAgent::new(
            api,
            AgentConfig::new(&self.settings.user.agent_model_id),
            isolate,
            budget,
        );
        Ok(AgentHandle::Builtin {
            agent,
            _client: client,
        })
    }

    /// Container mode: egress proxy + CA + container wired to both sockets.
    async fn start_container_agent(
        &self,
        session_id: &str,
        paths: &SessionPaths,
        adapter: AgentAdapter,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(AgentHandle, tokio::task::JoinHandle<()>), SessionError> {
        let ca = CertificateAuthority::load_or_generate(self.home.ca_dir())?;
        std::fs::write(paths.container_ca_cert(), ca.cert_pem()).map_err(|source| {
            SessionError::Io {
                path: paths.container_ca_cert(),
                source,
            }
        })?;

        let providers = builtin_providers();
        let fake_keys = FakeKeys::generate(&providers);
        let real_keys = real_key_map(&self.settings.user.provider_api_keys);
        let container_env = fake_key_env(&fake_keys);

        let proxy = Arc::new(EgressProxy::new(
            ca,
            EgressConfig {
                providers,
                real_keys,
                fake_keys,
            },
        )?);
        let listener = tokio::net::UnixListener::bind(paths.egress_socket())
            .map_err(ic_egress::EgressError::from)?;
        let egress_task = tokio::spawn(async move {
            if let Err(error) = proxy.run_unix(listener, shutdown).await {
                tracing::error!(error = %error, "egress proxy stopped");
            }
        });

        let runtime = ContainerRuntime::detect()?;
        let image = runtime.ensure_image(DEFAULT_DOCKERFILE).await?;
        let container = runtime
            .start(ContainerSpec {
                name: format!("ironcurtain-{session_id}"),
                image,
                sockets_dir: paths.sockets.clone(),
                env: container_env,
            })
            .await?;

        let budget = BudgetTracker::new(self.settings.user.resource_budget.clone(), 0.0, 0.0);
        Ok((
            AgentHandle::Container {
                container,
                adapter,
                transcript: Vec::new(),
                budget,
            },
            egress_task,
        ))
    }
}

/// An opaque handle to one running session.
pub struct Session {
    id: String,
    status: SessionStatus,
    paths: SessionPaths,
    escalation_dir: EscalationDir,
    watcher: EscalationWatcher,
    registry: SessionRegistry,
    mediator: Mediator,
    shutdown: tokio::sync::watch::Sender<bool>,
    mediator_task: tokio::task::JoinHandle<()>,
    egress_task: Option<tokio::task::JoinHandle<()>>,
    agent: AgentHandle,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }

    /// Send one message to the agent and wait for its reply.
    pub async fn send_message(&mut self, text: &str) -> Result<String, SessionError> {
        if self.status == SessionStatus::Closed {
            return Err(SessionError::SessionClosed(self.id.clone()));
        }
        self.status = SessionStatus::Processing;

        // The most recent human input feeds the auto-approver.
        self.escalation_dir.write_user_context(text)?;
        self.append_interaction("user", text)?;

        let (reply, exhausted) = match &mut self.agent {
            AgentHandle::Builtin { agent, .. } => {
                let turn = agent.run_turn(text).await?;
                let exhausted = matches!(turn.stop, StopReason::BudgetExhausted(_));
                (turn.text, exhausted)
            }
            AgentHandle::Container {
                container,
                adapter,
                transcript,
                budget,
            } => {
                if let Some(dimension) = budget.exceeded() {
                    (format!("Stopped: {dimension} budget exhausted."), true)
                } else {
                    transcript.push(ChatMessage::user(text));
                    let reply = container.send_turn(*adapter, text).await?;
                    transcript.push(ChatMessage::assistant(reply.clone()));
                    budget.add_step();
                    (reply, budget.exceeded().is_some())
                }
            }
        };

        self.append_interaction("assistant", &reply)?;
        if exhausted {
            self.log_line("budget exhausted, closing session");
            self.close().await;
        } else {
            self.status = SessionStatus::Ready;
        }
        Ok(reply)
    }

    /// Escalations currently waiting for a decision in this session.
    pub fn get_pending_escalations(&mut self) -> Result<Vec<EscalationRequest>, SessionError> {
        self.watcher.poll()?;
        Ok(self.watcher.pending().into_iter().cloned().collect())
    }

    /// Decide one pending escalation.
    pub fn resolve_escalation(
        &mut self,
        escalation_id: Uuid,
        approved: bool,
    ) -> Result<ResolveStatus, SessionError> {
        self.watcher.poll()?;
        let decision = if approved {
            EscalationDecision::Approved
        } else {
            EscalationDecision::Denied
        };
        Ok(self.watcher.resolve(escalation_id, decision)?)
    }

    /// The session.log contents.
    pub fn get_diagnostic_log(&self) -> Result<String, SessionError> {
        std::fs::read_to_string(&self.paths.session_log).or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(String::new())
            } else {
                Err(SessionError::Io {
                    path: self.paths.session_log.clone(),
                    source: e,
                })
            }
        })
    }

    /// Conversation so far.
    pub fn get_history(&self) -> Vec<ChatMessage> {
        match &self.agent {
            AgentHandle::Builtin { agent, .. } => agent.history().to_vec(),
            AgentHandle::Container { transcript, .. } => transcript.clone(),
        }
    }

    pub fn get_budget_status(&self) -> BudgetStatus {
        match &self.agent {
            AgentHandle::Builtin { agent, .. } => agent.budget_status(),
            AgentHandle::Container { budget, .. } => budget.status(),
        }
    }

    /// Stop the session's processes. The directory stays on disk.
    pub async fn close(&mut self) {
        if self.status == SessionStatus::Closed {
            return;
        }
        self.status = SessionStatus::Closed;
        let _ = self.shutdown.send(true);
        let _ = self.registry.deregister(&self.id);
        if let AgentHandle::Container { container, .. } = &self.agent {
            let _ = container.teardown().await;
        }
        self.mediator_task.abort();
        if let Some(task) = &self.egress_task {
            task.abort();
        }
        self.log_line("session closed");
    }

    /// Explicit teardown: close and delete the session tree.
    pub async fn destroy(mut self) -> Result<(), SessionError> {
        self.close().await;
        std::fs::remove_dir_all(&self.paths.root).map_err(|source| SessionError::Io {
            path: self.paths.root.clone(),
            source,
        })
    }

    fn append_interaction(&self, role: &str, text: &str) -> Result<(), SessionError> {
        use std::io::Write;
        let line = serde_json::json!({
            "timestamp": Utc::now(),
            "role": role,
            "text": text,
        });
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.interactions)
            .map_err(|source| SessionError::Io {
                path: self.paths.interactions.clone(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| SessionError::Io {
            path: self.paths.interactions.clone(),
            source,
        })
    }

    fn log_line(&self, message: &str) {
        use std::io::Write;
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.session_log)
        {
            let _ = writeln!(file, "{} {}", Utc::now().to_rfc3339(), message);
        }
    }
}

/// The mediator socket appears a beat after spawn; retry briefly.
async fn connect_with_retry(
    socket: &std::path::Path,
) -> Result<tokio::net::UnixStream, SessionError> {
    for _ in 0..40 {
        match tokio::net::UnixStream::connect(socket).await {
            Ok(stream) => return Ok(stream),
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    Err(SessionError::AgentConnect(format!(
        "mediator socket {} never came up",
        socket.display()
    )))
}

fn real_key_map(keys: &ProviderKeys) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for provider in ChatProvider::ALL {
        if let Some(key) = keys.get(provider) {
            map.insert(provider.name().to_string(), key.to_string());
        }
    }
    map
}

/// The sentinel keys handed to the container as provider env vars.
fn fake_key_env(fake_keys: &FakeKeys) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for (provider, var) in [
        ("anthropic", "ANTHROPIC_API_KEY"),
        ("openai", "OPENAI_API_KEY"),
        ("google", "GOOGLE_API_KEY"),
    ] {
        if let Some(key) = fake_keys.get(provider) {
            env.insert(var.to_string(), key.to_string());
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SandboxPolicy, UserConfig};
    use ic_provider::{ChatRequest, ChatResponse, ProviderError};

    struct Prose(&'static str);

    impl ChatApi for Prose {
        fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                text: self.0.to_string(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    fn settings(home: &std::path::Path) -> Settings {
        Settings {
            home: home.to_path_buf(),
            user: UserConfig::default(),
            allowed_directory: None,
            audit_log_path: None,
            escalation_dir: None,
            sandbox_policy: SandboxPolicy::Enforce,
        }
    }

    fn options(api: Arc<dyn ChatApi>) -> StartOptions {
        StartOptions {
            session_id: None,
            label: "test".to_string(),
            agent: AgentChoice::Builtin,
            chat_api: Some(api),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn builtin_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(settings(dir.path()));

        let mut session = manager
            .start(options(Arc::new(Prose("all done"))))
            .await
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Ready);

        let reply = session.send_message("hello").await.unwrap();
        assert_eq!(reply, "all done");
        assert_eq!(session.status(), SessionStatus::Ready);

        // Both turns are on disk.
        let interactions =
            std::fs::read_to_string(&session.paths().interactions).unwrap();
        assert_eq!(interactions.lines().count(), 2);

        // The message fed the auto-approver context file.
        let context = session.escalation_dir.read_user_context().unwrap().unwrap();
        assert_eq!(context.message, "hello");

        session.close().await;
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(session.send_message("again").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sessions_are_listed_and_resumable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(settings(dir.path()));

        let mut session = manager
            .start(options(Arc::new(Prose("done"))))
            .await
            .unwrap();
        let id = session.id().to_string();
        session.close().await;

        assert_eq!(manager.list_sessions(), vec![id.clone()]);

        let mut resumed = manager
            .start(StartOptions {
                session_id: Some(id.clone()),
                label: "resumed".to_string(),
                agent: AgentChoice::Builtin,
                chat_api: Some(Arc::new(Prose("back"))),
            })
            .await
            .unwrap();
        assert_eq!(resumed.id(), id);
        resumed.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn resuming_a_missing_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(settings(dir.path()));
        let result = manager
            .start(StartOptions {
                session_id: Some("never-existed".to_string()),
                label: "x".to_string(),
                agent: AgentChoice::Builtin,
                chat_api: Some(Arc::new(Prose("n/a"))),
            })
            .await;
        assert!(matches!(result, Err(SessionError::UnknownSession(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn destroy_removes_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(settings(dir.path()));

        let session = manager
            .start(options(Arc::new(Prose("done"))))
            .await
            .unwrap();
        let root = session.paths().root.clone();
        assert!(root.is_dir());

        session.destroy().await.unwrap();
        assert!(!root.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn session_registers_in_the_pty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(settings(dir.path()));

        let mut session = manager
            .start(options(Arc::new(Prose("done"))))
            .await
            .unwrap();

        let registry = SessionRegistry::new(manager.home().pty_registry_dir());
        let live = registry.list_live().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].session_id, session.id());

        session.close().await;
        assert!(registry.list_live().unwrap().is_empty());
    }
}
