// Debug session management
//
// Tracks connected VMs and open listeners between tool calls

use jdi_connect::{ListenSession, VirtualMachine};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub type SessionId = String;
pub type ListenerId = String;

#[derive(Debug)]
pub struct DebugSession {
    /// Taken out when the session is disconnected
    pub vm: Option<VirtualMachine>,
    /// Tasks draining a launched target's stdout/stderr
    pub output_drains: Vec<JoinHandle<()>>,
}

impl DebugSession {
    pub fn vm_mut(&mut self) -> Result<&mut VirtualMachine, String> {
        self.vm
            .as_mut()
            .ok_or_else(|| "Debug session is disconnected".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ListenerInfo {
    pub connector: String,
    pub session: ListenSession,
}

pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<Mutex<DebugSession>>>>>,
    listeners: Arc<Mutex<HashMap<ListenerId, ListenerInfo>>>,
    current_session: Arc<Mutex<Option<SessionId>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            current_session: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn create_session(&self, vm: VirtualMachine, output_drains: Vec<JoinHandle<()>>) -> SessionId {
        let session_id = format!("session_{}", ids::next());
        let session = DebugSession {
            vm: Some(vm),
            output_drains,
        };

        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_id.clone(), Arc::new(Mutex::new(session)));

        let mut current = self.current_session.lock().await;
        *current = Some(session_id.clone());

        session_id
    }

    pub async fn get_current_session(&self) -> Option<Arc<Mutex<DebugSession>>> {
        let current = self.current_session.lock().await;
        let session_id = current.as_ref()?;
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).cloned()
    }

    pub async fn get_current_session_id(&self) -> Option<SessionId> {
        self.current_session.lock().await.clone()
    }

    /// Remove a session; it is no longer reachable as the current session
    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<Mutex<DebugSession>>> {
        let removed = self.sessions.lock().await.remove(session_id);

        let mut current = self.current_session.lock().await;
        if current.as_deref() == Some(session_id) {
            *current = None;
        }

        removed
    }

    pub async fn add_listener(&self, connector: &str, session: ListenSession) -> ListenerId {
        let listener_id = format!("listener_{}", ids::next());
        let info = ListenerInfo {
            connector: connector.to_string(),
            session,
        };
        self.listeners.lock().await.insert(listener_id.clone(), info);
        listener_id
    }

    pub async fn get_listener(&self, listener_id: &str) -> Option<ListenerInfo> {
        self.listeners.lock().await.get(listener_id).cloned()
    }

    pub async fn remove_listener(&self, listener_id: &str) -> Option<ListenerInfo> {
        self.listeners.lock().await.remove(listener_id)
    }
}

// Short unique IDs for sessions and listeners
mod ids {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(1);

    pub fn next() -> String {
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        format!("{:x}{:x}", timestamp, counter)
    }
}
