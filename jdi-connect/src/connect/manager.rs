// Connector registry
//
// Knows every available connector and exposes them by strategy, so a front
// end can list connectors and their argument schemas generically.

use crate::connect::argument::Arguments;
use crate::connect::attach::SocketAttachingConnector;
use crate::connect::connector::{AttachingConnector, LaunchingConnector, ListeningConnector};
use crate::connect::launch::{CommandLineLaunchingConnector, RawCommandLineLaunchingConnector};
use crate::connect::listen::SocketListeningConnector;
use crate::connect::transport::Transport;
use serde::Serialize;
use std::sync::Arc;

/// A registered connector of any strategy
#[derive(Debug, Clone)]
pub enum AnyConnector {
    Attaching(Arc<dyn AttachingConnector>),
    Launching(Arc<dyn LaunchingConnector>),
    Listening(Arc<dyn ListeningConnector>),
}

/// Serializable description of a connector and its defaults
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorInfo {
    pub name: String,
    pub description: String,
    pub kind: &'static str,
    pub transport: Transport,
    pub arguments: Arguments,
}

impl AnyConnector {
    pub fn name(&self) -> &str {
        match self {
            AnyConnector::Attaching(c) => c.name(),
            AnyConnector::Launching(c) => c.name(),
            AnyConnector::Listening(c) => c.name(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            AnyConnector::Attaching(c) => c.description(),
            AnyConnector::Launching(c) => c.description(),
            AnyConnector::Listening(c) => c.description(),
        }
    }

    pub fn transport(&self) -> Transport {
        match self {
            AnyConnector::Attaching(c) => c.transport(),
            AnyConnector::Launching(c) => c.transport(),
            AnyConnector::Listening(c) => c.transport(),
        }
    }

    pub fn default_arguments(&self) -> Arguments {
        match self {
            AnyConnector::Attaching(c) => c.default_arguments(),
            AnyConnector::Launching(c) => c.default_arguments(),
            AnyConnector::Listening(c) => c.default_arguments(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnyConnector::Attaching(_) => "attaching",
            AnyConnector::Launching(_) => "launching",
            AnyConnector::Listening(_) => "listening",
        }
    }

    pub fn info(&self) -> ConnectorInfo {
        ConnectorInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            kind: self.kind(),
            transport: self.transport(),
            arguments: self.default_arguments(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorManager {
    attaching: Vec<Arc<dyn AttachingConnector>>,
    launching: Vec<Arc<dyn LaunchingConnector>>,
    listening: Vec<Arc<dyn ListeningConnector>>,
}

impl Default for ConnectorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorManager {
    /// Registry holding the built-in socket connectors
    pub fn new() -> Self {
        let mut manager = Self::empty();
        // The first launching connector is the default connector
        manager.register_launching(Arc::new(CommandLineLaunchingConnector::new()));
        manager.register_launching(Arc::new(RawCommandLineLaunchingConnector::new()));
        manager.register_attaching(Arc::new(SocketAttachingConnector::new()));
        manager.register_listening(Arc::new(SocketListeningConnector::new()));
        manager
    }

    pub fn empty() -> Self {
        Self {
            attaching: Vec::new(),
            launching: Vec::new(),
            listening: Vec::new(),
        }
    }

    pub fn register_attaching(&mut self, connector: Arc<dyn AttachingConnector>) {
        self.attaching.push(connector);
    }

    pub fn register_launching(&mut self, connector: Arc<dyn LaunchingConnector>) {
        self.launching.push(connector);
    }

    pub fn register_listening(&mut self, connector: Arc<dyn ListeningConnector>) {
        self.listening.push(connector);
    }

    pub fn attaching_connectors(&self) -> &[Arc<dyn AttachingConnector>] {
        &self.attaching
    }

    pub fn launching_connectors(&self) -> &[Arc<dyn LaunchingConnector>] {
        &self.launching
    }

    pub fn listening_connectors(&self) -> &[Arc<dyn ListeningConnector>] {
        &self.listening
    }

    pub fn all_connectors(&self) -> Vec<AnyConnector> {
        let launching = self.launching.iter().cloned().map(AnyConnector::Launching);
        let attaching = self.attaching.iter().cloned().map(AnyConnector::Attaching);
        let listening = self.listening.iter().cloned().map(AnyConnector::Listening);
        launching.chain(attaching).chain(listening).collect()
    }

    pub fn default_connector(&self) -> Option<Arc<dyn LaunchingConnector>> {
        self.launching.first().cloned()
    }

    pub fn connector(&self, name: &str) -> Option<AnyConnector> {
        self.all_connectors().into_iter().find(|c| c.name() == name)
    }

    pub fn attaching_connector(&self, name: &str) -> Option<Arc<dyn AttachingConnector>> {
        self.attaching.iter().find(|c| c.name() == name).cloned()
    }

    pub fn launching_connector(&self, name: &str) -> Option<Arc<dyn LaunchingConnector>> {
        self.launching.iter().find(|c| c.name() == name).cloned()
    }

    pub fn listening_connector(&self, name: &str) -> Option<Arc<dyn ListeningConnector>> {
        self.listening.iter().find(|c| c.name() == name).cloned()
    }
}
