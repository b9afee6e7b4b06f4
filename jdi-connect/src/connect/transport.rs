// Transport identity
//
// A transport only names the medium that carries JDWP. It has no behaviour
// of its own; connectors pick the mechanics.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Transport {
    #[serde(rename = "dt_socket")]
    Socket,
    #[serde(rename = "dt_shmem")]
    SharedMemory,
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Socket => "dt_socket",
            Transport::SharedMemory => "dt_shmem",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dt_socket" => Some(Transport::Socket),
            "dt_shmem" => Some(Transport::SharedMemory),
            _ => None,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(Transport::Socket.name(), "dt_socket");
        assert_eq!(Transport::from_name("dt_shmem"), Some(Transport::SharedMemory));
        assert_eq!(Transport::from_name("socket"), None);
        assert_eq!(serde_json::to_string(&Transport::Socket).unwrap(), "\"dt_socket\"");
    }
}
