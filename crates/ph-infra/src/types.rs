use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque runtime-side container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeHandle(pub String);

impl RuntimeHandle {
    /// Abbreviated form for display, like `docker ps`.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Specification for creating a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub memory_gib: u32,
    pub hostname: String,
    pub labels: HashMap<String, String>,
}

impl ContainerSpec {
    pub fn memory_limit_bytes(&self) -> i64 {
        i64::from(self.memory_gib) * 1024 * 1024 * 1024
    }
}

/// Runtime-reported container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
}
