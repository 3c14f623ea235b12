//! Observer readings: the latest known permission and network state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Grant status a permission capability reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

impl PermissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Prompt => "prompt",
        }
    }
}

/// What the permission observer currently knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionReading {
    Uninitialized,
    /// Introspection was requested but has not answered yet.
    Resolving,
    Granted,
    Denied,
    Prompt,
    /// The platform cannot introspect permissions. Terminal.
    Unsupported,
}

impl PermissionReading {
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Uninitialized | Self::Resolving)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Resolving => "resolving...",
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Prompt => "prompt",
            Self::Unsupported => "permissions API unavailable",
        }
    }
}

impl From<PermissionState> for PermissionReading {
    fn from(state: PermissionState) -> Self {
        match state {
            PermissionState::Granted => Self::Granted,
            PermissionState::Denied => Self::Denied,
            PermissionState::Prompt => Self::Prompt,
        }
    }
}

impl fmt::Display for PermissionReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the connectivity observer currently knows.
///
/// `Online` means a network interface is up, not that anything is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkReading {
    Uninitialized,
    Online,
    Offline,
    /// The platform exposes no connectivity signal. Terminal.
    Unsupported,
}

impl NetworkReading {
    pub fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "resolving...",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unsupported => "network API unavailable",
        }
    }
}

impl fmt::Display for NetworkReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
