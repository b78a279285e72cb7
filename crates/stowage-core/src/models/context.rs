//! Request-scoped inputs to the upload pipeline.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::Role;

/// Caller identity as handed over by the session layer. Opaque to this crate
/// apart from the fields below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadContext {
    pub user_id: Option<String>,
    pub role: Role,
    pub tenant_id: String,
    #[serde(default)]
    pub client_ip: Option<IpAddr>,
}

impl UploadContext {
    pub fn new(user_id: impl Into<String>, role: Role, tenant_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role,
            tenant_id: tenant_id.into(),
            client_ip: None,
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }
}

/// Declared attributes of a file awaiting acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCandidate {
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
}

impl FileCandidate {
    pub fn new(original_name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            original_name: original_name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }
}
