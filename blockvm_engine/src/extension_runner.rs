//! Loader for third-party extensions and the permission gates around them.
//!
//! Extensions register the opcodes they contribute; the compiler treats
//! every such target as an opaque `ADDON_CALL` with unknown effect. The
//! runner also fronts the embedder's [`SecurityManager`] for the requests
//! extension code is allowed to make, with two hard rules that no manager
//! can override: fetches of `data:` and `blob:` URLs involve no remote
//! request and are always allowed, and `javascript:` navigation would
//! execute code and is always rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Embedder-supplied permission decisions.
pub trait SecurityManager {
    fn can_fetch(&self, url: &str) -> bool;
    fn can_open_window(&self, url: &str) -> bool;
    fn can_redirect(&self, url: &str) -> bool;
}

/// Refuses everything. The safe default for embedders without their own
/// policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllSecurityManager;

impl SecurityManager for DenyAllSecurityManager {
    fn can_fetch(&self, _url: &str) -> bool {
        false
    }

    fn can_open_window(&self, _url: &str) -> bool {
        false
    }

    fn can_redirect(&self, _url: &str) -> bool {
        false
    }
}

/// A loaded extension and the call targets it contributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub id: String,
    /// Opcodes this extension serves; referenced from `ADDON_CALL` inputs.
    pub addon_opcodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("extension `{0}` is already registered")]
    DuplicateId(String),
}

#[derive(Debug)]
pub struct ExtensionRunner<S: SecurityManager> {
    security: S,
    extensions: Vec<ExtensionInfo>,
}

impl<S: SecurityManager> ExtensionRunner<S> {
    pub fn new(security: S) -> Self {
        Self {
            security,
            extensions: Vec::new(),
        }
    }

    pub fn register(&mut self, info: ExtensionInfo) -> Result<(), ExtensionError> {
        if self.extensions.iter().any(|ext| ext.id == info.id) {
            return Err(ExtensionError::DuplicateId(info.id));
        }
        self.extensions.push(info);
        Ok(())
    }

    pub fn extensions(&self) -> &[ExtensionInfo] {
        &self.extensions
    }

    /// Every opcode served by a registered extension.
    pub fn addon_targets(&self) -> impl Iterator<Item = &str> {
        self.extensions
            .iter()
            .flat_map(|ext| ext.addon_opcodes.iter().map(String::as_str))
    }

    pub fn can_fetch(&self, url: &str) -> bool {
        // No remote request is involved for these.
        if matches!(scheme(url), Some("data") | Some("blob")) {
            return true;
        }
        self.security.can_fetch(url)
    }

    pub fn can_open_window(&self, url: &str) -> bool {
        if scheme(url) == Some("javascript") {
            return false;
        }
        self.security.can_open_window(url)
    }

    pub fn can_redirect(&self, url: &str) -> bool {
        if scheme(url) == Some("javascript") {
            return false;
        }
        self.security.can_redirect(url)
    }
}

fn scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once(':')?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return None;
    }
    Some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Allows everything, so the hard rules are observable on their own.
    struct AllowAll;

    impl SecurityManager for AllowAll {
        fn can_fetch(&self, _url: &str) -> bool {
            true
        }

        fn can_open_window(&self, _url: &str) -> bool {
            true
        }

        fn can_redirect(&self, _url: &str) -> bool {
            true
        }
    }

    fn pen_extension() -> ExtensionInfo {
        ExtensionInfo {
            id: "pen".to_string(),
            addon_opcodes: vec!["pen.down".to_string(), "pen.up".to_string()],
        }
    }

    #[test]
    fn test_register_and_list_targets() {
        let mut runner = ExtensionRunner::new(DenyAllSecurityManager);
        runner.register(pen_extension()).unwrap();
        let targets: Vec<&str> = runner.addon_targets().collect();
        assert_eq!(targets, vec!["pen.down", "pen.up"]);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut runner = ExtensionRunner::new(DenyAllSecurityManager);
        runner.register(pen_extension()).unwrap();
        let err = runner.register(pen_extension()).unwrap_err();
        assert_eq!(err, ExtensionError::DuplicateId("pen".to_string()));
        assert_eq!(runner.extensions().len(), 1);
    }

    #[test]
    fn test_data_and_blob_fetches_bypass_the_manager() {
        let runner = ExtensionRunner::new(DenyAllSecurityManager);
        assert!(runner.can_fetch("data:text/plain;base64,aGk="));
        assert!(runner.can_fetch("blob:https://example.com/uuid"));
        assert!(!runner.can_fetch("https://example.com/asset.png"));
    }

    #[test]
    fn test_javascript_navigation_is_always_rejected() {
        let runner = ExtensionRunner::new(AllowAll);
        assert!(!runner.can_open_window("javascript:alert(1)"));
        assert!(!runner.can_redirect("javascript:alert(1)"));
        assert!(runner.can_open_window("https://example.com"));
        assert!(runner.can_redirect("https://example.com"));
    }

    #[test]
    fn test_schemeless_urls_fall_through_to_the_manager() {
        let runner = ExtensionRunner::new(DenyAllSecurityManager);
        assert!(!runner.can_fetch("example.com/asset.png"));
    }
}
