// roots.rs — The mediator-managed roots set.
//
// Downstream servers may ask (via `roots/list`) which filesystem roots
// they are permitted to serve. The answer is this shared set: the session
// sandbox plus every directory named by the compiled policy, plus any
// directories added at runtime after approved escalations.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use rmcp::model::{
    ClientCapabilities, ClientInfo, Implementation, ListRootsResult, ProtocolVersion, Root,
    RootsCapabilities,
};
use rmcp::service::{RequestContext, RoleClient};
use rmcp::{ClientHandler, ErrorData};

/// A shared, mutable set of permitted root directories.
#[derive(Debug, Clone, Default)]
pub struct RootSet {
    inner: Arc<RwLock<BTreeSet<PathBuf>>>,
}

impl RootSet {
    pub fn new(initial: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.into_iter().collect())),
        }
    }

    /// Insert a directory. Returns true if it was newly added.
    pub fn add(&self, dir: PathBuf) -> bool {
        self.inner.write().expect("root set lock").insert(dir)
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.inner.read().expect("root set lock").contains(dir)
    }

    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.inner.read().expect("root set lock").iter().cloned().collect()
    }

    /// The wire form served to downstream servers.
    pub fn to_roots(&self) -> Vec<Root> {
        self.snapshot()
            .into_iter()
            .map(|dir| Root {
                uri: format!("file://{}", dir.display()),
                name: Some(dir.display().to_string()),
            })
            .collect()
    }
}

/// The client handler every downstream connection runs with: it answers
/// `roots/list` from the shared set and advertises list-changed support.
#[derive(Debug, Clone)]
pub struct RootsHandler {
    roots: RootSet,
}

impl RootsHandler {
    pub fn new(roots: RootSet) -> Self {
        Self { roots }
    }
}

impl ClientHandler for RootsHandler {
    async fn list_roots(
        &self,
        _context: RequestContext<RoleClient>,
    ) -> Result<ListRootsResult, ErrorData> {
        Ok(ListRootsResult {
            roots: self.roots.to_roots(),
        })
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            meta: None,
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ClientCapabilities {
                roots: Some(RootsCapabilities {
                    list_changed: Some(true),
                }),
                ..ClientCapabilities::default()
            },
            client_info: Implementation {
                name: "ironcurtain-mediator".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("IronCurtain".into()),
                description: None,
                icons: None,
                website_url: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_reports_newness() {
        let roots = RootSet::new([PathBuf::from("/sandbox")]);
        assert!(!roots.add(PathBuf::from("/sandbox")));
        assert!(roots.add(PathBuf::from("/etc")));
        assert!(roots.contains(Path::new("/etc")));
    }

    #[test]
    fn wire_roots_use_file_uris() {
        let roots = RootSet::new([PathBuf::from("/sandbox")]);
        let wire = roots.to_roots();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].uri, "file:///sandbox");
    }

    #[test]
    fn snapshot_is_sorted_and_deduplicated() {
        let roots = RootSet::new([
            PathBuf::from("/b"),
            PathBuf::from("/a"),
            PathBuf::from("/a"),
        ]);
        assert_eq!(
            roots.snapshot(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }
}
