//! Throwaway workspace builder
//!
//! Creates a real directory tree (optionally a real git repository) and
//! wires up the store, bootstrapper, and retriever against it.

use std::path::Path;
use std::sync::Arc;

use git2::{Repository, Signature};
use librarian_core::{
    Bootstrapper, CancelToken, EmbeddingService, EventBus, KnowledgeStore, LibrarianConfig,
    LlmService, Retriever,
};

/// A temp-dir workspace with helpers for files, git, and the core stack
pub struct TestWorkspace {
    dir: tempfile::TempDir,
    store: Option<Arc<KnowledgeStore>>,
}

impl TestWorkspace {
    /// Fresh empty workspace
    pub fn new() -> Self {
        super::init_tracing();
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            store: None,
        }
    }

    /// Workspace root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a workspace-relative file, creating parents
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write");
    }

    /// Remove a workspace-relative file
    pub fn remove_file(&self, relative: &str) {
        std::fs::remove_file(self.dir.path().join(relative)).expect("remove");
    }

    /// Initialise a git repository at the root
    pub fn git_init(&self) -> Repository {
        Repository::init(self.dir.path()).expect("git init")
    }

    /// Stage everything and commit; works with or without a parent commit
    pub fn git_commit_all(&self, message: &str) -> git2::Oid {
        let repo = Repository::open(self.dir.path()).expect("git open");
        let mut index = repo.index().expect("index");
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .expect("add");
        index.write().expect("index write");
        let tree_id = index.write_tree().expect("write tree");
        let tree = repo.find_tree(tree_id).expect("tree");
        let signature = Signature::now("Test Author", "author@example.com").expect("sig");

        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| repo.find_commit(oid).ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .expect("commit")
    }

    /// Config rooted at this workspace
    pub fn config(&self) -> LibrarianConfig {
        LibrarianConfig::for_workspace(self.dir.path())
    }

    /// The (shared) store, opened at the workspace's `.librarian` path
    pub fn store(&mut self) -> Arc<KnowledgeStore> {
        if self.store.is_none() {
            let store = KnowledgeStore::open(self.config().db_path()).expect("store open");
            self.store = Some(Arc::new(store));
        }
        Arc::clone(self.store.as_ref().expect("store"))
    }

    /// Bootstrap the workspace with optional providers
    pub async fn bootstrap(
        &mut self,
        embedder: Option<Arc<dyn EmbeddingService>>,
        llm: Option<Arc<dyn LlmService>>,
    ) -> librarian_core::BootstrapReport {
        let store = self.store();
        let bootstrapper = Bootstrapper::new(
            self.config(),
            store,
            embedder,
            llm,
            EventBus::default(),
        );
        bootstrapper
            .run(CancelToken::new())
            .await
            .expect("bootstrap run")
    }

    /// Retriever over this workspace's store
    pub fn retriever(&mut self, embedder: Option<Arc<dyn EmbeddingService>>) -> Retriever {
        let genotype = self.config().retrieval.clone();
        Retriever::new(self.store(), embedder, genotype)
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
