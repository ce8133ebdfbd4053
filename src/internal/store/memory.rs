//! In-process object store with Git-compatible object ids.
//!
//! Blobs, trees and commits are serialized exactly like loose Git objects
//! (`<type> <len>\0<payload>`) and addressed by the SHA-1 of that encoding, so an
//! id computed here matches the one GitHub would return for the same blob.
//! Used by the test-suite and by `scribe put --dry-run`.
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::{
    BranchTip, FileMode, ObjectId, ObjectStore, PathContent, PutOutcome, StoreError, StoreResult,
    TreeEntry, path_segments,
};

const SIGNATURE: &str = "scribe <scribe@localhost>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    File(FileMode),
    Dir,
}

impl ItemKind {
    fn mode(&self) -> &'static str {
        match self {
            ItemKind::File(mode) => mode.as_str(),
            ItemKind::Dir => "40000",
        }
    }
}

#[derive(Debug, Clone)]
struct TreeItem {
    name: String,
    kind: ItemKind,
    id: ObjectId,
}

impl TreeItem {
    // Git orders directories as if their name ended with '/'.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.kind == ItemKind::Dir {
            key.push(b'/');
        }
        key
    }
}

/// Decoded commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub message: String,
}

#[derive(Debug, Clone)]
enum Object {
    Blob(Bytes),
    Tree(Vec<TreeItem>),
    Commit(CommitRecord),
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<ObjectId, Object>,
    branches: HashMap<String, ObjectId>,
}

fn hash_object(kind: &str, payload: &[u8]) -> StoreResult<ObjectId> {
    let mut hasher = Sha1::new();
    hasher.update(format!("{kind} {}\0", payload.len()).as_bytes());
    hasher.update(payload);
    ObjectId::new(hex::encode(hasher.finalize()))
}

impl State {
    fn put_blob(&mut self, bytes: &[u8]) -> StoreResult<ObjectId> {
        let id = hash_object("blob", bytes)?;
        self.objects
            .entry(id.clone())
            .or_insert_with(|| Object::Blob(Bytes::copy_from_slice(bytes)));
        Ok(id)
    }

    fn put_tree(&mut self, mut items: Vec<TreeItem>) -> StoreResult<ObjectId> {
        items.sort_by_key(|item| item.sort_key());
        let mut data = Vec::new();
        for item in &items {
            data.extend_from_slice(item.kind.mode().as_bytes());
            data.push(b' ');
            data.extend_from_slice(item.name.as_bytes());
            data.push(0);
            let raw = hex::decode(item.id.as_str())
                .map_err(|e| StoreError::Malformed(format!("tree entry {}: {e}", item.name)))?;
            data.extend_from_slice(&raw);
        }
        let id = hash_object("tree", &data)?;
        self.objects.insert(id.clone(), Object::Tree(items));
        Ok(id)
    }

    fn put_commit(
        &mut self,
        tree: &ObjectId,
        parents: &[ObjectId],
        message: &str,
    ) -> StoreResult<ObjectId> {
        let timestamp = chrono::Utc::now().timestamp();
        let mut content = format!("tree {tree}\n");
        for parent in parents {
            content.push_str(&format!("parent {parent}\n"));
        }
        content.push_str(&format!("author {SIGNATURE} {timestamp} +0000\n"));
        content.push_str(&format!("committer {SIGNATURE} {timestamp} +0000\n"));
        content.push('\n');
        content.push_str(message);
        content.push('\n');

        let id = hash_object("commit", content.as_bytes())?;
        self.objects.insert(
            id.clone(),
            Object::Commit(CommitRecord {
                tree: tree.clone(),
                parents: parents.to_vec(),
                message: message.to_string(),
            }),
        );
        Ok(id)
    }

    fn tree_items(&self, id: &ObjectId) -> Option<&Vec<TreeItem>> {
        match self.objects.get(id) {
            Some(Object::Tree(items)) => Some(items),
            _ => None,
        }
    }

    fn commit(&self, id: &ObjectId) -> Option<&CommitRecord> {
        match self.objects.get(id) {
            Some(Object::Commit(commit)) => Some(commit),
            _ => None,
        }
    }

    fn tip(&self, branch: &str) -> StoreResult<BranchTip> {
        let commit = self
            .branches
            .get(branch)
            .ok_or_else(|| StoreError::NotFound(format!("branch '{branch}'")))?;
        let record = self
            .commit(commit)
            .ok_or_else(|| StoreError::Malformed(format!("branch '{branch}' points at {commit}")))?;
        Ok(BranchTip {
            commit: commit.clone(),
            tree: record.tree.clone(),
        })
    }

    fn lookup(&self, tree: &ObjectId, segments: &[&str]) -> Option<TreeItem> {
        let (first, rest) = segments.split_first()?;
        let item = self
            .tree_items(tree)?
            .iter()
            .find(|item| item.name == *first)?
            .clone();
        if rest.is_empty() {
            return Some(item);
        }
        match item.kind {
            ItemKind::Dir => self.lookup(&item.id, rest),
            ItemKind::File(_) => None,
        }
    }

    /// Writes `blob` at `segments` below `base`, rebuilding every tree on the way up.
    fn overlay(
        &mut self,
        base: Option<&ObjectId>,
        segments: &[&str],
        mode: FileMode,
        blob: &ObjectId,
    ) -> StoreResult<ObjectId> {
        let Some((name, rest)) = segments.split_first() else {
            return Err(StoreError::InvalidPath(String::new()));
        };
        let mut items = base
            .and_then(|id| self.tree_items(id))
            .cloned()
            .unwrap_or_default();
        let existing = items.iter().position(|item| item.name == *name);

        let item = if rest.is_empty() {
            TreeItem {
                name: name.to_string(),
                kind: ItemKind::File(mode),
                id: blob.clone(),
            }
        } else {
            let child_base = existing
                .map(|i| &items[i])
                .filter(|item| item.kind == ItemKind::Dir)
                .map(|item| item.id.clone());
            let child = self.overlay(child_base.as_ref(), rest, mode, blob)?;
            TreeItem {
                name: name.to_string(),
                kind: ItemKind::Dir,
                id: child,
            }
        };

        match existing {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
        self.put_tree(items)
    }

    fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> bool {
        let mut queue = VecDeque::from([descendant.clone()]);
        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if &id == ancestor {
                return true;
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(commit) = self.commit(&id) {
                queue.extend(commit.parents.iter().cloned());
            }
        }
        false
    }
}

/// Thread-safe in-memory store. Every [`ObjectStore`] call is counted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl MemoryStore {
    /// Empty store without any branch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `branch` pointing at a root commit over an empty tree.
    pub fn with_branch(branch: &str) -> StoreResult<Self> {
        let store = Self::new();
        store.init_branch(branch)?;
        Ok(store)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Creates `branch` with a single root commit and returns that commit.
    pub fn init_branch(&self, branch: &str) -> StoreResult<ObjectId> {
        let mut state = self.state();
        let tree = state.put_tree(Vec::new())?;
        let commit = state.put_commit(&tree, &[], "Initial commit")?;
        state.branches.insert(branch.to_string(), commit.clone());
        Ok(commit)
    }

    pub fn branch_tip(&self, branch: &str) -> Option<ObjectId> {
        self.state().branches.get(branch).cloned()
    }

    pub fn commit(&self, id: &ObjectId) -> Option<CommitRecord> {
        self.state().commit(id).cloned()
    }

    pub fn blob(&self, id: &ObjectId) -> Option<Bytes> {
        match self.state().objects.get(id) {
            Some(Object::Blob(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    pub fn has_tree(&self, id: &ObjectId) -> bool {
        self.state().tree_items(id).is_some()
    }

    /// Object id stored at `path` inside `tree`, if any.
    pub fn lookup_path(&self, tree: &ObjectId, path: &str) -> Option<ObjectId> {
        let segments = path_segments(path).ok()?;
        self.state().lookup(tree, &segments).map(|item| item.id)
    }

    /// Advances `branch` to `new_commit` only if the current tip is one of its ancestors.
    pub fn fast_forward(&self, branch: &str, new_commit: &ObjectId) -> StoreResult<()> {
        let mut state = self.state();
        let current = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("branch '{branch}'")))?;
        if state.commit(new_commit).is_none() {
            return Err(StoreError::NotFound(format!("commit {new_commit}")));
        }
        if !state.is_ancestor(&current, new_commit) {
            return Err(StoreError::Conflict("Update is not a fast forward".to_string()));
        }
        state.branches.insert(branch.to_string(), new_commit.clone());
        Ok(())
    }

    /// Number of [`ObjectStore`] calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn resolve_branch(&self, branch: &str) -> StoreResult<BranchTip> {
        self.record_call();
        self.state().tip(branch)
    }

    async fn create_blob(&self, bytes: &[u8]) -> StoreResult<ObjectId> {
        self.record_call();
        self.state().put_blob(bytes)
    }

    async fn create_tree(
        &self,
        base_tree: &ObjectId,
        entries: &[TreeEntry],
    ) -> StoreResult<ObjectId> {
        self.record_call();
        let mut state = self.state();
        if state.tree_items(base_tree).is_none() {
            return Err(StoreError::InvalidBase(base_tree.to_string()));
        }
        let mut tree = base_tree.clone();
        for entry in entries {
            if !matches!(state.objects.get(&entry.blob), Some(Object::Blob(_))) {
                return Err(StoreError::NotFound(format!("blob {}", entry.blob)));
            }
            let segments = path_segments(&entry.path)?;
            tree = state.overlay(Some(&tree), &segments, entry.mode, &entry.blob)?;
        }
        Ok(tree)
    }

    async fn create_commit(
        &self,
        tree: &ObjectId,
        parents: &[ObjectId],
        message: &str,
    ) -> StoreResult<ObjectId> {
        self.record_call();
        let mut state = self.state();
        if state.tree_items(tree).is_none() {
            return Err(StoreError::NotFound(format!("tree {tree}")));
        }
        if let Some(missing) = parents.iter().find(|p| state.commit(p).is_none()) {
            return Err(StoreError::NotFound(format!("parent commit {missing}")));
        }
        state.put_commit(tree, parents, message)
    }

    async fn update_branch(
        &self,
        branch: &str,
        new_commit: &ObjectId,
        expected_previous: &ObjectId,
        force: bool,
    ) -> StoreResult<()> {
        self.record_call();
        let mut state = self.state();
        let current = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("branch '{branch}'")))?;
        if state.commit(new_commit).is_none() {
            return Err(StoreError::NotFound(format!("commit {new_commit}")));
        }
        if !force && current != *expected_previous {
            return Err(StoreError::Conflict(format!(
                "branch '{branch}' moved: expected {expected_previous}, found {current}"
            )));
        }
        state.branches.insert(branch.to_string(), new_commit.clone());
        Ok(())
    }

    async fn get_path_content(&self, branch: &str, path: &str) -> StoreResult<PathContent> {
        self.record_call();
        let segments = path_segments(path)?;
        let state = self.state();
        let tip = state.tip(branch)?;
        let item = state
            .lookup(&tip.tree, &segments)
            .ok_or_else(|| StoreError::NotFound(format!("'{path}' on branch '{branch}'")))?;
        match (&item.kind, state.objects.get(&item.id)) {
            (ItemKind::File(_), Some(Object::Blob(bytes))) => Ok(PathContent {
                bytes: bytes.clone(),
                object_id: item.id.clone(),
                html_url: None,
                download_url: None,
            }),
            _ => Err(StoreError::NotAFile(path.to_string())),
        }
    }

    async fn put_path_content(
        &self,
        branch: &str,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected_object: Option<&ObjectId>,
    ) -> StoreResult<PutOutcome> {
        self.record_call();
        let segments = path_segments(path)?;
        let mut state = self.state();
        let tip = state.tip(branch)?;
        let current = state.lookup(&tip.tree, &segments);

        match (&current, expected_object) {
            (Some(item), _) if item.kind == ItemKind::Dir => {
                return Err(StoreError::NotAFile(path.to_string()));
            }
            (Some(item), Some(expected)) if item.id != *expected => {
                return Err(StoreError::Conflict(format!(
                    "'{path}' is at {}, expected {expected}",
                    item.id
                )));
            }
            (Some(_), None) => {
                return Err(StoreError::Conflict(format!(
                    "'{path}' already exists and no object id was supplied"
                )));
            }
            (None, Some(expected)) => {
                return Err(StoreError::Conflict(format!(
                    "'{path}' does not exist, expected {expected}"
                )));
            }
            _ => {}
        }

        let blob = state.put_blob(bytes)?;
        let tree = state.overlay(Some(&tip.tree), &segments, FileMode::Regular, &blob)?;
        let commit = state.put_commit(&tree, std::slice::from_ref(&tip.commit), message)?;
        state.branches.insert(branch.to_string(), commit.clone());

        Ok(PutOutcome {
            object_id: blob,
            commit: Some(commit),
            html_url: None,
            download_url: None,
            created: current.is_none(),
        })
    }
}
