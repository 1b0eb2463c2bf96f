//! File-backed node store
//!
//! Directory layout:
//! ```text
//! files/
//! ├── <node-id>.md
//! └── ...
//! ```
//!
//! There is no per-node locking. Concurrent writes to one node race and the
//! last rename wins, but a reader never observes a partially written file.

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::node::codec::{self, Node, NodeBody};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const TEMP_SUFFIX: &str = "part";

/// Ids taken by the fixed `/graph/<name>` action routes
const RESERVED_IDS: &[&str] = &["renameNode", "tagNode", "removeTag"];

/// Reads and writes nodes as one file per node
#[derive(Debug, Clone)]
pub struct NodeStore {
    dir: PathBuf,
    extension: String,
}

impl NodeStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_extension(dir, "md").await
    }

    /// Open a store using the configured directory and extension
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::with_extension(config.nodes_dir.clone(), &config.extension).await
    }

    async fn with_extension(dir: impl Into<PathBuf>, extension: &str) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
        })
    }

    /// Directory holding the node files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.{}", id, self.extension)))
    }

    /// Whether a node exists
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Load a node
    pub async fn read(&self, id: &str) -> Result<Node> {
        let path = self.path_for(id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::node_not_found(id)),
            Err(e) => return Err(e.into()),
        };

        let NodeBody { tags, content } = codec::decode(&raw);
        Ok(Node::new(id, tags, content))
    }

    /// Store tags and content for a node, replacing whatever was there.
    ///
    /// Empty `tags` writes the content verbatim with no header.
    pub async fn write(&self, id: &str, tags: &[String], content: &str) -> Result<()> {
        let path = self.path_for(id)?;
        let text = codec::encode(tags, content)?;
        write_atomic(&path, text.as_bytes()).await?;
        tracing::debug!(node = %id, tags = tags.len(), bytes = text.len(), "Wrote node");
        Ok(())
    }

    /// Move a node to a new id. An existing node at `new_id` is overwritten.
    pub async fn rename(&self, old_id: &str, new_id: &str) -> Result<()> {
        let old_path = self.path_for(old_id)?;
        let new_path = self.path_for(new_id)?;

        match tokio::fs::rename(&old_path, &new_path).await {
            Ok(()) => {
                tracing::info!(from = %old_id, to = %new_id, "Renamed node");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::node_not_found(old_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a node
    pub async fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(node = %id, "Deleted node");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::node_not_found(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// All stored node ids, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::debug!(path = %path.display(), "Skipping non UTF-8 node file name");
                continue;
            };
            if validate_id(stem).is_ok() {
                ids.push(stem.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    // =========================================================================
    // Tag-preserving updates
    // =========================================================================

    /// Replace a node's content, keeping its tags. Creates the node if absent.
    pub async fn save_content(&self, id: &str, content: &str) -> Result<()> {
        let tags = match self.read(id).await {
            Ok(node) => node.tags,
            Err(Error::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        self.write(id, &tags, content).await
    }

    /// Add tags to a node (union with existing tags, existing order first)
    pub async fn add_tags(&self, id: &str, new_tags: &[String]) -> Result<Vec<String>> {
        let node = self.read(id).await?;
        let mut tags = node.tags;
        for tag in new_tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        self.write(id, &tags, &node.content).await?;
        Ok(tags)
    }

    /// Remove one tag from a node, keeping its content
    pub async fn remove_tag(&self, id: &str, tag: &str) -> Result<Vec<String>> {
        let node = self.read(id).await?;
        let tags: Vec<String> = node.tags.into_iter().filter(|t| t != tag).collect();
        self.write(id, &tags, &node.content).await?;
        Ok(tags)
    }
}

/// Check that an id is usable as a file stem inside the store directory
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidNodeId("node id must not be empty".to_string()));
    }
    if id.starts_with('.') {
        return Err(Error::InvalidNodeId(format!(
            "node id '{}' must not start with '.'",
            id
        )));
    }
    if id.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidNodeId(format!(
            "node id '{}' must not contain path separators",
            id.escape_debug()
        )));
    }
    if RESERVED_IDS.contains(&id) {
        return Err(Error::InvalidNodeId(format!("node id '{}' is reserved", id)));
    }
    Ok(())
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!(".{}.{}", uuid::Uuid::new_v4().simple(), TEMP_SUFFIX));
    let tmp_path = PathBuf::from(tmp_name);

    if let Err(e) = tokio::fs::write(&tmp_path, data).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
