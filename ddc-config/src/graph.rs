//! Declarative description of a backend graph (§6), as handed to the
//! builder by whatever parses the outer configuration format. The core
//! never reads a config file itself — it only ever sees this tree.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

fn default_unused_file_age() -> u32 {
    17
}

/// One node in a backend graph description. Parsed from an external
/// configuration source and handed to [`crate::builder::build`] as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendGraph {
    FileSystem {
        path: String,
        #[serde(default)]
        env_path_override: Option<String>,
        #[serde(default)]
        editor_override_setting: Option<String>,
        #[serde(default)]
        read_only: bool,
        #[serde(default)]
        clean: bool,
        #[serde(default)]
        flush: bool,
        #[serde(default)]
        touch: bool,
        #[serde(default)]
        purge_transient: bool,
        #[serde(default)]
        delete_unused: bool,
        #[serde(default = "default_unused_file_age")]
        unused_file_age: u32,
        #[serde(default)]
        folders_to_clean: Option<usize>,
        #[serde(default)]
        max_file_checks_per_sec: Option<u32>,
    },
    Boot {
        filename: String,
        #[serde(default)]
        max_cache_size: Option<u64>,
    },
    Memory {
        #[serde(default)]
        filename: Option<String>,
    },
    Hierarchical {
        inner: Vec<BackendGraph>,
    },
    KeyLength {
        inner: Box<BackendGraph>,
        length: usize,
    },
    AsyncPut {
        inner: Box<BackendGraph>,
    },
    Verify {
        inner: Box<BackendGraph>,
        #[serde(default)]
        fix: bool,
    },
    ReadPak {
        filename: String,
        #[serde(default)]
        compressed: bool,
    },
    WritePak {
        filename: String,
        #[serde(default)]
        compressed: bool,
    },
}

impl BackendGraph {
    /// Parse a graph description from its JSON serialization. The core
    /// does not own a config-file format; this exists for tests and for
    /// the thin CLI that hands the parsed tree to the builder.
    pub fn from_json(data: &str) -> ConfigResult<BackendGraph> {
        serde_json::from_str(data).map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_nested_graph_description() {
        let json = r#"{
            "type": "Hierarchical",
            "inner": [
                { "type": "Memory" },
                { "type": "FileSystem", "path": "/tmp/ddc", "read_only": false }
            ]
        }"#;
        let graph = BackendGraph::from_json(json).unwrap();
        assert!(matches!(graph, BackendGraph::Hierarchical { inner } if inner.len() == 2));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(BackendGraph::from_json("{ not json").is_err());
    }
}
