use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

fn default_knowledge_base_url() -> String {
    "https://prod-1-data.ke.pinecone.io".to_string()
}

fn default_assistant_name() -> String {
    "rag-tool".to_string()
}

/// Knowledge assistant used by `question_and_answer`.
#[derive(Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_base_url")]
    pub base_url: String,
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_knowledge_base_url(),
            assistant_name: default_assistant_name(),
            api_key: String::new(),
        }
    }
}

impl fmt::Debug for KnowledgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeConfig")
            .field("base_url", &self.base_url)
            .field("assistant_name", &self.assistant_name)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Meeting locations and the calendar each one books into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Location name (as spoken to the caller) to calendar id.
    #[serde(default)]
    pub calendars: BTreeMap<String, String>,
}
