use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A specialist worker as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerProfile {
    /// Unique worker name.
    pub name: String,
    /// What the worker is good at.
    #[serde(default)]
    pub description: String,
    /// Tool names the worker can use.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl WorkerProfile {
    /// Create a worker profile.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: Vec::new(),
        }
    }

    /// Attach tool names.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the worker has the named tool.
    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

/// The team of workers a task can be routed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRoster {
    workers: Vec<WorkerProfile>,
}

impl TeamRoster {
    /// Build a roster. Later duplicates of a name replace earlier ones.
    pub fn new(workers: Vec<WorkerProfile>) -> Self {
        let mut roster = Self::default();
        for worker in workers {
            roster.insert(worker);
        }
        roster
    }

    /// Add or replace a worker.
    pub fn insert(&mut self, worker: WorkerProfile) {
        if let Some(existing) = self.workers.iter_mut().find(|w| w.name == worker.name) {
            *existing = worker;
        } else {
            self.workers.push(worker);
        }
    }

    /// Look up a worker by name.
    pub fn get(&self, name: &str) -> Option<&WorkerProfile> {
        self.workers.iter().find(|w| w.name == name)
    }

    /// Whether a worker with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Workers in declaration order.
    pub fn workers(&self) -> &[WorkerProfile] {
        &self.workers
    }

    /// Worker names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name.as_str()).collect()
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stable hash of worker names and tool sets.
    ///
    /// Independent of declaration order and of worker descriptions.
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self
            .workers
            .iter()
            .map(|w| {
                let mut tools = w.tools.clone();
                tools.sort();
                tools.dedup();
                format!("{}={}", w.name, tools.join(","))
            })
            .collect();
        parts.sort();

        let mut hasher = Sha256::new();
        for part in &parts {
            hasher.update(part.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Human-readable roster description used in prompts and training data.
    pub fn describe(&self) -> String {
        self.workers
            .iter()
            .map(|w| {
                let tools = if w.tools.is_empty() {
                    "no tools".to_string()
                } else {
                    w.tools.join(", ")
                };
                if w.description.is_empty() {
                    format!("- {} ({tools})", w.name)
                } else {
                    format!("- {}: {} ({tools})", w.name, w.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> TeamRoster {
        TeamRoster::new(vec![
            WorkerProfile::new("Researcher", "Finds information").with_tools(["web_search"]),
            WorkerProfile::new("Writer", "Writes reports"),
        ])
    }

    #[test]
    fn test_lookup() {
        let roster = roster();
        assert_eq!(roster.len(), 2);
        assert!(roster.contains("Writer"));
        assert!(!roster.contains("Coder"));
        assert!(roster.get("Researcher").unwrap().has_tool("web_search"));
        assert_eq!(roster.names(), vec!["Researcher", "Writer"]);
    }

    #[test]
    fn test_insert_replaces_duplicate() {
        let mut roster = roster();
        roster.insert(WorkerProfile::new("Writer", "Edits").with_tools(["spellcheck"]));
        assert_eq!(roster.len(), 2);
        assert!(roster.get("Writer").unwrap().has_tool("spellcheck"));
    }

    #[test]
    fn test_signature_ignores_order_and_description() {
        let a = roster();
        let b = TeamRoster::new(vec![
            WorkerProfile::new("Writer", "Something else"),
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
        ]);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature().len(), 64);
    }

    #[test]
    fn test_signature_changes_with_tools() {
        let a = roster();
        let b = TeamRoster::new(vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search", "code_execution"]),
            WorkerProfile::new("Writer", ""),
        ]);
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn test_describe() {
        let text = roster().describe();
        assert!(text.contains("- Researcher: Finds information (web_search)"));
        assert!(text.contains("- Writer: Writes reports (no tools)"));
    }
}
