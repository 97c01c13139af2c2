use crate::roster::TeamRoster;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Catalog entry for a single tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name as referenced by workers.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Capability tags provided by the tool. Defaults to the tool name.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Extra task keywords that signal the tool's capabilities.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ToolSpec {
    /// A tool whose only capability tag is its own name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            capabilities: vec![name.clone()],
            name,
            description: String::new(),
            keywords: Vec::new(),
        }
    }

    /// Replace the capability tags.
    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    /// Add task keywords.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Keywords for capability tags that show up in most deployments.
const BUILTIN_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "web_search",
        &[
            "search", "research", "look up", "lookup", "find", "latest", "news", "browse",
            "sources", "internet", "online", "current",
        ],
    ),
    (
        "code_execution",
        &[
            "calculate", "compute", "run", "execute", "code", "script", "evaluate", "plot",
            "simulate", "program", "python", "math", "sum",
        ],
    ),
    (
        "file_access",
        &["file", "read", "document", "pdf", "csv", "open", "load"],
    ),
];

/// Static catalog mapping worker → tools → capability tags.
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSpec>,
    worker_tools: BTreeMap<String, Vec<String>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry by introspecting a roster.
    ///
    /// Tools referenced by a worker but missing from `specs` get a default
    /// spec whose capability is the tool name itself.
    pub fn from_roster(roster: &TeamRoster, specs: Vec<ToolSpec>) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register_tool(spec);
        }
        for worker in roster.workers() {
            registry.assign(&worker.name, worker.tools.clone());
        }
        registry
    }

    /// Register or replace a tool.
    pub fn register_tool(&mut self, mut spec: ToolSpec) {
        if spec.capabilities.is_empty() {
            spec.capabilities.push(spec.name.clone());
        }
        self.tools.insert(spec.name.clone(), spec);
    }

    /// Record the tools a worker has, registering unknown tools with defaults.
    pub fn assign(&mut self, worker: &str, tools: Vec<String>) {
        for tool in &tools {
            if !self.tools.contains_key(tool) {
                self.register_tool(ToolSpec::named(tool.clone()));
            }
        }
        self.worker_tools.insert(worker.to_string(), tools);
    }

    /// Look up a tool.
    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Tool names of a worker; empty for unknown workers.
    pub fn tools_of(&self, worker: &str) -> &[String] {
        self.worker_tools
            .get(worker)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the worker has the named tool.
    pub fn worker_has_tool(&self, worker: &str, tool: &str) -> bool {
        self.tools_of(worker).iter().any(|t| t == tool)
    }

    /// Capability tags a worker provides through its tools.
    pub fn worker_capabilities(&self, worker: &str) -> BTreeSet<String> {
        self.tools_of(worker)
            .iter()
            .filter_map(|t| self.tools.get(t))
            .flat_map(|spec| spec.capabilities.iter().cloned())
            .collect()
    }

    /// Tools providing a capability.
    pub fn tools_for_capability(&self, capability: &str) -> Vec<&str> {
        let mut tools: Vec<&str> = self
            .tools
            .values()
            .filter(|spec| spec.capabilities.iter().any(|c| c == capability))
            .map(|spec| spec.name.as_str())
            .collect();
        tools.sort_unstable();
        tools
    }

    /// Workers that provide a capability, in name order.
    pub fn workers_with_capability(&self, capability: &str) -> Vec<&str> {
        self.worker_tools
            .keys()
            .filter(|w| self.worker_capabilities(w).contains(capability))
            .map(String::as_str)
            .collect()
    }

    /// Every capability tag in the catalog.
    pub fn vocabulary(&self) -> BTreeSet<String> {
        self.tools
            .values()
            .flat_map(|spec| spec.capabilities.iter().cloned())
            .collect()
    }

    /// Task keywords that signal a capability: built-in ones plus the
    /// keywords of every tool providing it.
    pub fn keywords_for(&self, capability: &str) -> Vec<String> {
        let mut keywords: Vec<String> = BUILTIN_KEYWORDS
            .iter()
            .find(|(cap, _)| *cap == capability)
            .map(|(_, kws)| kws.iter().map(|k| (*k).to_string()).collect())
            .unwrap_or_default();
        for spec in self.tools.values() {
            if spec.capabilities.iter().any(|c| c == capability) {
                keywords.extend(spec.keywords.iter().map(|k| k.to_lowercase()));
            }
        }
        keywords.push(capability.replace('_', " "));
        keywords.sort();
        keywords.dedup();
        keywords
    }

    /// Map a free-form capability string onto the catalog vocabulary.
    ///
    /// Accepts exact tags, tool names, space/dash variants and keywords.
    pub fn canonical_capability(&self, raw: &str) -> Option<String> {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        if normalized.is_empty() {
            return None;
        }
        let vocabulary = self.vocabulary();
        if vocabulary.contains(&normalized) {
            return Some(normalized);
        }
        if let Some(spec) = self.tools.get(&normalized) {
            return spec.capabilities.first().cloned();
        }
        let spaced = normalized.replace('_', " ");
        vocabulary.into_iter().find(|cap| {
            self.keywords_for(cap)
                .iter()
                .any(|kw| kw == &spaced || spaced.contains(kw.as_str()))
        })
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Human-readable catalog description used in prompts and training data.
    pub fn describe(&self) -> String {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|n| self.tools.get(n))
            .map(|spec| {
                let holders: Vec<&str> = self
                    .worker_tools
                    .iter()
                    .filter(|(_, tools)| tools.contains(&spec.name))
                    .map(|(w, _)| w.as_str())
                    .collect();
                format!(
                    "- {} [{}] used by: {}",
                    spec.name,
                    spec.capabilities.join(", "),
                    if holders.is_empty() {
                        "nobody".to_string()
                    } else {
                        holders.join(", ")
                    }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::WorkerProfile;

    fn registry() -> ToolRegistry {
        let roster = TeamRoster::new(vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
            WorkerProfile::new("Analyst", "").with_tools(["python"]),
            WorkerProfile::new("Writer", ""),
        ]);
        ToolRegistry::from_roster(
            &roster,
            vec![ToolSpec::named("python")
                .with_capabilities(["code_execution"])
                .with_keywords(["notebook"])],
        )
    }

    #[test]
    fn test_from_roster_defaults_unknown_tools() {
        let registry = registry();
        assert_eq!(registry.tool_count(), 2);
        assert_eq!(
            registry.tool("web_search").unwrap().capabilities,
            vec!["web_search".to_string()]
        );
        assert!(registry.tools_of("Writer").is_empty());
        assert!(registry.tools_of("Nobody").is_empty());
    }

    #[test]
    fn test_worker_capabilities() {
        let registry = registry();
        assert!(registry
            .worker_capabilities("Analyst")
            .contains("code_execution"));
        assert_eq!(
            registry.workers_with_capability("code_execution"),
            vec!["Analyst"]
        );
        assert_eq!(registry.tools_for_capability("code_execution"), vec!["python"]);
        assert!(registry.worker_has_tool("Researcher", "web_search"));
    }

    #[test]
    fn test_keywords_merge_builtin_and_configured() {
        let registry = registry();
        let keywords = registry.keywords_for("code_execution");
        assert!(keywords.contains(&"calculate".to_string()));
        assert!(keywords.contains(&"notebook".to_string()));
        assert!(keywords.contains(&"code execution".to_string()));
    }

    #[test]
    fn test_canonical_capability() {
        let registry = registry();
        assert_eq!(
            registry.canonical_capability("Web Search").as_deref(),
            Some("web_search")
        );
        assert_eq!(
            registry.canonical_capability("python").as_deref(),
            Some("code_execution")
        );
        assert_eq!(
            registry.canonical_capability("research").as_deref(),
            Some("web_search")
        );
        assert_eq!(registry.canonical_capability("juggling"), None);
        assert_eq!(registry.canonical_capability("  "), None);
    }

    #[test]
    fn test_describe_lists_holders() {
        let text = registry().describe();
        assert!(text.contains("- python [code_execution] used by: Analyst"));
        assert!(text.contains("- web_search [web_search] used by: Researcher"));
    }
}
