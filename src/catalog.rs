//! Agent catalog
//!
//! Maps agent identifiers to their fixed instruction profiles. The catalog is
//! built once at startup (built-in profiles plus any configured extras) and is
//! never mutated afterwards, so it is shared between concurrent runs behind an
//! `Arc` without locking.

use crate::config::{AgentEntry, AppConfig};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

const RESEARCH_INSTRUCTIONS: &str = "You are a Research Agent. Your task is to analyze the input and provide relevant information, background context, and key points about the topic.
Focus on:
- Key facts and data
- Background information
- Related concepts
- Sources (if available)

Be thorough but concise. Format your response clearly.";

const SUMMARY_INSTRUCTIONS: &str = "You are a Summary Agent. Your task is to take the input text and create a clear, concise summary.
Focus on:
- Main points
- Key takeaways
- Essential information

Keep the summary to 2-3 paragraphs maximum.";

const FACTCHECK_INSTRUCTIONS: &str = "You are a FactCheck Agent. Your task is to analyze the input and identify:
- Claims that can be verified
- Potential inaccuracies
- Missing context
- Confidence level for each claim

Format as a structured analysis with each claim and its verification status.";

const WRITER_INSTRUCTIONS: &str = "You are a Writer Agent. Your task is to take the input and transform it into well-written content.
Focus on:
- Clear and engaging prose
- Logical structure
- Appropriate tone
- Readability

Produce polished, professional content.";

const DEFAULT_ICON: &str = "🤖";

/// One catalog entry: an agent's identity and its behavioral directive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    #[serde(skip_serializing)]
    pub instructions: String,
}

impl AgentProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        icon: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
            instructions: instructions.into(),
        }
    }

    /// Build a profile from a configuration entry
    pub fn from_entry(id: &str, entry: &AgentEntry) -> Self {
        Self {
            id: id.to_string(),
            name: entry.name.clone().unwrap_or_else(|| id.to_string()),
            description: entry.description.clone(),
            icon: entry
                .icon
                .clone()
                .unwrap_or_else(|| DEFAULT_ICON.to_string()),
            instructions: entry.instructions.clone(),
        }
    }
}

/// Built-in profiles shipped with every deployment
fn builtin_profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new(
            "research",
            "Research Agent",
            "Gathers background information and key facts",
            "🔍",
            RESEARCH_INSTRUCTIONS,
        ),
        AgentProfile::new(
            "summary",
            "Summary Agent",
            "Condenses text into its main points",
            "📝",
            SUMMARY_INSTRUCTIONS,
        ),
        AgentProfile::new(
            "factcheck",
            "FactCheck Agent",
            "Lists verifiable claims with a confidence judgment",
            "✓",
            FACTCHECK_INSTRUCTIONS,
        ),
        AgentProfile::new(
            "writer",
            "Writer Agent",
            "Rewrites input into polished prose",
            "✍️",
            WRITER_INSTRUCTIONS,
        ),
    ]
}

static BUILTIN_CATALOG: Lazy<AgentCatalog> = Lazy::new(|| AgentCatalog::new(builtin_profiles()));

/// Immutable agent id → profile mapping preserving insertion order
#[derive(Debug, Clone)]
pub struct AgentCatalog {
    profiles: Vec<AgentProfile>,
    index: HashMap<String, usize>,
}

impl AgentCatalog {
    /// Build a catalog; a later profile with a repeated id replaces the earlier one in place
    pub fn new(profiles: impl IntoIterator<Item = AgentProfile>) -> Self {
        let mut catalog = Self {
            profiles: Vec::new(),
            index: HashMap::new(),
        };
        for profile in profiles {
            match catalog.index.get(&profile.id) {
                Some(&slot) => catalog.profiles[slot] = profile,
                None => {
                    catalog
                        .index
                        .insert(profile.id.clone(), catalog.profiles.len());
                    catalog.profiles.push(profile);
                }
            }
        }
        catalog
    }

    /// The process-wide built-in catalog
    pub fn builtin() -> &'static AgentCatalog {
        &BUILTIN_CATALOG
    }

    /// Built-in profiles extended with the `[agents.*]` configuration entries
    pub fn from_config(config: &AppConfig) -> Self {
        let extras = config.agents.iter().map(|(id, entry)| {
            if BUILTIN_CATALOG.contains(id) {
                info!(agent_id = %id, "Configured agent overrides built-in profile");
            }
            AgentProfile::from_entry(id, entry)
        });
        Self::new(builtin_profiles().into_iter().chain(extras))
    }

    pub fn lookup(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.index.get(agent_id).map(|&slot| &self.profiles[slot])
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.index.contains_key(agent_id)
    }

    /// Profiles in catalog order
    pub fn profiles(&self) -> &[AgentProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_has_four_agents_in_order() {
        let ids: Vec<&str> = AgentCatalog::builtin()
            .profiles()
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["research", "summary", "factcheck", "writer"]);
    }

    #[test]
    fn test_builtin_instructions() {
        let catalog = AgentCatalog::builtin();
        let summary = catalog.lookup("summary").unwrap();
        assert!(summary.instructions.contains("2-3 paragraphs"));
        let factcheck = catalog.lookup("factcheck").unwrap();
        assert!(factcheck.instructions.contains("Confidence level"));
        assert!(catalog.lookup("nonexistent").is_none());
    }

    #[test]
    fn test_repeated_id_replaces_in_place() {
        let catalog = AgentCatalog::new(vec![
            AgentProfile::new("a", "A", "", "", "first"),
            AgentProfile::new("b", "B", "", "", "second"),
            AgentProfile::new("a", "A2", "", "", "third"),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.profiles()[0].instructions, "third");
        assert_eq!(catalog.lookup("a").unwrap().name, "A2");
    }

    #[test]
    fn test_from_config_adds_extra_agent() {
        let config = AppConfig::from_toml_str(
            r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"

[agents.translator]
instructions = "Translate the input into English."
"#,
        )
        .unwrap();

        let catalog = AgentCatalog::from_config(&config);
        assert_eq!(catalog.len(), 5);
        let translator = catalog.lookup("translator").unwrap();
        assert_eq!(translator.name, "translator");
        assert_eq!(translator.icon, DEFAULT_ICON);
        assert_eq!(catalog.profiles()[4].id, "translator");
    }

    #[test]
    fn test_profile_serialization_omits_instructions() {
        let json = serde_json::to_value(AgentCatalog::builtin().lookup("writer").unwrap()).unwrap();
        assert_eq!(json["id"], "writer");
        assert_eq!(json["name"], "Writer Agent");
        assert!(json.get("instructions").is_none());
    }
}
