use crate::parse::truncate_to_char_boundary;

/// Which pipeline step a request serves. Sent to the provider as a routing
/// hint and used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    TopicDiscovery,
    SeriesPlan,
    DeepResearch,
    SearchHunt,
    SourceVetting,
    Blueprint,
    Body,
    Visualization,
    Audit,
    Remedy,
    DuplicateJudge,
    Repair,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::TopicDiscovery => "topic_discovery",
            Capability::SeriesPlan => "series_plan",
            Capability::DeepResearch => "deep_research",
            Capability::SearchHunt => "search_hunt",
            Capability::SourceVetting => "source_vetting",
            Capability::Blueprint => "blueprint",
            Capability::Body => "body",
            Capability::Visualization => "visualization",
            Capability::Audit => "audit",
            Capability::Remedy => "remedy",
            Capability::DuplicateJudge => "duplicate_judge",
            Capability::Repair => "repair",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generative/search request: a capability, a prompt payload, an optional
/// system instruction, and whether the provider must consult external search.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub capability: Capability,
    pub prompt: String,
    pub system: Option<String>,
    pub use_search: bool,
}

const REPAIR_PAYLOAD_MAX_BYTES: usize = 20_000;

impl RequestSpec {
    pub fn new(capability: Capability, prompt: impl Into<String>) -> Self {
        Self {
            capability,
            prompt: prompt.into(),
            system: None,
            use_search: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_search(mut self) -> Self {
        self.use_search = true;
        self
    }

    /// Secondary request asking a model to fix an unparseable payload.
    pub fn repair(broken: &str) -> Self {
        let broken = truncate_to_char_boundary(broken, REPAIR_PAYLOAD_MAX_BYTES);
        Self::new(
            Capability::Repair,
            format!(
                "The following text was supposed to be a single valid JSON object but is \
                 malformed. Return only the corrected JSON object, with no commentary and \
                 no code fences.\n\n{broken}"
            ),
        )
    }
}
