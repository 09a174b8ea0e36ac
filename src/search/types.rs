/// Wire types for Search Service program data
use serde::{Deserialize, Serialize};

/// One page of the paginated program search response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    /// URL of the next page, or null on the last page.
    pub next: Option<String>,
    /// Programs on this page.
    pub results: Vec<RemoteProgram>,
    /// Total result count; only read from the first page.
    pub count: Option<u64>,
}

/// A degree program as returned by the Search Service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProgram {
    /// Remote numeric identifier, used to resolve parent references.
    pub id: u64,
    pub name: String,
    pub plan_code: String,
    /// Null/empty for top-level plans.
    #[serde(default)]
    pub subplan_code: Option<String>,
    #[serde(default)]
    pub career: Career,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub colleges: Vec<OrgUnit>,
    #[serde(default)]
    pub departments: Vec<OrgUnit>,
    /// Null for plans; a reference to the parent plan for subplans.
    #[serde(default)]
    pub parent_program: Option<ParentRef>,
    /// Catalog descriptions attached upstream; consulted by writebacks.
    #[serde(default)]
    pub descriptions: Vec<DescriptionEntry>,
    /// Site profiles attached upstream; consulted by writebacks.
    #[serde(default)]
    pub profiles: Vec<ProfileEntry>,
}

impl RemoteProgram {
    /// Composite business key matching this program to a local record.
    pub fn degree_id(&self) -> String {
        format!("{} {}", self.plan_code, self.subplan_code())
    }

    /// Subplan code with null normalized to the empty string.
    pub fn subplan_code(&self) -> &str {
        self.subplan_code.as_deref().unwrap_or("")
    }

    /// True when this program is a subplan of another program.
    pub fn is_subplan(&self) -> bool {
        self.parent_program.is_some()
    }
}

/// Academic career of a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Career {
    Undergraduate,
    Graduate,
    Professional,
    /// Any career value this crate has no mapping for.
    #[default]
    Other,
}

impl From<String> for Career {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Undergraduate" => Career::Undergraduate,
            "Graduate" => Career::Graduate,
            "Professional" => Career::Professional,
            _ => Career::Other,
        }
    }
}

/// Academic level of a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Level {
    Bachelors,
    Masters,
    Certificate,
    Doctoral,
    Specialist,
    Minor,
    /// Any level value this crate has no mapping for.
    #[default]
    Other,
}

impl From<String> for Level {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Bachelors" => Level::Bachelors,
            "Masters" => Level::Masters,
            "Certificate" => Level::Certificate,
            "Doctoral" => Level::Doctoral,
            "Specialist" => Level::Specialist,
            "Minor" => Level::Minor,
            _ => Level::Other,
        }
    }
}

/// A college or department reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUnit {
    pub full_name: String,
}

/// Reference to a subplan's parent program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentRef {
    /// Remote id, when the service inlines it.
    #[serde(default)]
    pub id: Option<u64>,
    /// Dereferenceable URL of the parent program.
    pub url: String,
}

/// A typed reference shared by description and profile entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryType {
    pub id: u64,
}

/// A catalog description attached to a program upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionEntry {
    pub description_type: EntryType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub update_url: String,
}

/// A site profile attached to a program upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub profile_type: EntryType,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub update_url: String,
}
