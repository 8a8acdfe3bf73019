//! Typed data model: entity kinds, relationship kinds, enumerated domains
//! and per-kind attribute validation.
//!
//! Every write path funnels through [`EntityBody::validate`], so a value that
//! reaches the database has already passed the enum, range and length checks.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PraxisError, Result};

/// Entity types stored in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Methodology,
    Practice,
    Rule,
    Context,
    Evidence,
    RadarTechnique,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Methodology => "Methodology",
            EntityKind::Practice => "Practice",
            EntityKind::Rule => "Rule",
            EntityKind::Context => "Context",
            EntityKind::Evidence => "Evidence",
            EntityKind::RadarTechnique => "RadarTechnique",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Methodology" => Some(EntityKind::Methodology),
            "Practice" => Some(EntityKind::Practice),
            "Rule" => Some(EntityKind::Rule),
            "Context" => Some(EntityKind::Context),
            "Evidence" => Some(EntityKind::Evidence),
            "RadarTechnique" => Some(EntityKind::RadarTechnique),
            _ => None,
        }
    }

    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Methodology,
            EntityKind::Practice,
            EntityKind::Rule,
            EntityKind::Context,
            EntityKind::Evidence,
            EntityKind::RadarTechnique,
        ]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types. Each carries its endpoint constraints; RELATED_TO
/// accepts any pair of entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelKind {
    HasPractice,
    HasRule,
    AppliesIn,
    SupportedBy,
    InfluencesPractice,
    RelatedTo,
}

impl RelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelKind::HasPractice => "HAS_PRACTICE",
            RelKind::HasRule => "HAS_RULE",
            RelKind::AppliesIn => "APPLIES_IN",
            RelKind::SupportedBy => "SUPPORTED_BY",
            RelKind::InfluencesPractice => "INFLUENCES_PRACTICE",
            RelKind::RelatedTo => "RELATED_TO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HAS_PRACTICE" => Some(RelKind::HasPractice),
            "HAS_RULE" => Some(RelKind::HasRule),
            "APPLIES_IN" => Some(RelKind::AppliesIn),
            "SUPPORTED_BY" => Some(RelKind::SupportedBy),
            "INFLUENCES_PRACTICE" => Some(RelKind::InfluencesPractice),
            "RELATED_TO" => Some(RelKind::RelatedTo),
            _ => None,
        }
    }

    pub fn all() -> &'static [RelKind] {
        &[
            RelKind::HasPractice,
            RelKind::HasRule,
            RelKind::AppliesIn,
            RelKind::SupportedBy,
            RelKind::InfluencesPractice,
            RelKind::RelatedTo,
        ]
    }

    /// Required (from, to) entity kinds, or None when any pair is allowed.
    pub fn endpoints(&self) -> Option<(EntityKind, EntityKind)> {
        match self {
            RelKind::HasPractice => Some((EntityKind::Methodology, EntityKind::Practice)),
            RelKind::HasRule => Some((EntityKind::Practice, EntityKind::Rule)),
            RelKind::AppliesIn => Some((EntityKind::Rule, EntityKind::Context)),
            RelKind::SupportedBy => Some((EntityKind::Rule, EntityKind::Evidence)),
            RelKind::InfluencesPractice => Some((EntityKind::RadarTechnique, EntityKind::Practice)),
            RelKind::RelatedTo => None,
        }
    }
}

impl fmt::Display for RelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule priority levels, lowest to highest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }

    pub fn all() -> &'static [Priority] {
        &[
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Critical,
        ]
    }

    /// Numeric rank for descending-priority sorts (critical first).
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

/// Technology radar adoption rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ring {
    Adopt,
    Trial,
    Assess,
    Hold,
}

impl Ring {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ring::Adopt => "Adopt",
            Ring::Trial => "Trial",
            Ring::Assess => "Assess",
            Ring::Hold => "Hold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Adopt" => Some(Ring::Adopt),
            "Trial" => Some(Ring::Trial),
            "Assess" => Some(Ring::Assess),
            "Hold" => Some(Ring::Hold),
            _ => None,
        }
    }

    pub fn all() -> &'static [Ring] {
        &[Ring::Adopt, Ring::Trial, Ring::Assess, Ring::Hold]
    }

    /// Default influence score for an INFLUENCES_PRACTICE edge, applied at
    /// write time when the caller supplies no override.
    pub fn influence_score(&self) -> f64 {
        match self {
            Ring::Adopt => 0.9,
            Ring::Trial => 0.7,
            Ring::Assess => 0.5,
            Ring::Hold => 0.3,
        }
    }

    /// Advisory difficulty for practices derived from a radar technique.
    pub fn difficulty(&self) -> &'static str {
        match self {
            Ring::Adopt => "Beginner",
            Ring::Trial => "Intermediate",
            Ring::Assess | Ring::Hold => "Advanced",
        }
    }

    /// Advisory rule priority for a technique at this adoption level. Hold
    /// maps to critical: it is a warning, not a low-interest signal.
    pub fn suggested_priority(&self) -> Priority {
        match self {
            Ring::Adopt => Priority::High,
            Ring::Trial => Priority::Medium,
            Ring::Assess => Priority::Low,
            Ring::Hold => Priority::Critical,
        }
    }

    /// Sort key following the adoption funnel, Adopt first.
    pub fn adoption_order(&self) -> u8 {
        match self {
            Ring::Adopt => 0,
            Ring::Trial => 1,
            Ring::Assess => 2,
            Ring::Hold => 3,
        }
    }
}

/// Technology radar quadrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    Techniques,
    Tools,
    Platforms,
    #[serde(rename = "Languages & Frameworks")]
    LanguagesFrameworks,
}

impl Quadrant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quadrant::Techniques => "Techniques",
            Quadrant::Tools => "Tools",
            Quadrant::Platforms => "Platforms",
            Quadrant::LanguagesFrameworks => "Languages & Frameworks",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Techniques" => Some(Quadrant::Techniques),
            "Tools" => Some(Quadrant::Tools),
            "Platforms" => Some(Quadrant::Platforms),
            "Languages & Frameworks" => Some(Quadrant::LanguagesFrameworks),
            _ => None,
        }
    }

    pub fn all() -> &'static [Quadrant] {
        &[
            Quadrant::Techniques,
            Quadrant::Tools,
            Quadrant::Platforms,
            Quadrant::LanguagesFrameworks,
        ]
    }
}

/// Edition-over-edition movement of a radar technique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Movement {
    New,
    #[serde(rename = "Moved in")]
    MovedIn,
    #[serde(rename = "Moved out")]
    MovedOut,
    #[default]
    #[serde(rename = "No change")]
    NoChange,
}

impl Movement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Movement::New => "New",
            Movement::MovedIn => "Moved in",
            Movement::MovedOut => "Moved out",
            Movement::NoChange => "No change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "New" => Some(Movement::New),
            "Moved in" => Some(Movement::MovedIn),
            "Moved out" => Some(Movement::MovedOut),
            "No change" => Some(Movement::NoChange),
            _ => None,
        }
    }

    pub fn all() -> &'static [Movement] {
        &[
            Movement::New,
            Movement::MovedIn,
            Movement::MovedOut,
            Movement::NoChange,
        ]
    }
}

/// A (kind, name) reference to an entity, the store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub name: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodologyAttrs {
    pub description: Option<String>,
    pub origin: Option<String>,
    pub year_created: Option<i32>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PracticeAttrs {
    pub description: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub difficulty_level: Option<String>,
    pub estimated_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleAttrs {
    pub title: String,
    pub detail: String,
    #[serde(default)]
    pub priority: Priority,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextAttrs {
    pub description: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub team_size: Option<String>,
    pub project_type: Option<String>,
    pub industry: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceAttrs {
    pub title: String,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub source_type: Option<String>,
    pub credibility_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadarTechniqueAttrs {
    pub description: String,
    pub ring: Ring,
    pub quadrant: Quadrant,
    #[serde(default)]
    pub movement: Movement,
    pub volume: u32,
    pub edition_date: String,
}

/// Kind-specific attributes of an entity. Serialized untagged: the kind is
/// stored in its own column, so deserialization goes through
/// [`EntityBody::from_json`] rather than serde's enum machinery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityBody {
    Methodology(MethodologyAttrs),
    Practice(PracticeAttrs),
    Rule(RuleAttrs),
    Context(ContextAttrs),
    Evidence(EvidenceAttrs),
    RadarTechnique(RadarTechniqueAttrs),
}

impl EntityBody {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityBody::Methodology(_) => EntityKind::Methodology,
            EntityBody::Practice(_) => EntityKind::Practice,
            EntityBody::Rule(_) => EntityKind::Rule,
            EntityBody::Context(_) => EntityKind::Context,
            EntityBody::Evidence(_) => EntityKind::Evidence,
            EntityBody::RadarTechnique(_) => EntityKind::RadarTechnique,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize attributes for a known kind. Enum and shape violations
    /// surface as `InvalidAttribute`, not raw serde errors.
    pub fn from_json(kind: EntityKind, raw: &Value) -> Result<Self> {
        validate_enum_fields(kind, raw)?;
        let body = match kind {
            EntityKind::Methodology => {
                EntityBody::Methodology(serde_json::from_value(raw.clone()).map_err(invalid_shape)?)
            }
            EntityKind::Practice => {
                EntityBody::Practice(serde_json::from_value(raw.clone()).map_err(invalid_shape)?)
            }
            EntityKind::Rule => {
                EntityBody::Rule(serde_json::from_value(raw.clone()).map_err(invalid_shape)?)
            }
            EntityKind::Context => {
                EntityBody::Context(serde_json::from_value(raw.clone()).map_err(invalid_shape)?)
            }
            EntityKind::Evidence => {
                EntityBody::Evidence(serde_json::from_value(raw.clone()).map_err(invalid_shape)?)
            }
            EntityKind::RadarTechnique => EntityBody::RadarTechnique(
                serde_json::from_value(raw.clone()).map_err(invalid_shape)?,
            ),
        };
        Ok(body)
    }

    /// Range and length invariants beyond what the types enforce.
    pub fn validate(&self) -> Result<()> {
        match self {
            EntityBody::Methodology(m) => {
                check_opt_len("description", m.description.as_deref(), 1000)?;
                if let Some(year) = m.year_created {
                    if !(1900..=2030).contains(&year) {
                        return Err(PraxisError::invalid(
                            "year_created",
                            format!("must be between 1900 and 2030, got {}", year),
                        ));
                    }
                }
            }
            EntityBody::Practice(p) => {
                check_opt_len("description", p.description.as_deref(), 1000)?;
            }
            EntityBody::Rule(r) => {
                check_len("title", &r.title, 1, 200)?;
                check_len("detail", &r.detail, 1, 2000)?;
            }
            EntityBody::Context(c) => {
                check_opt_len("description", c.description.as_deref(), 1000)?;
            }
            EntityBody::Evidence(e) => {
                check_len("title", &e.title, 1, 200)?;
                check_opt_len("summary", e.summary.as_deref(), 1000)?;
                if let Some(score) = e.credibility_score {
                    if !(0.0..=10.0).contains(&score) {
                        return Err(PraxisError::invalid(
                            "credibility_score",
                            format!("must be within 0.0..=10.0, got {}", score),
                        ));
                    }
                }
            }
            EntityBody::RadarTechnique(rt) => {
                if rt.description.chars().count() < 10 {
                    return Err(PraxisError::invalid(
                        "description",
                        "must be at least 10 characters",
                    ));
                }
                if rt.volume < 1 {
                    return Err(PraxisError::invalid("volume", "must be at least 1"));
                }
                validate_edition_date(&rt.edition_date)?;
            }
        }
        Ok(())
    }
}

fn invalid_shape(e: serde_json::Error) -> PraxisError {
    PraxisError::invalid("attributes", e.to_string())
}

/// Pre-check enumerated string fields in raw JSON so violations name the
/// field instead of surfacing as an opaque serde message. Used for both
/// update patches and out-of-band data re-validation.
pub fn validate_enum_fields(kind: EntityKind, raw: &Value) -> Result<()> {
    let obj = match raw.as_object() {
        Some(o) => o,
        None => return Ok(()),
    };
    let check = |field: &str, ok: &dyn Fn(&str) -> bool, expected: String| -> Result<()> {
        match obj.get(field) {
            None => Ok(()),
            Some(Value::String(s)) if ok(s) => Ok(()),
            Some(_) => Err(PraxisError::invalid(field, expected)),
        }
    };
    match kind {
        EntityKind::Rule => {
            check(
                "priority",
                &|s| Priority::parse(s).is_some(),
                expected_one_of(Priority::all().iter().map(|p| p.as_str())),
            )?;
        }
        EntityKind::RadarTechnique => {
            check(
                "ring",
                &|s| Ring::parse(s).is_some(),
                expected_one_of(Ring::all().iter().map(|r| r.as_str())),
            )?;
            check(
                "quadrant",
                &|s| Quadrant::parse(s).is_some(),
                expected_one_of(Quadrant::all().iter().map(|q| q.as_str())),
            )?;
            check(
                "movement",
                &|s| Movement::parse(s).is_some(),
                expected_one_of(Movement::all().iter().map(|m| m.as_str())),
            )?;
        }
        _ => {}
    }
    Ok(())
}

fn expected_one_of<'a>(values: impl Iterator<Item = &'a str>) -> String {
    format!("expected one of: {}", values.collect::<Vec<_>>().join(", "))
}

/// Names are the per-kind key: 1..=200 characters, no leeway.
pub fn validate_name(name: &str) -> Result<()> {
    check_len("name", name, 1, 200)
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(PraxisError::invalid(
            field,
            format!("length must be within {}..={} characters, got {}", min, max, len),
        ));
    }
    Ok(())
}

fn check_opt_len(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    if let Some(v) = value {
        check_len(field, v, 0, max)?;
    }
    Ok(())
}

fn validate_edition_date(value: &str) -> Result<()> {
    // Pattern matches: YYYY-MM with a real month
    let edition_regex = Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("Invalid regex pattern");
    if !edition_regex.is_match(value) {
        return Err(PraxisError::invalid(
            "edition_date",
            format!("must match YYYY-MM, got \"{}\"", value),
        ));
    }
    Ok(())
}

/// A stored entity: the (kind, name) key, version metadata and the typed
/// kind-specific attributes.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub body: EntityBody,
}

impl Entity {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.name.clone())
    }
}

/// New-entity request: name plus typed attributes. Version and timestamps
/// are assigned by the store.
#[derive(Debug, Clone)]
pub struct EntityDraft {
    pub name: String,
    pub body: EntityBody,
}

impl EntityDraft {
    pub fn new(name: impl Into<String>, body: EntityBody) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}
