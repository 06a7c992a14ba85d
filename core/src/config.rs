use crate::{
    error::{AnalyticsError, AnalyticsResult},
    rfm_engine::Segment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const FALLBACK_CONTINENT: &str = "Other";

// ── Segment priorities ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPriority {
    pub segment: Segment,
    /// 1 = highest value segment, 10 = lowest.
    pub priority: u8,
    pub color: String,
    pub action: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SegmentPrioritiesFile {
    segments: Vec<SegmentPriority>,
}

/// Static segment → priority metadata lookup.
///
/// Always holds exactly one entry per `Segment` variant with ranks 1..=10.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPriorityTable {
    entries: BTreeMap<Segment, SegmentPriority>,
}

impl SegmentPriorityTable {
    pub fn from_entries(entries: Vec<SegmentPriority>) -> AnalyticsResult<Self> {
        if entries.len() != Segment::ALL.len() {
            return Err(AnalyticsError::InvalidConfig(format!(
                "expected {} segment priorities, got {}",
                Segment::ALL.len(),
                entries.len()
            )));
        }

        let mut ranks: Vec<u8> = entries.iter().map(|e| e.priority).collect();
        ranks.sort_unstable();
        let expected: Vec<u8> = (1..=Segment::ALL.len() as u8).collect();
        if ranks != expected {
            return Err(AnalyticsError::InvalidConfig(format!(
                "segment priority ranks must be exactly 1..={}, got {ranks:?}",
                Segment::ALL.len()
            )));
        }

        let mut map = BTreeMap::new();
        for entry in entries {
            let segment = entry.segment;
            if map.insert(segment, entry).is_some() {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "segment '{}' listed twice",
                    segment.label()
                )));
            }
        }

        Ok(Self { entries: map })
    }

    pub fn get(&self, segment: Segment) -> AnalyticsResult<&SegmentPriority> {
        self.entries.get(&segment).ok_or_else(|| {
            AnalyticsError::InvalidConfig(format!("no priority for segment '{}'", segment.label()))
        })
    }

    /// Entries sorted by priority rank, 1 first.
    pub fn by_priority(&self) -> Vec<&SegmentPriority> {
        let mut out: Vec<&SegmentPriority> = self.entries.values().collect();
        out.sort_by_key(|e| e.priority);
        out
    }
}

impl Default for SegmentPriorityTable {
    fn default() -> Self {
        let row = |segment: Segment, priority: u8, color: &str, action: &str, description: &str| {
            (segment, SegmentPriority {
                segment,
                priority,
                color: color.into(),
                action: action.into(),
                description: description.into(),
            })
        };
        let entries = BTreeMap::from([
            row(Segment::Champions, 1, "#2ecc71",
                "Récompenser, solliciter avis, upsell premium",
                "Meilleurs clients, très actifs et dépensent beaucoup"),
            row(Segment::Loyaux, 2, "#27ae60",
                "Programmes fidélité, offres exclusives",
                "Clients fidèles avec bonne valeur"),
            row(Segment::PotentielsLoyaux, 3, "#3498db",
                "Engagement régulier, offres personnalisées",
                "Récents avec bon potentiel de fidélisation"),
            row(Segment::Nouveaux, 4, "#9b59b6",
                "Onboarding, offres découverte, formation",
                "Clients récents à convertir"),
            row(Segment::Prometteurs, 5, "#1abc9c",
                "Offres ciblées, cross-sell",
                "Bon potentiel de valeur"),
            row(Segment::BesoinAttention, 6, "#f39c12",
                "Campagnes de réengagement, enquêtes satisfaction",
                "Commencent à décliner, à réactiver rapidement"),
            row(Segment::ARisque, 7, "#e67e22",
                "Offres de reconquête, remises limitées",
                "Étaient bons mais deviennent inactifs"),
            row(Segment::Hibernants, 8, "#e74c3c",
                "Campagnes de réactivation, win-back",
                "Inactifs depuis longtemps"),
            row(Segment::Perdus, 9, "#95a5a6",
                "Coût faible : sondage ou retrait liste",
                "Très peu d'engagement, ROI faible"),
            row(Segment::Autres, 10, "#7f8c8d",
                "À analyser au cas par cas",
                "Profil mixte"),
        ]);
        Self { entries }
    }
}

// ── Geography ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct ContinentMapFile {
    #[serde(default)]
    fallback: Option<String>,
    countries: HashMap<String, String>,
}

/// Fixed country → continent lookup. Unmapped countries fall back to "Other".
#[derive(Debug, Clone, PartialEq)]
pub struct ContinentMap {
    countries: HashMap<String, String>,
    fallback: String,
}

impl ContinentMap {
    pub fn new(countries: HashMap<String, String>) -> Self {
        Self { countries, fallback: FALLBACK_CONTINENT.into() }
    }

    pub fn continent_of(&self, country: &str) -> &str {
        self.countries
            .get(country)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }
}

impl Default for ContinentMap {
    fn default() -> Self {
        let pairs = [
            ("United Kingdom", "Europe"), ("Germany", "Europe"), ("France", "Europe"),
            ("Spain", "Europe"), ("Portugal", "Europe"), ("Italy", "Europe"),
            ("Belgium", "Europe"),
            ("Australia", "Oceania"), ("New Zealand", "Oceania"),
            ("USA", "America"), ("Canada", "America"),
            ("Japan", "Asia"), ("China", "Asia"), ("Singapore", "Asia"),
        ];
        Self::new(
            pairs
                .iter()
                .map(|(c, k)| (c.to_string(), k.to_string()))
                .collect(),
        )
    }
}

// ── Engine tuning ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmSettings {
    /// Maximum number of customers returned by the scatter sample.
    pub sample_cap: usize,
    pub sample_seed: u64,
}

impl Default for RfmSettings {
    fn default() -> Self {
        Self { sample_cap: 1000, sample_seed: 42 }
    }
}

/// Parameters of the closed-form CLV: margin × r / (1 + d − r).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClvFormulaParams {
    pub margin: f64,
    pub retention: f64,
    pub discount: f64,
}

impl Default for ClvFormulaParams {
    fn default() -> Self {
        Self { margin: 10.0, retention: 0.8, discount: 0.1 }
    }
}

impl ClvFormulaParams {
    pub fn clv(&self) -> f64 {
        (self.margin * self.retention) / (1.0 + self.discount - self.retention)
    }
}

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    pub segment_priorities: SegmentPriorityTable,
    pub continents: ContinentMap,
    pub rfm: RfmSettings,
    /// Days after a customer's first purchase counted by the North Star.
    pub north_star_window_days: i64,
    /// Days after the acquisition month counted by the cohort 90-day CA.
    pub early_revenue_window_days: i64,
    /// Cohort age at which the "M+3" retention KPI is read.
    pub retention_checkpoint_age: u32,
    pub clv_formula: ClvFormulaParams,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            segment_priorities: SegmentPriorityTable::default(),
            continents: ContinentMap::default(),
            rfm: RfmSettings::default(),
            north_star_window_days: 90,
            early_revenue_window_days: 90,
            retention_checkpoint_age: 3,
            clv_formula: ClvFormulaParams::default(),
        }
    }
}

impl AnalyticsConfig {
    /// Load the reference tables from the data/ directory.
    /// Tuning values keep their defaults.
    pub fn load(data_dir: &str) -> AnalyticsResult<Self> {
        let seg_path = format!("{data_dir}/segments/segment_priorities.json");
        let seg_content = std::fs::read_to_string(&seg_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {seg_path}: {e}"))?;
        let seg_file: SegmentPrioritiesFile = serde_json::from_str(&seg_content)?;
        let segment_priorities = SegmentPriorityTable::from_entries(seg_file.segments)?;

        let geo_path = format!("{data_dir}/geo/continent_map.json");
        let geo_content = std::fs::read_to_string(&geo_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {geo_path}: {e}"))?;
        let geo_file: ContinentMapFile = serde_json::from_str(&geo_content)?;
        let continents = ContinentMap {
            countries: geo_file.countries,
            fallback: geo_file.fallback.unwrap_or_else(|| FALLBACK_CONTINENT.into()),
        };

        log::info!("Loaded analytics config from {data_dir}");

        Ok(Self {
            segment_priorities,
            continents,
            ..Self::default()
        })
    }
}
