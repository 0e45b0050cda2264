//! Feature Generation from Raw Records

use crate::error::{ConfigError, GenerationError};
use crate::feature_set::{EngineeredFeatureSet, FeatureColumn, FeatureMetadata};
use chrono::NaiveDate;
use feature_stats::{mean, std_dev, LinearFit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Names the generator emits itself; raw stats may not shadow them
const CONTEXT_FEATURES: [&str; 7] = [
    "rest_days",
    "opponent_def_rating",
    "news_sentiment",
    "opponent",
    "venue",
    "day_of_week",
    "injury_status",
];

/// One game in an entity's observation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "GameRecordFields")]
pub struct GameRecord {
    pub date: NaiveDate,
    pub is_home: bool,
    pub opponent: String,
    /// Sequence number of the game within the season
    #[serde(default)]
    pub game_number: Option<i64>,
    /// Numeric box-score fields (`points`, `rebounds`, ...); other extra
    /// fields are ignored
    #[serde(flatten)]
    pub stats: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatField {
    Number(f64),
    Other(#[allow(dead_code)] serde::de::IgnoredAny),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameRecordFields {
    date: NaiveDate,
    is_home: bool,
    opponent: String,
    #[serde(default)]
    game_number: Option<i64>,
    #[serde(flatten)]
    extra: BTreeMap<String, StatField>,
}

impl From<GameRecordFields> for GameRecord {
    fn from(fields: GameRecordFields) -> Self {
        let stats = fields
            .extra
            .into_iter()
            .filter_map(|(name, field)| match field {
                StatField::Number(value) => Some((name, value)),
                StatField::Other(_) => None,
            })
            .collect();
        Self {
            date: fields.date,
            is_home: fields.is_home,
            opponent: fields.opponent,
            game_number: fields.game_number,
            stats,
        }
    }
}

/// Season aggregates for a team
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStats {
    pub possessions: f64,
    pub points: f64,
    pub points_allowed: f64,
    pub games: u32,
}

impl TeamStats {
    fn per_game(&self, total: f64) -> Option<f64> {
        (self.games > 0).then(|| total / self.games as f64)
    }

    /// Possessions per game
    pub fn pace(&self) -> Option<f64> {
        self.per_game(self.possessions).filter(|p| *p > 0.0)
    }

    /// Points scored per game
    pub fn points_per_game(&self) -> Option<f64> {
        self.per_game(self.points).filter(|p| *p > 0.0)
    }

    /// Points allowed per 100 possessions
    pub fn defensive_rating(&self) -> Option<f64> {
        (self.possessions > 0.0).then(|| self.points_allowed / self.possessions * 100.0)
    }
}

/// Injury report entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjuryReport {
    pub date: NaiveDate,
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// News item with an optional sentiment score in [-1, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub date: NaiveDate,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub sentiment: f64,
}

/// Raw record supplied by the upstream data provider for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlayerData {
    pub game_log: Vec<GameRecord>,
    pub team: TeamStats,
    /// Aggregates keyed by opponent name
    #[serde(default)]
    pub opponents: BTreeMap<String, TeamStats>,
    #[serde(default)]
    pub injuries: Vec<InjuryReport>,
    #[serde(default)]
    pub news: Vec<NewsItem>,
}

/// Generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Minimum number of games required (default: 3)
    pub min_games: usize,
    /// Trailing window sizes for rolling statistics
    pub rolling_windows: Vec<usize>,
    /// Smoothing factor for the exponentially weighted mean
    pub ewma_alpha: f64,
    /// Days before a game whose news counts towards its sentiment
    pub news_window_days: i64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_games: 3,
            rolling_windows: vec![3, 5],
            ewma_alpha: 0.3,
            news_window_days: 3,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_games < 2 {
            return Err(ConfigError::new("generation.min_games", "must be at least 2"));
        }
        if self.rolling_windows.is_empty() || self.rolling_windows.contains(&0) {
            return Err(ConfigError::new(
                "generation.rolling_windows",
                "needs at least one positive window",
            ));
        }
        if !(self.ewma_alpha > 0.0 && self.ewma_alpha <= 1.0) {
            return Err(ConfigError::new("generation.ewma_alpha", "must be in (0, 1]"));
        }
        if self.news_window_days < 0 {
            return Err(ConfigError::new("generation.news_window_days", "must not be negative"));
        }
        Ok(())
    }
}

/// Apply `f` to the trailing window ending at each index
fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            f(&values[start..=i])
        })
        .collect()
}

fn ewma(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut state: Option<f64> = None;
    for &v in values {
        let next = match state {
            Some(prev) => prev + alpha * (v - prev),
            None => v,
        };
        state = Some(next);
        out.push(next);
    }
    out
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Turns raw game logs into an engineered feature set
pub struct FeatureGenerator {
    config: GenerationConfig,
}

impl FeatureGenerator {
    /// Create a new generator
    pub fn new(config: GenerationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate features centred on the `prop_type` stat
    pub fn generate(
        &self,
        prop_type: &str,
        raw: &RawPlayerData,
    ) -> Result<EngineeredFeatureSet, GenerationError> {
        let mut games: Vec<&GameRecord> = raw.game_log.iter().collect();
        games.sort_by_key(|g| g.date);

        if games.len() < self.config.min_games {
            return Err(GenerationError::InsufficientGames {
                required: self.config.min_games,
                actual: games.len(),
            });
        }
        if let Some(idx) = games.iter().position(|g| !g.stats.contains_key(prop_type)) {
            return Err(GenerationError::MissingStat {
                stat: prop_type.to_string(),
                game_index: idx,
            });
        }

        let stat_names = Self::raw_stats(&games, prop_type);
        debug!(
            "Generating features for {}: {} games, {} shared stats",
            prop_type,
            games.len(),
            stat_names.len()
        );

        let metadata = FeatureMetadata {
            time_index: Self::time_index(&games),
            ..FeatureMetadata::default()
        };
        let mut set = EngineeredFeatureSet::with_metadata(metadata);

        // Numerical: raw box-score stats plus schedule/opponent context
        for stat in &stat_names {
            let column = games.iter().map(|g| g.stats[stat.as_str()]).collect();
            set.insert(stat.clone(), FeatureColumn::Numerical(column))?;
        }
        set.insert("rest_days", FeatureColumn::Numerical(Self::rest_days(&games)))?;
        if let Some(ratings) = Self::opponent_ratings(&games, raw) {
            set.insert("opponent_def_rating", FeatureColumn::Numerical(ratings))?;
        }
        if !raw.news.is_empty() {
            let sentiment = self.news_sentiment(&games, &raw.news);
            set.insert("news_sentiment", FeatureColumn::Numerical(sentiment))?;
        }

        // Categorical
        set.insert(
            "opponent",
            FeatureColumn::Categorical(games.iter().map(|g| g.opponent.clone()).collect()),
        )?;
        set.insert(
            "venue",
            FeatureColumn::Categorical(
                games
                    .iter()
                    .map(|g| (if g.is_home { "home" } else { "away" }).to_string())
                    .collect(),
            ),
        )?;
        set.insert(
            "day_of_week",
            FeatureColumn::Categorical(games.iter().map(|g| g.date.format("%A").to_string()).collect()),
        )?;
        if !raw.injuries.is_empty() {
            set.insert(
                "injury_status",
                FeatureColumn::Categorical(Self::injury_status(&games, &raw.injuries)),
            )?;
        }

        // Temporal: rolling form of the prop stat
        let prop: Vec<f64> = games.iter().map(|g| g.stats[prop_type]).collect();
        for &window in &self.config.rolling_windows {
            set.insert(
                format!("{}_rolling_mean_{}", prop_type, window),
                FeatureColumn::Temporal(rolling(&prop, window, mean)),
            )?;
            set.insert(
                format!("{}_rolling_std_{}", prop_type, window),
                FeatureColumn::Temporal(rolling(&prop, window, std_dev)),
            )?;
            set.insert(
                format!("{}_trend_{}", prop_type, window),
                FeatureColumn::Temporal(rolling(&prop, window, |w| {
                    LinearFit::over_index(w).map(|fit| fit.slope).unwrap_or(0.0)
                })),
            )?;
        }
        set.insert(
            format!("{}_ewma", prop_type),
            FeatureColumn::Temporal(ewma(&prop, self.config.ewma_alpha)),
        )?;

        // Derived: combinations of the prop stat with context
        if let Some(pace) = raw.team.pace() {
            set.insert(
                format!("{}_per_possession", prop_type),
                FeatureColumn::Derived(prop.iter().map(|v| v / pace).collect()),
            )?;
        }
        if let Some(team_points) = raw.team.points_per_game() {
            set.insert(
                format!("{}_share_of_team", prop_type),
                FeatureColumn::Derived(prop.iter().map(|v| v / team_points).collect()),
            )?;
        }
        let form = rolling(&prop, self.config.rolling_windows[0], mean);
        set.insert(
            format!("{}_momentum", prop_type),
            FeatureColumn::Derived(prop.iter().zip(&form).map(|(v, f)| v - f).collect()),
        )?;
        for stat in stat_names.iter().filter(|s| s.as_str() != prop_type) {
            let column = games
                .iter()
                .map(|g| ratio(g.stats[prop_type], g.stats[stat.as_str()]))
                .collect();
            set.insert(format!("{}_to_{}_ratio", prop_type, stat), FeatureColumn::Derived(column))?;
        }

        debug!("Generated {} features ({:?})", set.len(), set.counts());
        Ok(set)
    }

    /// Stats present in every game, in name order
    fn common_stats(games: &[&GameRecord]) -> BTreeSet<String> {
        let mut common: BTreeSet<String> = games
            .first()
            .map(|g| g.stats.keys().cloned().collect())
            .unwrap_or_default();
        for game in games.iter().skip(1) {
            common.retain(|k| game.stats.contains_key(k));
        }

        let all: BTreeSet<&String> = games.iter().flat_map(|g| g.stats.keys()).collect();
        for dropped in all.iter().filter(|k| !common.contains(k.as_str())) {
            warn!("Dropping stat {} missing from some games", dropped);
        }
        common
    }

    /// Shared stats minus those that would shadow a generated feature
    fn raw_stats(games: &[&GameRecord], prop_type: &str) -> BTreeSet<String> {
        let prefix = format!("{}_", prop_type);
        let mut stats = Self::common_stats(games);
        stats.retain(|name| {
            let shadows = CONTEXT_FEATURES.contains(&name.as_str()) || name.starts_with(&prefix);
            if shadows {
                warn!("Ignoring raw stat {}: name is reserved for a generated feature", name);
            }
            !shadows
        });
        stats
    }

    fn time_index(games: &[&GameRecord]) -> Vec<i64> {
        match games.iter().map(|g| g.game_number).collect::<Option<Vec<i64>>>() {
            Some(numbers) => numbers,
            None => (0..games.len() as i64).collect(),
        }
    }

    fn rest_days(games: &[&GameRecord]) -> Vec<f64> {
        let gaps: Vec<f64> = games
            .windows(2)
            .map(|w| (w[1].date - w[0].date).num_days() as f64)
            .collect();
        // No previous game for the opener: assume the typical gap
        let mut rest = Vec::with_capacity(games.len());
        rest.push(mean(&gaps));
        rest.extend(gaps);
        rest
    }

    fn opponent_ratings(games: &[&GameRecord], raw: &RawPlayerData) -> Option<Vec<f64>> {
        let known: Vec<f64> = raw
            .opponents
            .values()
            .filter_map(TeamStats::defensive_rating)
            .collect();
        if known.is_empty() {
            return None;
        }
        let fallback = mean(&known);
        Some(
            games
                .iter()
                .map(|g| {
                    raw.opponents
                        .get(&g.opponent)
                        .and_then(TeamStats::defensive_rating)
                        .unwrap_or(fallback)
                })
                .collect(),
        )
    }

    fn news_sentiment(&self, games: &[&GameRecord], news: &[NewsItem]) -> Vec<f64> {
        games
            .iter()
            .map(|g| {
                let scores: Vec<f64> = news
                    .iter()
                    .filter(|n| {
                        let age = (g.date - n.date).num_days();
                        (0..=self.config.news_window_days).contains(&age)
                    })
                    .map(|n| n.sentiment)
                    .filter(|s| s.is_finite())
                    .collect();
                mean(&scores)
            })
            .collect()
    }

    fn injury_status(games: &[&GameRecord], injuries: &[InjuryReport]) -> Vec<String> {
        games
            .iter()
            .map(|g| {
                injuries
                    .iter()
                    .filter(|r| r.date <= g.date)
                    .max_by_key(|r| r.date)
                    .map(|r| r.status.to_lowercase())
                    .unwrap_or_else(|| "active".to_string())
            })
            .collect()
    }
}

impl Default for FeatureGenerator {
    fn default() -> Self {
        Self {
            config: GenerationConfig::default(),
        }
    }
}
