//! Char priority ranking.

use std::{
    cmp::Reverse,
    collections::{BTreeSet, HashMap},
    fs,
    path::Path,
};

use crate::{config::FontConfig, errors::ConfigError};

mod builtin;

/// Strategy of ordering chars by load priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PriorityStrategy {
    /// ASCII first, then chars ranked by a frequency table (the built-in list of common
    /// Simplified Chinese characters if no table is configured), then the rest.
    ChineseFrequency,
    /// ASCII, then the remaining Latin blocks and general punctuation, then the rest.
    LatinBasic,
    /// Chars ranked by a configured frequency table, then the rest.
    Frequency,
    /// Codepoint order.
    Codepoint,
}

impl PriorityStrategy {
    /// Resolves a strategy identifier used in configuration.
    pub fn from_id(id: &str) -> Option<Self> {
        Some(match id {
            "chinese-frequency" => Self::ChineseFrequency,
            "latin-basic" => Self::LatinBasic,
            "frequency" => Self::Frequency,
            "codepoint" => Self::Codepoint,
            _ => return None,
        })
    }

    /// Returns the identifier of this strategy.
    pub fn id(self) -> &'static str {
        match self {
            Self::ChineseFrequency => "chinese-frequency",
            Self::LatinBasic => "latin-basic",
            Self::Frequency => "frequency",
            Self::Codepoint => "codepoint",
        }
    }

    /// Checks whether this strategy needs a frequency table in the configuration.
    pub fn requires_data(self) -> bool {
        matches!(self, Self::Frequency)
    }
}

/// Char frequencies.
///
/// The text format has one entry per line: a char optionally followed by whitespace and
/// an integer frequency. Entries without a frequency are ranked by their position,
/// most frequent first. Empty lines and lines starting with `#` are skipped.
#[derive(Debug, Clone, Default)]
pub struct FrequencyTable {
    scores: HashMap<char, u64>,
}

impl FrequencyTable {
    /// Parses a table from text. Malformed frequencies are treated as missing, and repeated
    /// chars keep their first entry.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<_> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        let line_count = lines.len() as u64;
        let mut scores = HashMap::with_capacity(lines.len());
        for (position, line) in (0_u64..).zip(lines) {
            let mut chars = line.chars();
            let Some(ch) = chars.next() else {
                continue;
            };
            let frequency = chars.as_str().trim().parse::<u64>().ok();
            // Positional scores are below any explicit frequency of 1 or more.
            let score = frequency.map_or(line_count - position, |freq| {
                freq.saturating_add(line_count)
            });
            scores.entry(ch).or_insert(score);
        }
        Self { scores }
    }

    /// Loads a table from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::PriorityData {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Returns the built-in table of common Simplified Chinese characters.
    pub fn common_hanzi() -> Self {
        let chars: Vec<_> = builtin::COMMON_HANZI.chars().collect();
        let len = chars.len() as u64;
        let mut scores = HashMap::with_capacity(chars.len());
        for (position, ch) in (0_u64..).zip(chars) {
            scores.entry(ch).or_insert(len - position);
        }
        Self { scores }
    }

    /// Returns the number of ranked chars.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Checks whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn score(&self, ch: char) -> Option<u64> {
        self.scores.get(&ch).copied()
    }
}

/// Orders chars by load priority.
#[derive(Debug, Clone)]
pub struct PriorityRanker {
    strategy: PriorityStrategy,
    table: Option<FrequencyTable>,
}

impl PriorityRanker {
    /// Creates a ranker.
    pub fn new(strategy: PriorityStrategy, table: Option<FrequencyTable>) -> Self {
        let table = match (strategy, table) {
            (PriorityStrategy::ChineseFrequency, None) => Some(FrequencyTable::common_hanzi()),
            (_, table) => table,
        };
        Self { strategy, table }
    }

    /// Creates a ranker for a validated font configuration, loading referenced priority data.
    ///
    /// # Errors
    ///
    /// Returns an error if the strategy is unknown or priority data cannot be loaded.
    pub fn from_config(font_id: &str, config: &FontConfig) -> Result<Self, ConfigError> {
        let strategy = PriorityStrategy::from_id(&config.priority_strategy).ok_or_else(|| {
            ConfigError::UnknownStrategy {
                font_id: font_id.to_owned(),
                strategy: config.priority_strategy.clone(),
            }
        })?;
        let table = config
            .priority_data_ref
            .as_deref()
            .map(FrequencyTable::load)
            .transpose()?;
        if strategy.requires_data() && table.is_none() {
            return Err(ConfigError::MissingField {
                font_id: font_id.to_owned(),
                field: "priorityDataRef",
            });
        }
        Ok(Self::new(strategy, table))
    }

    /// Returns the strategy of this ranker.
    pub fn strategy(&self) -> PriorityStrategy {
        self.strategy
    }

    /// Ranks chars. Each input char occurs in the output exactly once.
    pub fn rank(&self, chars: &BTreeSet<char>) -> Vec<char> {
        let mut ranked: Vec<char> = chars.iter().copied().collect();
        // `BTreeSet` iteration yields chars in codepoint order, and the sort is stable,
        // so ties are broken by codepoint.
        ranked.sort_by_cached_key(|&ch| self.sort_key(ch));
        ranked
    }

    fn sort_key(&self, ch: char) -> (u8, Reverse<u64>) {
        let score = self.table.as_ref().and_then(|table| table.score(ch));
        let ranked = |tier: u8| match score {
            Some(score) => (tier, Reverse(score)),
            None => (tier + 1, Reverse(0)),
        };

        match self.strategy {
            PriorityStrategy::Codepoint => (0, Reverse(0)),
            PriorityStrategy::Frequency => ranked(0),
            PriorityStrategy::ChineseFrequency => {
                if is_printable_ascii(ch) {
                    (0, Reverse(0))
                } else {
                    ranked(1)
                }
            }
            PriorityStrategy::LatinBasic => {
                let tier = match u32::from(ch) {
                    0x20..=0x7e => 0,
                    0xa0..=0xff => 1,
                    0x100..=0x24f | 0x2000..=0x206f | 0x20ac => 2,
                    _ => 3,
                };
                (tier, Reverse(0))
            }
        }
    }
}

fn is_printable_ascii(ch: char) -> bool {
    matches!(ch, ' '..='~')
}
