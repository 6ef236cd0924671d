//! Breaker configuration.

use serde::{Deserialize, Serialize};

use crate::error::BreakError;

/// Context the breaker runs in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerKind {
    /// Main flow broken across pages from a page provider.
    #[default]
    Page,
    /// Fixed-extent container; every part has the same extent.
    BlockContainer,
    /// Headers, footers and other regions that favor a single part.
    StaticContent,
}

/// Block-progression alignment of content inside each part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayAlign {
    #[default]
    Before,
    Center,
    After,
    Distribute,
    Fill,
}

/// Alignment the breaking algorithm optimizes for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    #[default]
    Start,
    Justify,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Keep overflowing content and report it to the listener.
    #[default]
    Clip,
    /// Fail layout with [`BreakError::Overflow`].
    Error,
}

/// Which break candidates the algorithm considers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    #[default]
    AllBreaks,
    NoFlaggedPenalties,
    OnlyForcedBreaks,
    /// Greedy: every part takes as much content as fits.
    FirstFit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub kind: BreakerKind,
    pub display_align: DisplayAlign,
    /// Upper bound on the adjustment ratio of a feasible part. Unbounded when
    /// unset.
    pub max_adjustment_ratio: Option<f64>,
    pub overflow_policy: OverflowPolicy,
    /// Try an empty part before accepting an overflow. Defaults to on for
    /// page breaking.
    pub part_overflow_recovery: Option<bool>,
    pub repeated_flagged_demerit: f64,
    pub incompatible_fitness_demerit: f64,
    pub search_mode: SearchMode,
    /// Prefer solutions with this many parts, when reachable.
    pub target_part_count: Option<usize>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            kind: BreakerKind::Page,
            display_align: DisplayAlign::Before,
            max_adjustment_ratio: None,
            overflow_policy: OverflowPolicy::Clip,
            part_overflow_recovery: None,
            repeated_flagged_demerit: 50.0,
            incompatible_fitness_demerit: 50.0,
            search_mode: SearchMode::AllBreaks,
            target_part_count: None,
        }
    }
}

impl BreakerConfig {
    pub fn for_kind(kind: BreakerKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_display_align(mut self, display_align: DisplayAlign) -> Self {
        self.display_align = display_align;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    pub fn from_json_str(input: &str) -> Result<Self, BreakError> {
        let config: BreakerConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BreakError> {
        if let Some(ratio) = self.max_adjustment_ratio {
            if ratio.is_nan() || ratio < 0.0 {
                return Err(BreakError::InvalidConfig(format!(
                    "max_adjustment_ratio must be non-negative, got {}",
                    ratio
                )));
            }
        }
        if !self.repeated_flagged_demerit.is_finite() || self.repeated_flagged_demerit < 0.0 {
            return Err(BreakError::InvalidConfig(
                "repeated_flagged_demerit must be a finite non-negative number".to_string(),
            ));
        }
        if !self.incompatible_fitness_demerit.is_finite() || self.incompatible_fitness_demerit < 0.0
        {
            return Err(BreakError::InvalidConfig(
                "incompatible_fitness_demerit must be a finite non-negative number".to_string(),
            ));
        }
        if self.target_part_count == Some(0) {
            return Err(BreakError::InvalidConfig(
                "target_part_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn part_overflow_recovery(&self) -> bool {
        self.part_overflow_recovery
            .unwrap_or(self.kind == BreakerKind::Page)
    }

    pub fn favors_single_part(&self) -> bool {
        self.kind == BreakerKind::StaticContent
    }

    pub fn alignment(&self) -> Alignment {
        match self.display_align {
            DisplayAlign::Fill | DisplayAlign::Distribute => Alignment::Justify,
            _ => Alignment::Start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_fills_missing_fields_with_defaults() {
        let config = BreakerConfig::from_json_str(
            r#"{ "kind": "static-content", "display_align": "center" }"#,
        )
        .unwrap();
        assert_eq!(config.kind, BreakerKind::StaticContent);
        assert_eq!(config.display_align, DisplayAlign::Center);
        assert_eq!(config.search_mode, SearchMode::AllBreaks);
        assert!(config.favors_single_part());
        assert!(!config.part_overflow_recovery());
    }

    #[test]
    fn json_config_rejects_negative_ratio() {
        let err = BreakerConfig::from_json_str(r#"{ "max_adjustment_ratio": -1.0 }"#).unwrap_err();
        assert!(matches!(err, BreakError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        let err = BreakerConfig::from_json_str("{ kind: ").unwrap_err();
        assert!(matches!(err, BreakError::InvalidConfig(_)));
    }

    #[test]
    fn justify_alignment_follows_display_align() {
        let config = BreakerConfig::default().with_display_align(DisplayAlign::Fill);
        assert_eq!(config.alignment(), Alignment::Justify);
        assert_eq!(BreakerConfig::default().alignment(), Alignment::Start);
        assert!(BreakerConfig::default().part_overflow_recovery());
    }
}
