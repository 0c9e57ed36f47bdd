//! Central tunables for a [`crate::game::Game`] instance.
//!
//! Mirrors the teacher's `SimConfig` resource: a plain `Default`-able struct
//! that is constructed once and threaded through at composition time, rather
//! than scattered magic numbers.

use crate::error::{TacticsError, TacticsResult};

/// Sampling strategy used by the LOS engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LosSamplingMode {
    /// Corners only (`k=0`) or a small number of interior samples.
    Sparse,
    /// A denser sample set; strictly more rays than `Sparse` for the same tiles.
    Full,
}

#[derive(Debug, Clone)]
pub struct TacticsConfig {
    pub grid_width: i32,
    pub grid_height: i32,
    pub cell_size: f32,
    /// Number of interior sample points per tile edge used by the LOS engine.
    /// `0` means corners only.
    pub los_granularity: u32,
    pub los_mode: LosSamplingMode,
    /// Maximum number of recorded events retained by the event bus history ring.
    pub event_history_capacity: usize,
    /// Whether the terrain precomputes Dijkstra caches eagerly on construction.
    pub precompute_paths: bool,
}

impl Default for TacticsConfig {
    fn default() -> Self {
        Self {
            grid_width: 10,
            grid_height: 10,
            cell_size: 1.0,
            los_granularity: 0,
            los_mode: LosSamplingMode::Sparse,
            event_history_capacity: 4096,
            precompute_paths: false,
        }
    }
}

impl TacticsConfig {
    pub fn with_grid(mut self, width: i32, height: i32) -> Self {
        self.grid_width = width;
        self.grid_height = height;
        self
    }

    pub fn with_los_granularity(mut self, k: u32) -> Self {
        self.los_granularity = k;
        self
    }

    /// Rejects grid dimensions or a cell size that no subsystem in this
    /// crate can do anything sensible with (a zero- or negative-area grid,
    /// or a non-positive cell size for display/world-space conversions).
    /// Called from [`crate::game::Game::try_with_config`]; `new`/`with_config`
    /// stay infallible for callers who already know their config is sound
    /// (tests, the demo).
    pub fn validate(&self) -> TacticsResult<()> {
        if self.grid_width <= 0 || self.grid_height <= 0 {
            return Err(TacticsError::ConfigurationError(format!(
                "grid dimensions must be positive, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if self.cell_size <= 0.0 {
            return Err(TacticsError::ConfigurationError(format!("cell_size must be positive, got {}", self.cell_size)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = TacticsConfig::default();
        assert_eq!(cfg.grid_width, 10);
        assert_eq!(cfg.grid_height, 10);
        assert_eq!(cfg.los_granularity, 0);
        assert_eq!(cfg.los_mode, LosSamplingMode::Sparse);
    }

    #[test]
    fn builder_overrides_grid_size() {
        let cfg = TacticsConfig::default().with_grid(5, 5).with_los_granularity(2);
        assert_eq!((cfg.grid_width, cfg.grid_height), (5, 5));
        assert_eq!(cfg.los_granularity, 2);
    }

    #[test]
    fn default_config_validates() {
        assert!(TacticsConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_or_negative_grid_dimensions_are_rejected() {
        assert!(TacticsConfig::default().with_grid(0, 5).validate().is_err());
        assert!(TacticsConfig::default().with_grid(5, -1).validate().is_err());
    }

    #[test]
    fn non_positive_cell_size_is_rejected() {
        let mut cfg = TacticsConfig::default();
        cfg.cell_size = 0.0;
        assert!(cfg.validate().is_err());
    }
}
