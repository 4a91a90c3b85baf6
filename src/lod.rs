//! Level-of-detail selection for visible nodes and edges.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{GraphNode, Viewport};

/// Render fidelity tier. Lower is more detailed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LodLevel {
    /// Labels, glow, full geometry.
    #[default]
    Full = 0,
    /// No labels, simplified geometry.
    Reduced = 1,
    /// A few-sided blob.
    Minimal = 2,
    /// Not rendered.
    Hidden = 3,
}

impl LodLevel {
    pub const ALL: [LodLevel; 4] = [
        LodLevel::Full,
        LodLevel::Reduced,
        LodLevel::Minimal,
        LodLevel::Hidden,
    ];

    /// Out-of-range values clamp to the nearest level.
    pub fn from_index(index: i64) -> Self {
        match index {
            i64::MIN..=0 => Self::Full,
            1 => Self::Reduced,
            2 => Self::Minimal,
            _ => Self::Hidden,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_rendered(self) -> bool {
        self != Self::Hidden
    }

    /// Edge level from its endpoints. An off-screen endpoint defers to the
    /// other one; with both off-screen the edge is drawn minimally.
    pub fn for_edge(source: Option<Self>, target: Option<Self>) -> Self {
        match (source, target) {
            (Some(a), Some(b)) => a.max(b),
            (Some(level), None) | (None, Some(level)) => level,
            (None, None) => Self::Minimal,
        }
    }
}

/// Effective on-screen radius, in pixels, at which each level starts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodThresholds {
    pub full_px: f32,
    pub reduced_px: f32,
    pub minimal_px: f32,
    /// How strongly distance from the viewport centre shrinks the effective
    /// size. Zero disables the falloff.
    pub distance_falloff: f32,
}

impl Default for LodThresholds {
    fn default() -> Self {
        Self {
            full_px: 10.0,
            reduced_px: 4.0,
            minimal_px: 0.75,
            distance_falloff: 0.35,
        }
    }
}

impl LodThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("lod.full_px", self.full_px),
            ("lod.reduced_px", self.reduced_px),
            ("lod.minimal_px", self.minimal_px),
            ("lod.distance_falloff", self.distance_falloff),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite {
                    field,
                    value: value.into(),
                });
            }
        }
        if self.distance_falloff < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "lod.distance_falloff",
                value: self.distance_falloff.into(),
                min: 0.0,
                max: f64::MAX,
            });
        }
        if !(self.full_px >= self.reduced_px
            && self.reduced_px >= self.minimal_px
            && self.minimal_px >= 0.0)
        {
            return Err(ConfigError::UnorderedLodThresholds);
        }
        Ok(())
    }

    pub fn level_for(&self, effective_px: f32) -> LodLevel {
        if effective_px >= self.full_px {
            LodLevel::Full
        } else if effective_px >= self.reduced_px {
            LodLevel::Reduced
        } else if effective_px >= self.minimal_px {
            LodLevel::Minimal
        } else {
            LodLevel::Hidden
        }
    }
}

/// Per-node levels for the current frame, indexed by arena index.
/// Off-screen nodes have no entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LodMap {
    levels: Vec<Option<LodLevel>>,
}

impl LodMap {
    pub fn get(&self, index: usize) -> Option<LodLevel> {
        self.levels.get(index).copied().flatten()
    }

    pub fn edge(&self, source: usize, target: usize) -> LodLevel {
        LodLevel::for_edge(self.get(source), self.get(target))
    }

    /// Visible node count per level.
    pub fn histogram(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for level in self.levels.iter().flatten() {
            counts[level.index()] += 1;
        }
        counts
    }
}

#[derive(Debug, Default)]
pub struct LodManager {
    thresholds: LodThresholds,
    map: LodMap,
}

impl LodManager {
    pub fn new(thresholds: LodThresholds) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            map: LodMap::default(),
        })
    }

    pub fn thresholds(&self) -> LodThresholds {
        self.thresholds
    }

    pub fn map(&self) -> &LodMap {
        &self.map
    }

    /// Effective on-screen radius of a node: projected radius shrunk by the
    /// normalized screen distance from the viewport centre. For a fixed node
    /// this grows with zoom, so levels never get coarser when zooming in.
    pub fn effective_radius(&self, viewport: &Viewport, node: &GraphNode) -> f32 {
        let projected = node.radius.max(0.0) * viewport.zoom;
        let half_diagonal = (viewport.screen_size() * 0.5).length().max(1.0);
        let screen_distance = (node.position - viewport.center()).length() * viewport.zoom;
        projected / (1.0 + self.thresholds.distance_falloff * screen_distance / half_diagonal)
    }

    pub fn level_for(&self, viewport: &Viewport, node: &GraphNode) -> LodLevel {
        if node.flags.is_emphasized() {
            return LodLevel::Full;
        }
        self.thresholds
            .level_for(self.effective_radius(viewport, node))
    }

    /// Recomputes every visible node in one pass and writes the level back to
    /// the node. Nodes outside `visible` lose their entry.
    pub fn compute(
        &mut self,
        viewport: &Viewport,
        visible: &[usize],
        nodes: &mut [GraphNode],
    ) -> &LodMap {
        self.map.levels.clear();
        self.map.levels.resize(nodes.len(), None);
        for &index in visible {
            let Some(node) = nodes.get_mut(index) else {
                continue;
            };
            let level = self.level_for(viewport, node);
            node.lod = level;
            self.map.levels[index] = Some(level);
        }
        &self.map
    }
}
