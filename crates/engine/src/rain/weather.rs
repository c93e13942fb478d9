//! What the rain worker needs to know about the sky and the clock.

use crate::world::position::BlockPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrecipKind {
    #[default]
    None,
    Rain,
    /// Snow, hail, anything that is not rain.
    Other,
}

/// Precipitation at a point. `intensity` is on a 0..=100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Precipitation {
    pub intensity: f32,
    pub kind: PrecipKind,
}

impl Precipitation {
    pub const NONE: Precipitation = Precipitation {
        intensity: 0.0,
        kind: PrecipKind::None,
    };

    pub fn rain(intensity: f32) -> Self {
        Self {
            intensity,
            kind: PrecipKind::Rain,
        }
    }

    pub fn is_raining(&self) -> bool {
        self.intensity > 0.0 && self.kind == PrecipKind::Rain
    }
}

pub trait PrecipitationSource: Send + Sync {
    /// Precipitation at `pos`, which lies in weather region `region`.
    fn precipitation_at(&self, pos: BlockPos, region: (i32, i32)) -> Precipitation;
}

/// In-world calendar.
pub trait Calendar: Send + Sync {
    fn total_hours(&self) -> f64;
}
