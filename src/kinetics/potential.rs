//! Potential-energy strategies and the initial wavepacket.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// External potential `V(x1, x2)`. The stepper only needs the gradient along
/// the position axis; `value` is available for diagnostics.
pub trait Potential: Send + Sync {
    fn name(&self) -> &'static str;
    fn value(&self, x1: f64, x2: f64) -> f64;
    fn gradient(&self, x1: f64, x2: f64) -> f64;
}

/// Quartic double well `0.007x⁴ − 0.01x²`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DoubleWell;

impl Potential for DoubleWell {
    fn name(&self) -> &'static str {
        "double-well"
    }

    fn value(&self, x1: f64, _x2: f64) -> f64 {
        let sq = x1 * x1;
        0.007 * sq * sq - 0.01 * sq
    }

    fn gradient(&self, x1: f64, _x2: f64) -> f64 {
        0.028 * x1 * x1 * x1 - 0.02 * x1
    }
}

/// No external force.
#[derive(Clone, Copy, Debug, Default)]
pub struct Free;

impl Potential for Free {
    fn name(&self) -> &'static str {
        "free"
    }

    fn value(&self, _x1: f64, _x2: f64) -> f64 {
        0.0
    }

    fn gradient(&self, _x1: f64, _x2: f64) -> f64 {
        0.0
    }
}

/// Cubic well that flattens into a plateau past `x = 1.12556`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetastableWell;

impl MetastableWell {
    const PLATEAU_X: f64 = 1.12556;
    const PLATEAU_V: f64 = -0.015;
}

impl Potential for MetastableWell {
    fn name(&self) -> &'static str {
        "metastable-well"
    }

    fn value(&self, x1: f64, _x2: f64) -> f64 {
        if x1 > Self::PLATEAU_X {
            Self::PLATEAU_V
        } else {
            x1 * x1 * (0.1 - 0.09936666666667 * x1)
        }
    }

    fn gradient(&self, x1: f64, _x2: f64) -> f64 {
        if x1 > Self::PLATEAU_X {
            0.0
        } else {
            x1 * (0.2 - 0.2981 * x1)
        }
    }
}

/// Built-in potential selected from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PotentialKind {
    DoubleWell,
    #[default]
    Free,
    MetastableWell,
}

impl PotentialKind {
    pub fn build(self) -> Box<dyn Potential> {
        match self {
            Self::DoubleWell => Box::new(DoubleWell),
            Self::Free => Box::new(Free),
            Self::MetastableWell => Box::new(MetastableWell),
        }
    }
}

/// Separable Gaussian wavepacket centred at `center` with inverse widths
/// `width` (position) and momentum spread `hbar²·width[1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianPacket {
    pub center: [f64; 2],
    pub width: [f64; 2],
    pub hbar: f64,
}

impl GaussianPacket {
    pub fn value(&self, x1: f64, x2: f64) -> f64 {
        let d1 = x1 - self.center[0];
        let d2 = x2 - self.center[1];
        let spread = 2.0 * self.hbar * self.hbar * self.width[1];
        (1.0 / (PI * self.hbar)) * (-2.0 * self.width[0] * d1 * d1).exp() * (-d2 * d2 / spread).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_gradient_matches(p: &dyn Potential, xs: &[f64]) {
        let h = 1e-6;
        for &x in xs {
            let numeric = (p.value(x + h, 0.0) - p.value(x - h, 0.0)) / (2.0 * h);
            let analytic = p.gradient(x, 0.0);
            assert!(
                (numeric - analytic).abs() < 1e-6,
                "{} at {x}: {numeric} vs {analytic}",
                p.name()
            );
        }
    }

    #[test]
    fn double_well_gradient_is_derivative() {
        assert_gradient_matches(&DoubleWell, &[-3.0, -0.5, 0.0, 0.7, 2.5]);
        assert!(DoubleWell.value(0.845, 0.0) < 0.0);
    }

    #[test]
    fn metastable_well_plateaus() {
        assert_gradient_matches(&MetastableWell, &[-1.0, 0.0, 0.5, 1.0]);
        assert_eq!(MetastableWell.value(2.0, 0.0), -0.015);
        assert_eq!(MetastableWell.gradient(2.0, 0.0), 0.0);
    }

    #[test]
    fn kinds_build_matching_strategies() {
        assert_eq!(PotentialKind::DoubleWell.build().name(), "double-well");
        assert_eq!(PotentialKind::Free.build().gradient(3.0, 1.0), 0.0);
        assert_eq!(PotentialKind::MetastableWell.build().name(), "metastable-well");
        let parsed: PotentialKind = serde_json::from_str("\"metastable_well\"").unwrap();
        assert_eq!(parsed, PotentialKind::MetastableWell);
    }

    #[test]
    fn packet_peaks_at_centre() {
        let packet = GaussianPacket {
            center: [-1.0, 0.5],
            width: [0.5, 1.0],
            hbar: 1.0,
        };
        let peak = packet.value(-1.0, 0.5);
        assert!((peak - 1.0 / PI).abs() < 1e-15);
        assert!(packet.value(0.0, 0.5) < peak);
        assert!(packet.value(-1.0, 1.5) < peak);
    }
}
