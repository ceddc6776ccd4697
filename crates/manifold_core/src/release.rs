//! Pitch and volume to release-point conversion, mirroring how the game
//! engine maps a voice onto a throw.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::manifold::source::TrialRecord;
use crate::settings::Settings;
use crate::traits::TrialStore;

/// Release angle for `pitch`, relative to the pitch the trial started at.
///
/// The pitch offset (in semitones when `UseSemitones` is set) is taken as a
/// fraction of its span, clamped to `[-1, 1]`, and mapped around the centre
/// of the angle range.
pub fn release_angle(pitch: f64, starting_pitch: f64, settings: &Settings) -> Result<f64> {
    let fraction = if settings.flag("UseSemitones")? {
        if !(pitch > 0.0 && starting_pitch > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "semitone mapping needs positive pitches, got {pitch} from {starting_pitch}"
            )));
        }
        12.0 * (pitch / starting_pitch).log2() / settings.number("SemitoneSpan")?
    } else {
        (pitch - starting_pitch) / settings.number("PitchSpan")?
    };
    angle_from_fraction(fraction, settings)
}

fn angle_from_fraction(fraction: f64, settings: &Settings) -> Result<f64> {
    let fraction = fraction.clamp(-1.0, 1.0);
    let min = settings.number("AngleMinimum")?;
    let max = settings.number("AngleMaximum")?;
    Ok(fraction * (max - min) + (max + min) / 2.0)
}

/// Release stretch for `volume`; the fraction of `VolumeSpan` is clamped to
/// `[0, 1]`.
pub fn release_stretch(volume: f64, starting_volume: f64, settings: &Settings) -> Result<f64> {
    let fraction = ((volume - starting_volume) / settings.number("VolumeSpan")?).clamp(0.0, 1.0);
    let min = settings.number("StretchMinimum")?;
    let max = settings.number("StretchMaximum")?;
    Ok(fraction * (max - min) + min)
}

/// One sample of a continuous voice trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    pub tick: f64,
    pub frequency: f64,
    pub decibels: f64,
    pub closest_approach: f64,
}

/// Release points for every sample, measured from `PitchMinimum` and
/// `VolumeMinimum`. Semitone pitch mapping is not supported for traces.
pub fn trace_release_points(samples: &[TraceSample], settings: &Settings) -> Result<Vec<Point>> {
    if settings.flag("UseSemitones")? {
        return Err(Error::InvalidSettings(
            "continuous traces cannot use semitone pitch mapping".into(),
        ));
    }
    let pitch_floor = settings.number("PitchMinimum")?;
    let volume_floor = settings.number("VolumeMinimum")?;
    samples
        .iter()
        .map(|sample| {
            Ok(Point::new(
                release_angle(sample.frequency, pitch_floor, settings)?,
                release_stretch(sample.decibels, volume_floor, settings)?,
            ))
        })
        .collect()
}

/// A recorded continuous trace, presented as one trial per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousTrace {
    pub settings: Settings,
    pub trace: Vec<TraceSample>,
}

impl ContinuousTrace {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

impl TrialStore for ContinuousTrace {
    fn data_list(&self) -> Result<Vec<TrialRecord>> {
        Ok(trace_release_points(&self.trace, &self.settings)?
            .into_iter()
            .map(|p| TrialRecord::new(p.x, p.y, self.settings.clone()))
            .collect())
    }
}
