//! Meter - time signatures, pulse subdivisions and tempo mapping
//!
//! Users pick a time signature and the note value that should click. The
//! scheduler only knows "beats per bar" and "BPM", so a [`MeterSetting`]
//! translates between the two views:
//! - the displayed tempo always counts quarter notes (simple meters) or dotted
//!   quarters (compound meters, `x/8`)
//! - the scheduler tempo counts clicks, i.e. the chosen subdivision
//! - the visual beat collapses subdivisions back onto the displayed pulse

use std::fmt;
use std::str::FromStr;

use crate::error::MeterError;

/// Lowest tempo offered by the tempo controls
pub const MIN_DISPLAY_TEMPO: f64 = 30.0;
/// Highest tempo offered by the tempo controls
pub const MAX_DISPLAY_TEMPO: f64 = 300.0;

/// Note value that produces a click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteValue {
    Quarter,
    Eighth,
    Sixteenth,
    DottedQuarter,
}

impl NoteValue {
    pub fn label(self) -> &'static str {
        match self {
            NoteValue::Quarter => "Quarter Note",
            NoteValue::Eighth => "Eighth Note",
            NoteValue::Sixteenth => "Sixteenth Note",
            NoteValue::DottedQuarter => "Dotted Quarter Note",
        }
    }

    fn is_display_pulse(self) -> bool {
        matches!(self, NoteValue::Quarter | NoteValue::DottedQuarter)
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NoteValue {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quarter" | "4th" | "4" => Ok(NoteValue::Quarter),
            "eighth" | "8th" | "8" => Ok(NoteValue::Eighth),
            "sixteenth" | "16th" | "16" => Ok(NoteValue::Sixteenth),
            "dotted-quarter" | "dotted quarter" | "dotted 4th" => Ok(NoteValue::DottedQuarter),
            _ => Err(MeterError::UnknownNoteValue {
                input: s.to_string(),
            }),
        }
    }
}

/// One selectable click subdivision of a time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseOption {
    pub note: NoteValue,
    pub beats_per_bar: u32,
}

/// Supported time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    beats: u32,
    unit: u32,
}

impl TimeSignature {
    pub const ALL: [TimeSignature; 10] = [
        TimeSignature { beats: 2, unit: 4 },
        TimeSignature { beats: 3, unit: 4 },
        TimeSignature { beats: 4, unit: 4 },
        TimeSignature { beats: 5, unit: 4 },
        TimeSignature { beats: 6, unit: 4 },
        TimeSignature { beats: 7, unit: 4 },
        TimeSignature { beats: 3, unit: 8 },
        TimeSignature { beats: 6, unit: 8 },
        TimeSignature { beats: 9, unit: 8 },
        TimeSignature { beats: 12, unit: 8 },
    ];

    pub fn new(beats: u32, unit: u32) -> Result<Self, MeterError> {
        let signature = TimeSignature { beats, unit };
        if Self::ALL.contains(&signature) {
            Ok(signature)
        } else {
            Err(MeterError::UnknownSignature {
                input: format!("{}/{}", beats, unit),
            })
        }
    }

    pub fn beats(self) -> u32 {
        self.beats
    }

    pub fn unit(self) -> u32 {
        self.unit
    }

    /// Eighth-note meters group their pulse in dotted quarters
    pub fn is_compound(self) -> bool {
        self.unit == 8
    }

    /// Click subdivisions available for this signature, display pulse first
    pub fn pulse_options(self) -> [PulseOption; 3] {
        let n = self.beats;
        if self.is_compound() {
            [
                PulseOption {
                    note: NoteValue::DottedQuarter,
                    beats_per_bar: n / 3,
                },
                PulseOption {
                    note: NoteValue::Eighth,
                    beats_per_bar: n,
                },
                PulseOption {
                    note: NoteValue::Sixteenth,
                    beats_per_bar: n * 2,
                },
            ]
        } else {
            [
                PulseOption {
                    note: NoteValue::Quarter,
                    beats_per_bar: n,
                },
                PulseOption {
                    note: NoteValue::Eighth,
                    beats_per_bar: n * 2,
                },
                PulseOption {
                    note: NoteValue::Sixteenth,
                    beats_per_bar: n * 4,
                },
            ]
        }
    }

    /// Clicks per displayed beat for `note`
    pub fn tempo_multiplier(self, note: NoteValue) -> f64 {
        match (self.is_compound(), note) {
            (_, NoteValue::Quarter | NoteValue::DottedQuarter) => 1.0,
            (false, NoteValue::Eighth) => 2.0,
            (false, NoteValue::Sixteenth) => 4.0,
            (true, NoteValue::Eighth) => 3.0,
            (true, NoteValue::Sixteenth) => 6.0,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature { beats: 4, unit: 4 }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.unit)
    }
}

impl FromStr for TimeSignature {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || MeterError::UnknownSignature {
            input: s.to_string(),
        };
        let (beats, unit) = s.trim().split_once('/').ok_or_else(unknown)?;
        let beats = beats.trim().parse().map_err(|_| unknown())?;
        let unit = unit.trim().parse().map_err(|_| unknown())?;
        TimeSignature::new(beats, unit).map_err(|_| unknown())
    }
}

/// A time signature together with the chosen click subdivision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterSetting {
    signature: TimeSignature,
    pulse: PulseOption,
}

impl MeterSetting {
    /// Combine `signature` and `note`; an unavailable note falls back to the
    /// signature's first pulse option
    pub fn new(signature: TimeSignature, note: NoteValue) -> Self {
        let options = signature.pulse_options();
        let pulse = options
            .iter()
            .copied()
            .find(|option| option.note == note)
            .unwrap_or(options[0]);
        Self { signature, pulse }
    }

    pub fn signature(&self) -> TimeSignature {
        self.signature
    }

    pub fn note(&self) -> NoteValue {
        self.pulse.note
    }

    /// Clicks per bar, as configured on the scheduler
    pub fn beats_per_bar(&self) -> u32 {
        self.pulse.beats_per_bar
    }

    /// Dots shown per bar (quarter or dotted-quarter pulse)
    pub fn visual_beats(&self) -> u32 {
        self.signature
            .pulse_options()
            .iter()
            .find(|option| option.note.is_display_pulse())
            .map(|option| option.beats_per_bar)
            .unwrap_or(self.pulse.beats_per_bar)
    }

    /// Scheduler BPM for a displayed tempo
    pub fn scheduler_tempo(&self, display_bpm: f64) -> f64 {
        display_bpm * self.signature.tempo_multiplier(self.pulse.note)
    }

    /// Dot to highlight for a scheduler beat index
    pub fn display_beat(&self, beat_index: u32) -> u32 {
        let visual = self.visual_beats();
        let beats = self.beats_per_bar().max(1);
        if visual == 0 {
            return 0;
        }
        ((beat_index as u64 * visual as u64) / beats as u64) as u32 % visual
    }
}

impl Default for MeterSetting {
    fn default() -> Self {
        Self::new(TimeSignature::default(), NoteValue::Quarter)
    }
}

/// Keep a displayed tempo inside the range offered by the tempo controls
pub fn clamp_display_tempo(bpm: f64) -> f64 {
    bpm.clamp(MIN_DISPLAY_TEMPO, MAX_DISPLAY_TEMPO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(s: &str) -> TimeSignature {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display_signatures() {
        for signature in TimeSignature::ALL {
            let text = signature.to_string();
            assert_eq!(sig(&text), signature);
        }
        assert_eq!(sig(" 6/8 ").beats(), 6);
        assert!(matches!(
            "5/8".parse::<TimeSignature>(),
            Err(MeterError::UnknownSignature { .. })
        ));
        assert!("four/4".parse::<TimeSignature>().is_err());
        assert!("4".parse::<TimeSignature>().is_err());
    }

    #[test]
    fn test_parse_note_values() {
        assert_eq!("quarter".parse::<NoteValue>().unwrap(), NoteValue::Quarter);
        assert_eq!("8th".parse::<NoteValue>().unwrap(), NoteValue::Eighth);
        assert_eq!("Sixteenth".parse::<NoteValue>().unwrap(), NoteValue::Sixteenth);
        assert_eq!(
            "dotted-quarter".parse::<NoteValue>().unwrap(),
            NoteValue::DottedQuarter
        );
        assert!("half".parse::<NoteValue>().is_err());
    }

    #[test]
    fn test_simple_meter_pulse_options() {
        let options = sig("3/4").pulse_options();
        let beats: Vec<(NoteValue, u32)> =
            options.iter().map(|o| (o.note, o.beats_per_bar)).collect();
        assert_eq!(
            beats,
            vec![
                (NoteValue::Quarter, 3),
                (NoteValue::Eighth, 6),
                (NoteValue::Sixteenth, 12)
            ]
        );
    }

    #[test]
    fn test_compound_meter_pulse_options() {
        let options = sig("12/8").pulse_options();
        let beats: Vec<(NoteValue, u32)> =
            options.iter().map(|o| (o.note, o.beats_per_bar)).collect();
        assert_eq!(
            beats,
            vec![
                (NoteValue::DottedQuarter, 4),
                (NoteValue::Eighth, 12),
                (NoteValue::Sixteenth, 24)
            ]
        );
        assert_eq!(sig("3/8").pulse_options()[0].beats_per_bar, 1);
    }

    #[test]
    fn test_unavailable_note_falls_back_to_first_option() {
        let compound = MeterSetting::new(sig("6/8"), NoteValue::Quarter);
        assert_eq!(compound.note(), NoteValue::DottedQuarter);
        assert_eq!(compound.beats_per_bar(), 2);

        let simple = MeterSetting::new(sig("4/4"), NoteValue::DottedQuarter);
        assert_eq!(simple.note(), NoteValue::Quarter);
        assert_eq!(simple.beats_per_bar(), 4);
    }

    #[test]
    fn test_scheduler_tempo_multipliers() {
        let cases = [
            ("4/4", NoteValue::Quarter, 120.0),
            ("4/4", NoteValue::Eighth, 240.0),
            ("4/4", NoteValue::Sixteenth, 480.0),
            ("6/8", NoteValue::DottedQuarter, 120.0),
            ("6/8", NoteValue::Eighth, 360.0),
            ("6/8", NoteValue::Sixteenth, 720.0),
        ];
        for (signature, note, expected) in cases {
            let setting = MeterSetting::new(sig(signature), note);
            assert_eq!(
                setting.scheduler_tempo(120.0),
                expected,
                "{} {:?}",
                signature,
                note
            );
        }
    }

    #[test]
    fn test_display_beat_collapses_subdivisions() {
        let eighths = MeterSetting::new(sig("4/4"), NoteValue::Eighth);
        assert_eq!(eighths.visual_beats(), 4);
        let dots: Vec<u32> = (0..8).map(|i| eighths.display_beat(i)).collect();
        assert_eq!(dots, vec![0, 0, 1, 1, 2, 2, 3, 3]);

        let compound = MeterSetting::new(sig("9/8"), NoteValue::Eighth);
        assert_eq!(compound.visual_beats(), 3);
        let dots: Vec<u32> = (0..9).map(|i| compound.display_beat(i)).collect();
        assert_eq!(dots, vec![0, 0, 0, 1, 1, 1, 2, 2, 2]);

        let quarters = MeterSetting::default();
        assert_eq!(quarters.display_beat(3), 3);
    }

    #[test]
    fn test_clamp_display_tempo() {
        assert_eq!(clamp_display_tempo(10.0), MIN_DISPLAY_TEMPO);
        assert_eq!(clamp_display_tempo(120.0), 120.0);
        assert_eq!(clamp_display_tempo(999.0), MAX_DISPLAY_TEMPO);
    }
}
