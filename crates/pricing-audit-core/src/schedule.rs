//! Pricing schedules and their validation against the reference schedule.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fraction every slot of a correct schedule must carry.
pub const EXPECTED_FRACTION: f64 = 0.5;

/// Offsets (hours) of the canonical schedule.
pub const REFERENCE_OFFSETS: [u32; 5] = [0, 4, 8, 16, 20];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub t: u32,
    pub f: f64,
}

/// Ordered `(offset, fraction)` pairs, serialized as the station stores them:
/// `[{"t":0,"f":0.5},...]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Schedule(pub Vec<ScheduleEntry>);

impl Schedule {
    pub fn reference() -> Self {
        Schedule(
            REFERENCE_OFFSETS
                .iter()
                .map(|&t| ScheduleEntry {
                    t,
                    f: EXPECTED_FRACTION,
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn sorted_offsets(&self) -> Vec<u32> {
        let mut offsets: Vec<u32> = self.0.iter().map(|e| e.t).collect();
        offsets.sort_unstable();
        offsets
    }

    fn fraction_at(&self, offset: u32) -> Option<f64> {
        self.0.iter().find(|e| e.t == offset).map(|e| e.f)
    }

    /// The compact JSON form sent to `change_configuration`.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("N/A");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("t={}:f={}", e.t, e.f))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Mismatch {
    pub offset: u32,
    pub actual: f64,
    pub expected: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    Correct,
    Incorrect { mismatches: Vec<Mismatch> },
    Unknown { reason: String },
}

impl Classification {
    pub fn unknown(reason: impl Into<String>) -> Self {
        Classification::Unknown {
            reason: reason.into(),
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Classification::Correct)
    }

    pub fn is_incorrect(&self) -> bool {
        matches!(self, Classification::Incorrect { .. })
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            Classification::Incorrect { mismatches } => mismatches,
            _ => &[],
        }
    }
}

/// Classifies a schedule read from a station.
///
/// Fractions are compared exactly: the reference values are decimal constants
/// the station is expected to store verbatim. A differing offset set is
/// reported as unknown rather than incorrect.
pub fn classify(schedule: &Schedule, reference: &Schedule) -> Classification {
    if schedule.is_empty() {
        return Classification::unknown("schedule is empty");
    }
    if schedule.sorted_offsets() != reference.sorted_offsets() {
        return Classification::unknown(format!(
            "offsets {:?} differ from reference offsets {:?}",
            schedule.sorted_offsets(),
            reference.sorted_offsets()
        ));
    }

    let mismatches: Vec<Mismatch> = schedule
        .0
        .iter()
        .filter_map(|entry| {
            let expected = reference.fraction_at(entry.t)?;
            (entry.f != expected).then_some(Mismatch {
                offset: entry.t,
                actual: entry.f,
                expected,
            })
        })
        .collect();

    if mismatches.is_empty() {
        Classification::Correct
    } else {
        Classification::Incorrect { mismatches }
    }
}

/// Classification for a station whose schedule could not be read, or whose
/// schedule feature could not be confirmed enabled.
pub fn classify_read(
    read: Option<&Schedule>,
    enabled: bool,
    reference: &Schedule,
) -> Classification {
    if !enabled {
        return Classification::unknown("PricingScheduleEnable could not be confirmed");
    }
    match read {
        Some(schedule) => classify(schedule, reference),
        None => Classification::unknown("PricingSchedule could not be read"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(pairs: &[(u32, f64)]) -> Schedule {
        Schedule(pairs.iter().map(|&(t, f)| ScheduleEntry { t, f }).collect())
    }

    #[test]
    fn reference_schedule_is_correct() {
        let reference = Schedule::reference();
        assert_eq!(classify(&reference, &reference), Classification::Correct);
    }

    #[test]
    fn single_off_value_is_reported() {
        let reference = Schedule::reference();
        let s = schedule(&[(0, 0.3), (4, 0.5), (8, 0.5), (16, 0.5), (20, 0.5)]);
        let result = classify(&s, &reference);
        assert_eq!(
            result.mismatches(),
            &[Mismatch {
                offset: 0,
                actual: 0.3,
                expected: 0.5
            }]
        );
    }

    #[test]
    fn all_mismatches_are_listed_in_schedule_order() {
        let reference = Schedule::reference();
        let s = schedule(&[(20, 0.0), (0, 0.5), (4, 1.0), (8, 0.5), (16, 0.5)]);
        let offsets: Vec<u32> = classify(&s, &reference)
            .mismatches()
            .iter()
            .map(|m| m.offset)
            .collect();
        assert_eq!(offsets, vec![20, 4]);
    }

    #[test]
    fn order_of_entries_does_not_matter() {
        let reference = Schedule::reference();
        let s = schedule(&[(20, 0.5), (16, 0.5), (8, 0.5), (4, 0.5), (0, 0.5)]);
        assert!(classify(&s, &reference).is_correct());
    }

    #[test]
    fn near_values_are_not_tolerated() {
        let reference = Schedule::reference();
        let s = schedule(&[(0, 0.5000001), (4, 0.5), (8, 0.5), (16, 0.5), (20, 0.5)]);
        assert!(classify(&s, &reference).is_incorrect());
    }

    #[test]
    fn differing_offsets_are_unknown() {
        let reference = Schedule::reference();
        let missing = schedule(&[(0, 0.5), (4, 0.5), (8, 0.5), (16, 0.5)]);
        let extra = schedule(&[(0, 0.3), (4, 0.5), (8, 0.5), (12, 0.5), (16, 0.5), (20, 0.5)]);
        assert!(matches!(
            classify(&missing, &reference),
            Classification::Unknown { .. }
        ));
        assert!(matches!(
            classify(&extra, &reference),
            Classification::Unknown { .. }
        ));
    }

    #[test]
    fn unreadable_or_disabled_is_unknown() {
        let reference = Schedule::reference();
        assert!(matches!(
            classify_read(None, true, &reference),
            Classification::Unknown { .. }
        ));
        assert!(matches!(
            classify_read(Some(&reference), false, &reference),
            Classification::Unknown { .. }
        ));
        assert!(matches!(
            classify(&Schedule::default(), &reference),
            Classification::Unknown { .. }
        ));
    }

    #[test]
    fn wire_form_matches_station_format() {
        let parsed: Schedule =
            serde_json::from_str(r#"[{"t":0,"f":0.5},{"t":4,"f":0.25}]"#).unwrap();
        assert_eq!(parsed, schedule(&[(0, 0.5), (4, 0.25)]));
        assert_eq!(parsed.to_wire(), r#"[{"t":0,"f":0.5},{"t":4,"f":0.25}]"#);
        assert_eq!(parsed.to_string(), "t=0:f=0.5, t=4:f=0.25");
    }
}
