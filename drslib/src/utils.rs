//! Various utility functions.

use crate::types::{PHASE_COUNT, PHASE_NAMES};

/// Parses a phase-set label like `"ABC"` or `"AC"` into per-phase flags.
/// Case-insensitive; rejects unknown or repeated phase letters and empty
/// sets.
pub fn parse_phases(label: &str) -> Result<[bool; PHASE_COUNT], String> {
    let mut phases = [false; PHASE_COUNT];
    for c in label.chars() {
        let index = PHASE_NAMES
            .iter()
            .position(|&p| p == c.to_ascii_uppercase())
            .ok_or_else(|| format!("Unknown phase '{}' in \"{}\"", c, label))?;
        if phases[index] {
            return Err(format!("Phase '{}' repeated in \"{}\"", c, label));
        }
        phases[index] = true;
    }
    if phases.iter().all(|&p| !p) {
        return Err(format!("Empty phase set \"{}\"", label));
    }
    Ok(phases)
}

/// Formats per-phase flags back into a label like `"ABC"`.
pub fn format_phases(phases: &[bool; PHASE_COUNT]) -> String {
    phases
        .iter()
        .zip(PHASE_NAMES.iter())
        .filter_map(|(&present, &name)| if present { Some(name) } else { None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_phases_accepts_subsets() {
        assert_eq!(parse_phases("ABC").unwrap(), [true, true, true]);
        assert_eq!(parse_phases("AC").unwrap(), [true, false, true]);
        assert_eq!(parse_phases("b").unwrap(), [false, true, false]);
    }

    #[test]
    fn parse_phases_rejects_garbage() {
        assert!(parse_phases("").is_err());
        assert!(parse_phases("AD").is_err());
        assert!(parse_phases("AA").is_err());
    }

    #[test]
    fn format_round_trips() {
        for label in ["A", "B", "C", "AB", "AC", "BC", "ABC"] {
            assert_eq!(format_phases(&parse_phases(label).unwrap()), label);
        }
    }
}
