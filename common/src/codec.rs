//! On-store encodings for the PWM scalar, the autopilot flag and the
//! breakpoint table.
//!
//! Scalars are exactly one raw byte. Anything longer is rejected rather than
//! letting the last byte win.

use tracing::warn;

use crate::{
    autopilot::{AutopilotTable, Breakpoint},
    error::CodecError,
};

pub const TABLE_HEADER: &str = "temperature,strength";

pub fn encode_scalar(value: u8) -> Vec<u8> {
    vec![value]
}

pub fn decode_scalar(bytes: &[u8], max: u8) -> Result<u8, CodecError> {
    match bytes {
        [] => Err(CodecError::Empty),
        [value] if *value <= max => Ok(*value),
        [value] => Err(CodecError::OutOfRange(*value)),
        _ => Err(CodecError::TrailingBytes(bytes.len())),
    }
}

pub fn encode_flag(enabled: bool) -> Vec<u8> {
    encode_scalar(u8::from(enabled))
}

pub fn decode_flag(bytes: &[u8]) -> Result<bool, CodecError> {
    decode_scalar(bytes, 1).map(|value| value == 1)
}

pub fn encode_table(table: &AutopilotTable) -> String {
    let mut out = String::with_capacity(32 + table.len() * 10);
    out.push_str(TABLE_HEADER);
    out.push('\n');
    for entry in table.entries() {
        out.push_str(&format!("{},{} \n", entry.threshold_c, entry.duty_percent));
    }
    out
}

/// Restores rows into `table`, row `i` (after the header) landing in slot
/// `i - 1`. Malformed or out-of-range rows leave their slot as it was.
/// Returns the number of slots written.
pub fn decode_table(text: &str, table: &mut AutopilotTable) -> usize {
    let mut lines = text.lines();
    match lines.next() {
        Some(header) if header.trim() == TABLE_HEADER => {}
        Some(header) => warn!("unexpected autopilot table header `{header}`"),
        None => return 0,
    }

    let mut restored = 0;
    for (index, line) in lines.enumerate() {
        let Some(entry) = parse_row(line) else {
            if !line.trim().is_empty() {
                warn!("skipping malformed autopilot row {}: `{line}`", index + 1);
            }
            continue;
        };
        if entry.validate().is_err() {
            warn!("skipping out-of-range autopilot row {}: `{line}`", index + 1);
            continue;
        }
        if !table.set_slot(index, entry) {
            warn!("autopilot table holds no slot for row {}", index + 1);
            break;
        }
        restored += 1;
    }
    restored
}

fn parse_row(line: &str) -> Option<Breakpoint> {
    let (threshold, duty) = line.split_once(',')?;
    let threshold = threshold.trim().parse::<i32>().ok()?;
    let duty = duty.trim().parse::<i32>().ok()?;
    Some(Breakpoint::new(threshold, duty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_survives_encode_and_decode() {
        let table = AutopilotTable::from_entries(&[
            Breakpoint::new(30, 50),
            Breakpoint::new(40, 100),
        ])
        .unwrap();

        let text = encode_table(&table);
        assert_eq!(text, "temperature,strength\n30,50 \n40,100 \n");

        let mut restored = AutopilotTable::default();
        assert_eq!(decode_table(&text, &mut restored), 2);
        assert_eq!(restored, table);
    }

    #[test]
    fn malformed_rows_keep_previous_slot_values() {
        let mut table =
            AutopilotTable::from_entries(&[Breakpoint::new(10, 5), Breakpoint::new(20, 15)])
                .unwrap();

        let restored = decode_table("temperature,strength\n25\n35,60 \n", &mut table);

        assert_eq!(restored, 1);
        assert_eq!(table.slot(0), Some(&Breakpoint::new(10, 5)));
        assert_eq!(table.slot(1), Some(&Breakpoint::new(35, 60)));
    }

    #[test]
    fn out_of_range_rows_are_skipped() {
        let mut table = AutopilotTable::default();
        let restored = decode_table("temperature,strength\n30,150 \n40,80 \n", &mut table);

        assert_eq!(restored, 1);
        assert_eq!(table.slot(0), None);
        assert_eq!(table.slot(1), Some(&Breakpoint::new(40, 80)));
    }

    #[test]
    fn empty_text_restores_nothing() {
        let mut table = AutopilotTable::default();
        assert_eq!(decode_table("", &mut table), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn scalar_is_a_single_byte() {
        assert_eq!(encode_scalar(75), vec![75]);
        assert_eq!(decode_scalar(&[75], 100), Ok(75));
        assert_eq!(decode_scalar(&[], 100), Err(CodecError::Empty));
        assert_eq!(decode_scalar(&[10, 75], 100), Err(CodecError::TrailingBytes(2)));
        assert_eq!(decode_scalar(&[101], 100), Err(CodecError::OutOfRange(101)));
    }

    #[test]
    fn flag_accepts_only_zero_or_one() {
        assert_eq!(decode_flag(&encode_flag(true)), Ok(true));
        assert_eq!(decode_flag(&encode_flag(false)), Ok(false));
        assert_eq!(decode_flag(&[2]), Err(CodecError::OutOfRange(2)));
    }
}
