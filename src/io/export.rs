//! CSV export for device snapshots.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::devices::DeviceSnapshot;

/// Column header for snapshot export.
const HEADER: &str = "last_update,device_name,is_on,current_power_watts,\
                      cumulative_runtime_seconds,daily_energy_kwh,confidence_percent";

/// Exports snapshots to a CSV file at the given path.
///
/// Writes a header row followed by one row per snapshot, in the order given.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(snapshots: &[DeviceSnapshot], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(snapshots, buf)
}

/// Writes snapshots as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(snapshots: &[DeviceSnapshot], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for s in snapshots {
        wtr.write_record(&[
            s.last_update.to_rfc3339(),
            s.device_name.clone(),
            s.is_on.to_string(),
            format!("{:.2}", s.current_power_watts),
            format!("{:.1}", s.cumulative_runtime_seconds),
            format!("{:.6}", s.daily_energy_kwh),
            format!("{:.1}", s.confidence_percent),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;

    fn make_snapshot(name: &str, sec: u32) -> DeviceSnapshot {
        DeviceSnapshot {
            device_name: name.to_string(),
            is_on: sec % 2 == 1,
            current_power_watts: 61.25,
            cumulative_runtime_seconds: f64::from(sec),
            daily_energy_kwh: 0.0125,
            confidence_percent: 93.4,
            last_update: FixedOffset::east_opt(7200)
                .unwrap()
                .with_ymd_and_hms(2024, 7, 1, 18, 0, sec)
                .unwrap(),
        }
    }

    #[test]
    fn header_matches_snapshot_fields() {
        let mut buf = Vec::new();
        write_csv(&[make_snapshot("tv", 0)], &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert_eq!(
            output.lines().next(),
            Some(
                "last_update,device_name,is_on,current_power_watts,\
                 cumulative_runtime_seconds,daily_energy_kwh,confidence_percent"
            )
        );
    }

    #[test]
    fn rows_keep_local_offset_and_parse_back() {
        let snaps: Vec<DeviceSnapshot> = (0..3).map(|s| make_snapshot("refrigerator", s)).collect();
        let mut buf = Vec::new();
        write_csv(&snaps, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let rows: Vec<csv::StringRecord> = rdr.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][0], "2024-07-01T18:00:01+02:00");
        assert_eq!(&rows[1][2], "true");
        assert_eq!(&rows[0][3], "61.25");
        for row in &rows {
            for i in 3..7 {
                assert!(row[i].parse::<f64>().is_ok(), "column {i} should be numeric");
            }
        }
    }

    #[test]
    fn deterministic_output() {
        let snaps: Vec<DeviceSnapshot> = (0..5).map(|s| make_snapshot("oven", s)).collect();
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_csv(&snaps, &mut a).unwrap();
        write_csv(&snaps, &mut b).unwrap();
        assert_eq!(a, b);
    }
}
