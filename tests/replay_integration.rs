//! CSV replay through the run pipeline.

use nilm_engine::config::EngineConfig;
use nilm_engine::io::export::write_csv;
use nilm_engine::io::replay::read_rows;
use nilm_engine::runner::run_replay;

const METER_CSV: &str = "\
timestamp,watts,device
2024-05-01T10:00:00+02:00,3.0,
2024-05-01T10:00:30+02:00,60.0,refrigerator
2024-05-01T10:01:00+02:00,62.5,refrigerator
not-a-time,70.0,refrigerator
2024-05-01T10:01:30+02:00,unavailable,
2024-05-01T10:02:00+02:00,2100.0,oven
2024-05-01T10:02:30+02:00,2.0,
";

fn essentials() -> EngineConfig {
    EngineConfig::essentials()
}

#[test]
fn replay_scores_labeled_rows_and_skips_bad_input() {
    let rows = read_rows(METER_CSV.as_bytes()).unwrap();
    assert_eq!(rows.len(), 6);

    let outcome = run_replay(&essentials(), &rows).unwrap();
    let stats = outcome.report.stats;
    assert_eq!(stats.samples_processed, 5);
    assert_eq!(stats.samples_rejected, 1);
    assert_eq!(outcome.aggregate.len(), 5);
    assert_eq!(outcome.report.accuracy_pct, Some(100.0));

    let fridge = outcome.report.device("refrigerator").unwrap();
    assert_eq!(fridge.activations, 1);
    // ON from the 10:00:30 reading through 10:01:00, accruing on both
    assert!((fridge.cumulative_runtime_seconds - 60.0).abs() < 1e-9);

    let oven = outcome.latest.iter().find(|s| s.device_name == "oven").unwrap();
    assert!(!oven.is_on);
    assert_eq!(oven.last_update.offset().local_minus_utc(), 2 * 3600);

    // five accepted readings, five trackers each
    assert_eq!(outcome.history.len(), 25);
}

#[test]
fn unlabeled_replay_has_no_accuracy() {
    let csv = "timestamp,watts\n2024-05-01T10:00:00Z,60.0\n2024-05-01T10:00:30Z,61.0\n";
    let rows = read_rows(csv.as_bytes()).unwrap();
    let outcome = run_replay(&essentials(), &rows).unwrap();
    assert_eq!(outcome.report.accuracy_pct, None);
    assert_eq!(outcome.report.stats.attributed(), 2);
}

#[test]
fn replayed_history_exports_one_row_per_snapshot() {
    let rows = read_rows(METER_CSV.as_bytes()).unwrap();
    let outcome = run_replay(&essentials(), &rows).unwrap();

    let mut buf = Vec::new();
    write_csv(&outcome.history, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 1 + outcome.history.len());
    assert!(text.lines().nth(1).unwrap().contains("refrigerator"));
}
