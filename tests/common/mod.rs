//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone};

use nilm_engine::devices::{DeviceSignature, SignatureCatalog};
use nilm_engine::nilm::{DisaggregationEngine, EngineSettings, PowerSample, VecSink};

/// UTC timestamp on 2024-05-`day` at `h:m:s`.
pub fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 5, day, h, m, s)
        .unwrap()
}

/// Sample at `sec` seconds past 2024-05-01 10:00:00 UTC.
pub fn sample(sec: u32, watts: f64) -> PowerSample {
    PowerSample::new(at(1, 10, sec / 60, sec % 60), watts)
}

/// Single refrigerator signature, 40–100 W.
pub fn fridge_catalog() -> SignatureCatalog {
    SignatureCatalog::new(vec![DeviceSignature::new("refrigerator", 40.0, 100.0, 30)]).unwrap()
}

/// Three appliances with widely separated ranges.
pub fn disjoint_catalog() -> SignatureCatalog {
    SignatureCatalog::new(vec![
        DeviceSignature::new("refrigerator", 40.0, 100.0, 30),
        DeviceSignature::new("washing_machine", 300.0, 500.0, 45),
        DeviceSignature::new("oven", 1500.0, 2500.0, 0),
    ])
    .unwrap()
}

/// Engine with default settings recording every snapshot.
pub fn recording_engine(catalog: SignatureCatalog) -> DisaggregationEngine<VecSink> {
    DisaggregationEngine::new(catalog, EngineSettings::default(), VecSink::new()).unwrap()
}
