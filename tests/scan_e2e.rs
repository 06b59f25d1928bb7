//! End-to-end scan tests
//!
//! Runs the whole pipeline over synthetic channels: a damaged sinusoid must
//! come back repaired, clean signal must stay untouched, repeated scans must
//! agree, and the reviewer operations must hold up after a real scan.

use std::f64::consts::PI;
use std::sync::Mutex;

use clickmend::{Channel, NullReporter, ProcessingSettings, ScanReporter};

const AMPLITUDE: f64 = 1000.0;
/// Chosen so the damaged position sits near a crest, not a zero crossing.
const FREQUENCY: f64 = 7.25 / 600.0;
const SPIKE_POSITION: usize = 600;
const SPIKE_VALUE: f64 = 50_000.0;

/// Settings sized for short test channels.
fn test_settings() -> ProcessingSettings {
    ProcessingSettings {
        history_length_samples: 64,
        coefficients_number: 4,
        threshold_for_detection: 7.0,
        max_length_of_correction: 20,
        sample_rate: -1,
    }
}

fn sine(length: usize) -> Vec<f64> {
    (0..length)
        .map(|i| AMPLITUDE * (2.0 * PI * FREQUENCY * i as f64).sin())
        .collect()
}

fn damaged_sine(length: usize) -> Vec<f64> {
    let mut samples = sine(length);
    samples[SPIKE_POSITION] = SPIKE_VALUE;
    samples
}

fn scanned_channel() -> Channel {
    let mut channel = Channel::new(damaged_sine(1000), test_settings()).unwrap();
    channel.scan(&NullReporter).unwrap();
    channel
}

#[test]
fn spike_is_detected_and_repaired() {
    let channel = scanned_channel();

    assert!(channel.patch_count() >= 1);

    let covering = channel.patch_at(SPIKE_POSITION);
    assert!(covering.is_some(), "no patch covers the spike");

    let clean = AMPLITUDE * (2.0 * PI * FREQUENCY * SPIKE_POSITION as f64).sin();
    let repaired = channel.output_sample(SPIKE_POSITION).unwrap();

    assert!(
        (repaired - clean).abs() <= 0.05 * clean.abs(),
        "repaired {repaired} strays from clean {clean}"
    );
}

#[test]
fn repair_only_replaces_patched_positions() {
    let channel = scanned_channel();
    let input = damaged_sine(1000);

    for position in 0..channel.len_samples() {
        if channel.patch_at(position).is_none() {
            assert_eq!(channel.output_sample(position).unwrap(), input[position]);
        }
    }
}

#[test]
fn clean_signal_produces_no_patches() {
    let mut channel = Channel::new(sine(1000), test_settings()).unwrap();
    channel.scan(&NullReporter).unwrap();

    assert_eq!(channel.patch_count(), 0);
}

#[test]
fn rescan_yields_identical_patch_set() {
    let mut channel = Channel::new(damaged_sine(1000), test_settings()).unwrap();

    channel.scan(&NullReporter).unwrap();
    let first: Vec<(usize, usize)> = channel
        .patches()
        .iter()
        .map(|p| (p.start_position(), p.len()))
        .collect();

    channel.scan(&NullReporter).unwrap();
    let second: Vec<(usize, usize)> = channel
        .patches()
        .iter()
        .map(|p| (p.start_position(), p.len()))
        .collect();

    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn scan_reports_phases_in_order() {
    #[derive(Default)]
    struct Recording {
        phases: Mutex<Vec<String>>,
        last_percent: Mutex<f64>,
    }

    impl ScanReporter for Recording {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }

        fn progress(&self, percent: f64) {
            assert!((0.0..=100.0).contains(&percent));
            *self.last_percent.lock().unwrap() = percent;
        }
    }

    let reporter = Recording::default();
    let mut channel = Channel::new(damaged_sine(1000), test_settings()).unwrap();
    channel.scan(&reporter).unwrap();

    let phases = reporter.phases.lock().unwrap().clone();
    assert_eq!(phases, vec!["Preparation", "Detection", "Restoration", ""]);
    assert_eq!(*reporter.last_percent.lock().unwrap(), 100.0);
}

#[test]
fn unapproved_patch_reads_through_to_raw_input() {
    let channel = scanned_channel();
    let patch = channel.patch_at(SPIKE_POSITION).unwrap();
    let start = patch.start_position();

    let repaired = channel.output_sample(SPIKE_POSITION).unwrap();
    assert_ne!(repaired, SPIKE_VALUE);

    assert!(!channel.toggle_approved(start).unwrap());
    assert_eq!(channel.output_sample(SPIKE_POSITION).unwrap(), SPIKE_VALUE);

    assert!(channel.toggle_approved(start).unwrap());
    assert_eq!(channel.output_sample(SPIKE_POSITION).unwrap(), repaired);
}

#[test]
fn resize_operations_regenerate_geometry_and_metrics() {
    let channel = scanned_channel();
    let original = channel.patch_at(SPIKE_POSITION).unwrap();
    let start = original.start_position();
    let length = original.len();

    let wider = channel.expand_right(start).unwrap();
    assert_eq!(wider.start_position(), start);
    assert_eq!(wider.len(), length + 1);
    assert!(wider.metrics().connection_error.is_finite());

    let narrower = channel.shrink_right(start).unwrap();
    assert_eq!(narrower.len(), length);

    let shifted = channel.expand_left(start).unwrap();
    assert_eq!(shifted.start_position(), start - 1);
    assert_eq!(shifted.len(), length + 1);

    let back = channel.shrink_left(start - 1).unwrap();
    assert_eq!(back.start_position(), start);
    assert_eq!(back.len(), length);

    // Geometry restored; the repair still holds.
    let clean = AMPLITUDE * (2.0 * PI * FREQUENCY * SPIKE_POSITION as f64).sin();
    let repaired = channel.output_sample(SPIKE_POSITION).unwrap();
    assert!((repaired - clean).abs() <= 0.05 * clean.abs());
}

#[test]
fn burst_damage_is_fully_covered_and_repaired() {
    let mut samples = sine(1000);
    for (index, position) in (598..=604).enumerate() {
        samples[position] = if index % 2 == 0 { 30_000.0 } else { -30_000.0 };
    }

    let mut channel = Channel::new(samples, test_settings()).unwrap();
    channel.scan(&NullReporter).unwrap();

    for position in 598..=604 {
        assert!(
            channel.patch_at(position).is_some(),
            "position {position} left uncovered"
        );
        let clean = AMPLITUDE * (2.0 * PI * FREQUENCY * position as f64).sin();
        let repaired = channel.output_sample(position).unwrap();
        assert!(
            (repaired - clean).abs() <= 0.10 * AMPLITUDE,
            "position {position}: repaired {repaired} strays from clean {clean}"
        );
    }
}

#[test]
fn damage_longer_than_max_correction_spans_multiple_patches() {
    let settings = test_settings();
    let mut samples = sine(1000);
    // Twice the maximum correction length; one patch cannot cover it, so the
    // follow-up sweep after each repair must keep going.
    for position in 600..640 {
        samples[position] = if position % 2 == 0 { 30_000.0 } else { -30_000.0 };
    }

    let mut channel = Channel::new(samples, settings.clone()).unwrap();
    channel.scan(&NullReporter).unwrap();

    assert!(channel.patch_count() >= 2);
    for patch in channel.patches() {
        assert!(patch.len() <= settings.max_length_of_correction);
    }

    let covered = (600..640)
        .filter(|&position| channel.patch_at(position).is_some())
        .count();
    assert!(covered >= 30, "only {covered} of 40 damaged positions covered");
}

#[test]
fn output_materializes_every_position() {
    let channel = scanned_channel();
    let output = channel.output();

    assert_eq!(output.len(), channel.len_samples());
    for (position, value) in output.iter().enumerate() {
        assert_eq!(*value, channel.output_sample(position).unwrap());
    }
    assert!(output.iter().all(|v| v.is_finite()));
}

#[test]
fn prediction_errors_are_available_after_scan() {
    let channel = scanned_channel();

    // Far from the damage the sine is predicted almost exactly.
    let quiet = channel.prediction_error(400).unwrap();
    assert!(quiet.abs() < 1.0);

    // The spike position is patched, so its error reads as minimal.
    if channel.patch_at(SPIKE_POSITION).is_some() {
        assert_eq!(channel.prediction_error(SPIKE_POSITION).unwrap(), 0.0);
    }
}
