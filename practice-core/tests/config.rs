use practice_core::chord::ChordTemplate;
use practice_core::config::{ChordConfig, TunerConfig};
use practice_core::{ChordPipeline, Pipeline, TunerPipeline, TunerResult};

#[test]
fn partial_json_overrides_defaults() {
    let config: TunerConfig =
        serde_json::from_str(r#"{ "reference_a4": 442.0, "capture": { "frame_size": 8192 } }"#).unwrap();
    assert_eq!(config.reference_a4, 442.0);
    assert_eq!(config.capture.frame_size, 8192);
    assert_eq!(config.capture.sample_rate, 44100);
    assert_eq!(config.cycle_delay_ms, 40);
    assert!(config.validate().is_ok());
}

#[test]
fn custom_template_table_is_used_in_order() {
    let config: ChordConfig = serde_json::from_str(
        r#"{ "templates": [ { "suffix": "5", "intervals": [0, 7] } ] }"#,
    )
    .unwrap();
    assert_eq!(config.templates, vec![ChordTemplate::new("5", &[0, 7])]);
    assert_eq!(config.fft_size, 4096);

    // Power chord E-B.
    let sr = config.capture.sample_rate as f64;
    let frame: Vec<i16> = (0..4096)
        .map(|i| {
            let t = i as f64 / sr;
            let v = 0.3 * (2.0 * std::f64::consts::PI * 164.81 * t).sin()
                + 0.3 * (2.0 * std::f64::consts::PI * 246.94 * t).sin();
            (v * i16::MAX as f64) as i16
        })
        .collect();
    let mut pipeline = ChordPipeline::new(config).unwrap();
    assert_eq!(pipeline.analyze(&frame).chord_name.as_deref(), Some("E5"));
}

#[test]
fn invalid_json_config_is_rejected_on_build() {
    let config: ChordConfig = serde_json::from_str(r#"{ "fft_size": 1000 }"#).unwrap();
    assert!(ChordPipeline::new(config).is_err());

    let config: TunerConfig = serde_json::from_str(r#"{ "reference_a4": -1.0 }"#).unwrap();
    assert!(TunerPipeline::new(config).is_err());
}

#[test]
fn results_serialize_for_front_ends() {
    let json = serde_json::to_value(TunerResult::silence(Some(110.0))).unwrap();
    assert_eq!(json["note_name"], "--");
    assert_eq!(json["target_frequency"], 110.0);
    assert_eq!(json["is_locked"], false);
}

#[test]
fn partial_capture_section_keeps_pipeline_rate() {
    let chords: ChordConfig =
        serde_json::from_str(r#"{ "capture": { "read_timeout_ms": 800 } }"#).unwrap();
    assert_eq!(chords.capture.sample_rate, 22050);
    assert_eq!(chords.capture.frame_size, 4096);
    assert_eq!(chords.capture.read_timeout_ms, 800);

    let chords: ChordConfig =
        serde_json::from_str(r#"{ "capture": { "frame_size": 2048 }, "fft_size": 2048 }"#).unwrap();
    assert_eq!(chords.capture.sample_rate, 22050);
    assert_eq!(chords.capture.frame_size, 2048);

    let tuner: TunerConfig =
        serde_json::from_str(r#"{ "capture": { "read_timeout_ms": 250 } }"#).unwrap();
    assert_eq!(tuner.capture.sample_rate, 44100);
    assert_eq!(tuner.capture.read_timeout_ms, 250);
}

#[test]
fn short_frames_are_zero_padded_to_the_transform() {
    let config = ChordConfig {
        fft_size: 8192,
        ..ChordConfig::default()
    };
    assert_eq!(config.capture.frame_size, 4096);
    let sr = config.capture.sample_rate as f64;
    let frame: Vec<i16> = (0..4096)
        .map(|i| {
            let t = i as f64 / sr;
            let v: f64 = [261.63, 329.63, 392.0]
                .iter()
                .map(|f| 0.25 * (2.0 * std::f64::consts::PI * f * t).sin())
                .sum();
            (v * i16::MAX as f64).round() as i16
        })
        .collect();
    let mut pipeline = ChordPipeline::new(config).unwrap();
    assert_eq!(pipeline.analyze(&frame).chord_name.as_deref(), Some("C"));
}
