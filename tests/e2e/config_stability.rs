//! Scenario 6: two reloads during a run, the first raising
//! `matchConfidence`, the second dropping it far below the stability
//! policy's tolerance. The effective threshold stays at the highest
//! observed value.

use epimatch_core::config::ConfigurationEngine;
use epimatch_core::types::SubtitleSourceFormat;

const INITIAL: &str = r#"{
    "version": "1.0",
    "matchingStrategy": "hybrid",
    "matchingThresholds": {
        "Text": {"matchConfidence": 0.80, "renameConfidence": 0.90, "fuzzyHashSimilarity": 70.0}
    },
    "maxConcurrency": 4,
    "filenamePatterns": {"primaryPattern": "{series}", "fallbackPatterns": []}
}"#;

#[test]
fn stability_policy_survives_two_reloads() {
    let file = tempfile::NamedTempFile::new().expect("config file");
    std::fs::write(file.path(), INITIAL).expect("write initial");
    let engine = ConfigurationEngine::new(file.path());
    engine.load().expect("initial load");

    let raised = INITIAL.replace("0.80", "0.92").replace("0.90", "0.95");
    std::fs::write(file.path(), raised).expect("write raised");
    let after_first_reload = engine.load().expect("first reload");
    assert_eq!(
        after_first_reload.thresholds[&SubtitleSourceFormat::Text].match_confidence,
        0.92
    );

    let dropped = INITIAL.replace("0.80", "0.10").replace("0.90", "0.20");
    std::fs::write(file.path(), dropped).expect("write dropped");
    let after_second_reload = engine.load().expect("second reload");

    assert_eq!(
        after_second_reload.thresholds[&SubtitleSourceFormat::Text].match_confidence,
        0.92,
        "stability policy must preserve the highest observed matchConfidence across both reloads"
    );
    assert_eq!(engine.highest_observed(SubtitleSourceFormat::Text), 0.92);
}
