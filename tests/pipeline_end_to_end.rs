use std::path::PathBuf;
use std::sync::Arc;

use Chronicare::adapters::artifact::ArtifactCache;
use Chronicare::adapters::explain::{ExplainerKind, RuleBasedExplainer};
use Chronicare::adapters::logistic::{ExportedLogisticModel, LogisticRiskModel};
use Chronicare::adapters::retry::RetryPolicy;
use Chronicare::application::{
    FeatureBuilder, Loader, PipelineWorker, RiskPipeline, RiskThreshold, Scorer,
};
use Chronicare::config::{ModelSource, PipelineConfig};
use Chronicare::domain::{ExplanationSource, FEATURE_NAMES};
use Chronicare::ports::RiskClassifier;
use Chronicare::{ChronicareError, RiskLevel};

fn manifest_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn bundled_config() -> PipelineConfig {
    PipelineConfig {
        data_path: manifest_path("data/patient_vitals.csv"),
        model: ModelSource::Path(manifest_path("models/risk_model.json")),
        retry: RetryPolicy::no_retry(),
        ..PipelineConfig::default()
    }
}

fn bundled_model() -> Arc<LogisticRiskModel> {
    bundled_config()
        .load_model(&ArtifactCache::default())
        .expect("bundled model loads")
}

#[test]
fn three_reading_patient_features() {
    let csv = "Patient ID,date,heart_rate,systolic_bp\n\
               P1,2024-01-01,70,120\n\
               P1,2024-01-02,71,130\n\
               P1,2024-01-03,72,140\n";
    let readings = Loader::default().load_reader(csv.as_bytes()).expect("load");
    let rows = FeatureBuilder::new().build(&readings);

    assert_eq!(rows.len(), 1);
    let p1 = &rows[0];
    assert!((p1.avg_sbp - 130.0).abs() < 1e-9);
    assert!((p1.max_sbp - 140.0).abs() < 1e-9);
    assert!((p1.sbp_trend - 10.0).abs() < 1e-9);
    assert!((p1.std_sbp - 10.0).abs() < 1e-9);
}

#[test]
fn bundled_data_scores_and_ranks() {
    let config = bundled_config();
    let model = bundled_model();
    let pipeline = RiskPipeline::new(config.loader(), model, RuleBasedExplainer::default());
    let report = pipeline.run_path(&config.data_path).expect("run");

    assert_eq!(report.cohort.len(), 4);
    assert_eq!(report.summary.patient_count, 4);

    // P003's leading empty row is dropped.
    let p3 = report.patient_detail("P003").expect("P003");
    assert_eq!(p3.readings.len(), 3);
    assert_eq!(p3.record.risk_level, RiskLevel::High);
    assert_eq!(p3.record.explanation.source, ExplanationSource::RuleBased);

    // P001's missing heart rate is forward-filled from the previous day.
    let p1 = report.patient_detail("P001").expect("P001");
    assert_eq!(p1.readings.len(), 4);
    assert!((p1.readings[2].heart_rate - 82.0).abs() < f64::EPSILON);
    assert_eq!(p1.record.risk_level, RiskLevel::Moderate);

    let p4 = report.patient_detail("P004").expect("P004");
    assert_eq!(p4.features.std_sbp, 0.0);
    assert_eq!(p4.features.sbp_trend, 0.0);
    assert_eq!(p4.record.risk_level, RiskLevel::Low);

    let ranked: Vec<String> = report
        .ranked(RiskThreshold::new(50.0).expect("valid"))
        .into_iter()
        .map(|r| r.patient_id)
        .collect();
    assert_eq!(ranked, vec!["P003", "P001"]);
}

#[test]
fn permuted_model_schema_scores_identically() {
    let canonical = bundled_model();

    // Same parameters, exported with the columns in reverse order.
    let json = std::fs::read(manifest_path("models/risk_model.json")).expect("read");
    let exported: ExportedLogisticModel = serde_json::from_slice(&json).expect("parse");
    let rev = |v: &Vec<f64>| v.iter().rev().copied().collect::<Vec<f64>>();
    let permuted = LogisticRiskModel::from_exported(ExportedLogisticModel {
        feature_names: exported.feature_names.iter().rev().cloned().collect(),
        coefficients: rev(&exported.coefficients),
        scaler_mean: exported.scaler_mean.as_ref().map(rev),
        scaler_std: exported.scaler_std.as_ref().map(rev),
        ..exported.clone()
    })
    .expect("valid model");
    assert_ne!(permuted.feature_names(), canonical.feature_names());

    let readings = Loader::default()
        .load_path(&manifest_path("data/patient_vitals.csv"))
        .expect("load");
    let (_, matrix) = FeatureBuilder::new().build_matrix(&readings);

    let expected = Scorer::new(canonical).score(&matrix).expect("score");
    let actual = Scorer::new(permuted).score(&matrix).expect("score");
    assert_eq!(expected.len(), actual.len());
    for (a, b) in expected.iter().zip(&actual) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn missing_timestamp_column_is_malformed() {
    let pipeline = RiskPipeline::new(
        Loader::default(),
        bundled_model(),
        RuleBasedExplainer::default(),
    );
    let err = pipeline
        .run_reader("Patient ID,heart_rate,systolic_bp\nP1,70,120\n".as_bytes())
        .expect_err("no timestamp column");
    assert!(matches!(err, ChronicareError::MalformedInput(_)));
}

#[test]
fn missing_source_is_data_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = bundled_config();
    let pipeline = RiskPipeline::new(
        config.loader(),
        bundled_model(),
        RuleBasedExplainer::default(),
    );
    let err = pipeline
        .run_path(&dir.path().join("nope.csv"))
        .expect_err("missing");
    assert!(matches!(err, ChronicareError::DataNotFound(_)));
}

#[test]
fn worker_with_configured_explainer() {
    let config = PipelineConfig {
        explainer: ExplainerKind::Shap,
        ..bundled_config()
    };
    let classifier: Arc<dyn RiskClassifier> = bundled_model();
    let explainer = config.explainer.build(Arc::clone(&classifier));
    let pipeline = Arc::new(RiskPipeline::new(config.loader(), classifier, explainer));

    let report = PipelineWorker::spawn(pipeline, config.data_path.clone())
        .wait()
        .expect("report");

    let names: Vec<&str> = FEATURE_NAMES.to_vec();
    for record in &report.cohort {
        assert_eq!(record.explanation.source, ExplanationSource::Shap);
        assert_eq!(record.explanation.contributions.len(), names.len());
    }
}
