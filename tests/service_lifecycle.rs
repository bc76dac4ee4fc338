mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use defect_predict::data::domain::Feature;
use defect_predict::inference::domain::{clamp_probability, InitOutcome, ServiceState};
use defect_predict::training::domain::ArtifactRepo;
use defect_predict::{ErrorCode, FeatureVector, FsArtifactRepo, PredictionService, RawRecord};

use common::{small_pipeline, MemoryRepo};

fn probes() -> Vec<RawRecord> {
    vec![
        RawRecord::new(),
        RawRecord::new().with("particle_size_d50", 185.0),
        RawRecord::new()
            .with("temperature", 21.0)
            .with("humidity", "62"),
    ]
}

fn probabilities(svc: &PredictionService<MemoryRepo>) -> Vec<f64> {
    svc.predict_batch(&probes())
        .unwrap()
        .into_iter()
        .map(|p| p.defect_probability)
        .collect()
}

#[test]
fn persisted_pair_predicts_like_the_fitted_one() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = small_pipeline(3);
    let fitted = pipeline.fit().unwrap();
    let repo = FsArtifactRepo::new(dir.path());
    pipeline.persist(&repo, &fitted).unwrap();

    let svc = PredictionService::new(FsArtifactRepo::new(dir.path()), small_pipeline(3));
    assert_eq!(svc.initialize().unwrap(), InitOutcome::Loaded);

    let out = svc.predict_batch(&probes()).unwrap();
    for (record, prediction) in probes().iter().zip(&out) {
        let expected = clamp_probability(fitted.predict(&record.features().unwrap()).unwrap());
        assert_eq!(prediction.defect_probability, expected);
    }
}

#[test]
fn empty_record_equals_explicit_defaults() {
    let svc = PredictionService::new(MemoryRepo::default(), small_pipeline(42));
    svc.initialize().unwrap();

    let mut explicit = RawRecord::new();
    for feature in Feature::ALL {
        explicit = explicit.with(feature.name(), feature.default_value());
    }
    let out = svc.predict_batch(&[RawRecord::new(), explicit]).unwrap();
    assert_eq!(out[0].defect_probability, out[1].defect_probability);
    assert_eq!(out[0].features, FeatureVector::default());
}

#[test]
fn failed_first_training_leaves_service_uninitialized() {
    let repo = MemoryRepo::default();
    repo.fail_writes(true);
    let svc = PredictionService::new(repo, small_pipeline(42));

    let err = svc.initialize().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Persistence);
    assert_eq!(svc.state(), ServiceState::Uninitialized);
    assert_eq!(
        svc.predict_batch(&probes()).unwrap_err().code(),
        ErrorCode::NotReady
    );
}

#[test]
fn failed_retrain_keeps_the_previous_pair() {
    let svc = PredictionService::new(MemoryRepo::default(), small_pipeline(1));
    svc.initialize().unwrap();
    let before = probabilities(&svc);
    let fingerprint = svc.repo().stored_fingerprint();

    svc.repo().fail_writes(true);
    let err = svc.retrain_with(&small_pipeline(9)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Persistence);

    assert_eq!(svc.state(), ServiceState::Ready);
    assert_eq!(probabilities(&svc), before);
    assert_eq!(svc.repo().stored_fingerprint(), fingerprint);
    assert_eq!(svc.model_info().fingerprint, fingerprint);
}

#[test]
fn concurrent_batches_see_one_pair_during_retrain() {
    let old = small_pipeline(1).fit().unwrap();
    let new = small_pipeline(7).fit().unwrap();
    let expected = |snapshot: &defect_predict::training::domain::ModelSnapshot| -> Vec<f64> {
        probes()
            .iter()
            .map(|r| clamp_probability(snapshot.predict(&r.features().unwrap()).unwrap()))
            .collect()
    };
    let (old_out, new_out) = (expected(&old), expected(&new));
    assert_ne!(old_out, new_out);

    let repo = MemoryRepo::with_delay(Duration::from_millis(100));
    repo.persist(&old).unwrap();
    let svc = Arc::new(PredictionService::new(repo, small_pipeline(1)));
    assert_eq!(svc.initialize().unwrap(), InitOutcome::Loaded);

    let retrainer = {
        let svc = Arc::clone(&svc);
        std::thread::spawn(move || svc.retrain_with(&small_pipeline(7)))
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let svc = Arc::clone(&svc);
            std::thread::spawn(move || {
                (0..25)
                    .map(|_| {
                        std::thread::sleep(Duration::from_millis(5));
                        probabilities(&svc)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for reader in readers {
        for out in reader.join().unwrap() {
            assert!(out == old_out || out == new_out, "mixed pair: {out:?}");
        }
    }
    retrainer.join().unwrap().unwrap();
    assert_eq!(probabilities(&svc), new_out);
}

#[test]
fn predictions_during_initialize_fail_fast() {
    let svc = Arc::new(PredictionService::new(
        MemoryRepo::with_delay(Duration::from_millis(200)),
        small_pipeline(42),
    ));
    let init = {
        let svc = Arc::clone(&svc);
        std::thread::spawn(move || svc.initialize())
    };
    std::thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    let err = svc.predict_batch(&probes()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotReady);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!init.is_finished());
    assert!(!svc.health().model_loaded);

    assert_eq!(init.join().unwrap().unwrap(), InitOutcome::Trained);
    assert_eq!(probabilities(&svc).len(), 3);
}

#[test]
fn concurrent_retrains_run_one_at_a_time() {
    let delay = Duration::from_millis(80);
    let svc = Arc::new(PredictionService::new(
        MemoryRepo::with_delay(delay),
        small_pipeline(1),
    ));
    svc.initialize().unwrap();

    let started = Instant::now();
    let handles: Vec<_> = (0..3u64)
        .map(|i| {
            let svc = Arc::clone(&svc);
            std::thread::spawn(move || svc.retrain_with(&small_pipeline(10 + i)))
        })
        .collect();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert!(started.elapsed() >= delay * 3, "{:?}", started.elapsed());
    let fingerprints: HashSet<_> = outcomes.iter().map(|o| o.meta.fingerprint.clone()).collect();
    assert_eq!(fingerprints.len(), 3);
    assert_eq!(svc.repo().stored_fingerprint(), svc.model_info().fingerprint);
}

#[test]
fn torn_pair_on_disk_is_retrained() {
    let dir = tempfile::tempdir().unwrap();
    let repo = FsArtifactRepo::new(dir.path());
    repo.persist(&small_pipeline(1).fit().unwrap()).unwrap();
    let old_scaler = std::fs::read(repo.scaler_path()).unwrap();
    repo.persist(&small_pipeline(2).fit().unwrap()).unwrap();
    std::fs::write(repo.scaler_path(), old_scaler).unwrap();

    let svc = PredictionService::new(repo, small_pipeline(3));
    assert_eq!(svc.initialize().unwrap(), InitOutcome::Trained);
    let stored = svc.repo().load().unwrap().unwrap();
    assert_eq!(Some(stored.meta.fingerprint), svc.model_info().fingerprint);
}
