//! Export-then-remove scenario over a whole study

mod common;

use common::Study;
use std::io::Read;
use study_results::{Error, ResultScope, ResultsType};
use zip::ZipArchive;

#[tokio::test]
async fn test_data_only_export_then_removal() {
    let study = Study::create().await;

    let export = study
        .streamer
        .export_archive(
            &ResultScope::Study(study.study_id),
            &study.researcher,
            ResultsType::DataOnly,
        )
        .await
        .unwrap();

    let mut archive = ZipArchive::new(std::fs::File::open(export.file.path()).unwrap()).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        entries.push((entry.name().to_string(), content));
    }

    let contents: Vec<_> = entries.iter().map(|(_, c)| c.as_str()).collect();
    assert_eq!(contents, vec!["r1c1", "r1c2", "r2c1"]);
    assert!(entries.iter().all(|(name, _)| name.ends_with("/data.txt")));
    assert!(entries[0].0.starts_with(&format!("study_result_{}/", study.run_a)));
    assert!(entries[2].0.starts_with(&format!("study_result_{}/", study.run_b)));
    assert_eq!(export.report.written, 2);

    let report = study
        .remover
        .remove_study_results(&[study.run_a], &study.researcher)
        .await
        .unwrap();
    assert_eq!(report.removed_study_results, vec![study.run_a]);

    assert_eq!(study.counts().await, (1, 1));
}

#[tokio::test]
async fn test_locked_study_keeps_its_results() {
    let study = Study::create().await;
    study.set_locked(true).await;

    let err = study
        .remover
        .remove_study_results(&[study.run_a, study.run_b], &study.researcher)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "got {err:?}");
    assert_eq!(study.counts().await, (2, 3));

    // Exports still work on a locked study
    let mut out = String::new();
    study
        .streamer
        .stream_data_text(&ResultScope::Study(study.study_id), &study.researcher, &mut out)
        .await
        .unwrap();
    assert_eq!(out, "r1c1\nr1c2\nr2c1");

    study.set_locked(false).await;
    study
        .remover
        .remove_component_results(&study.component_results, &study.researcher, true)
        .await
        .unwrap();
    assert_eq!(study.counts().await, (0, 0));
}
