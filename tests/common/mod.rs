//! Common test utilities for study-results integration tests

use study_results::db::{NewComponentResult, NewStudy, NewStudyResult, NewWorker};
use study_results::types::{ComponentResultState, StudyResultState};
use study_results::uploads::UploadStore;
use study_results::{
    ComponentResultId, Config, Database, ResultRemover, ResultStreamer, StudyId, StudyResultId,
    User, WorkerType,
};
use std::sync::Arc;
use tempfile::TempDir;

/// A study with two runs: A with data `r1c1`, `r1c2` and B with `r2c1`
#[allow(dead_code)]
pub struct Study {
    pub temp: TempDir,
    pub db: Arc<Database>,
    pub streamer: ResultStreamer,
    pub remover: ResultRemover,
    pub researcher: User,
    pub study_id: StudyId,
    pub run_a: StudyResultId,
    pub run_b: StudyResultId,
    pub component_results: Vec<ComponentResultId>,
}

impl Study {
    pub async fn create() -> Self {
        let temp = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.persistence.database_path = temp.path().join("results.db");
        config.storage.uploads_dir = temp.path().join("uploads");
        config.storage.temp_dir = temp.path().join("tmp");
        // Small pages so the scenario spans several of them
        config.export.max_db_query_size = 2;
        let config = Arc::new(config);

        let db = Arc::new(
            Database::new(&config.persistence.database_path)
                .await
                .unwrap(),
        );
        let uploads = UploadStore::new(&config.storage.uploads_dir);
        let researcher = User::new("researcher", "Rea Searcher");

        let mut conn = db.acquire().await.unwrap();
        Database::insert_user(&mut conn, &researcher).await.unwrap();
        let study_id = Database::insert_study(
            &mut conn,
            &NewStudy {
                title: "Lexical decision".to_string(),
                locked: false,
            },
        )
        .await
        .unwrap();
        Database::add_study_member(&mut conn, study_id, &researcher.username)
            .await
            .unwrap();
        let batch_id = Database::insert_batch(&mut conn, study_id, "Default")
            .await
            .unwrap();
        let intro = Database::insert_component(&mut conn, study_id, "Intro")
            .await
            .unwrap();
        let trials = Database::insert_component(&mut conn, study_id, "Trials")
            .await
            .unwrap();

        let mut runs = Vec::new();
        let mut component_results = Vec::new();
        for payloads in [vec!["r1c1", "r1c2"], vec!["r2c1"]] {
            let worker_id = Database::insert_worker(
                &mut conn,
                &NewWorker {
                    worker_type: WorkerType::GeneralSingle,
                    username: None,
                    comment: None,
                },
            )
            .await
            .unwrap();
            let run = Database::insert_study_result(
                &mut conn,
                &NewStudyResult {
                    study_id,
                    batch_id,
                    worker_id,
                    state: StudyResultState::Finished,
                    active_group_result_id: None,
                    history_group_result_id: None,
                    url_query_parameters: None,
                },
            )
            .await
            .unwrap();
            for (payload, component_id) in payloads.into_iter().zip([intro, trials]) {
                let id = Database::insert_component_result(
                    &mut conn,
                    &NewComponentResult {
                        study_result_id: run,
                        component_id,
                        state: ComponentResultState::Finished,
                        data: Some(payload.to_string()),
                    },
                )
                .await
                .unwrap();
                component_results.push(id);
            }
            runs.push(run);
        }
        drop(conn);

        Self {
            streamer: ResultStreamer::new(db.clone(), uploads.clone(), config.clone()),
            remover: ResultRemover::new(db.clone(), uploads),
            temp,
            db,
            researcher,
            study_id,
            run_a: runs[0],
            run_b: runs[1],
            component_results,
        }
    }

    /// Lock or unlock the study
    #[allow(dead_code)]
    pub async fn set_locked(&self, locked: bool) {
        let mut conn = self.db.acquire().await.unwrap();
        Database::set_study_locked(&mut conn, self.study_id, locked)
            .await
            .unwrap();
    }

    /// Number of study results and component results left in the study
    pub async fn counts(&self) -> (u64, u64) {
        let scope = study_results::ResultScope::Study(self.study_id);
        let mut conn = self.db.acquire().await.unwrap();
        let study_results = Database::count_study_results(&mut conn, &scope)
            .await
            .unwrap();
        let component_results = Database::count_component_results(&mut conn, &scope)
            .await
            .unwrap();
        (study_results, component_results)
    }
}
