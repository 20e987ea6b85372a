use crate::Config;
use crate::db::*;
use crate::types::{
    BatchId, ComponentId, ComponentResultId, ComponentResultState, GroupResultId, GroupState,
    StudyId, StudyResultId, StudyResultState, User, WorkerId, WorkerType,
};
use crate::uploads::UploadStore;
use std::sync::Arc;
use tempfile::TempDir;


/// A study with one batch, two components and two study results:
/// A (`r1c1`, `r1c2`) and B (`r2c1`). `member` belongs to the study, `stranger` doesn't.
pub(crate) struct Fixture {
    pub temp: TempDir,
    pub db: Arc<Database>,
    pub uploads: UploadStore,
    pub config: Config,
    pub member: User,
    pub stranger: User,
    pub study_id: StudyId,
    pub batch_id: BatchId,
    pub components: Vec<ComponentId>,
    pub workers: Vec<WorkerId>,
    pub study_results: Vec<StudyResultId>,
    pub component_results: Vec<ComponentResultId>,
}

impl Fixture {
    pub async fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.persistence.database_path = temp.path().join("test.db");
        config.storage.uploads_dir = temp.path().join("uploads");
        config.storage.temp_dir = temp.path().join("tmp");
        std::fs::create_dir_all(&config.storage.uploads_dir).unwrap();
        std::fs::create_dir_all(&config.storage.temp_dir).unwrap();

        let db = Database::new(&config.persistence.database_path)
            .await
            .unwrap();
        let uploads = UploadStore::new(&config.storage.uploads_dir);

        let member = User::new("researcher", "Rea Searcher");
        let stranger = User::new("stranger", "Some One");

        let mut conn = db.acquire().await.unwrap();
        Database::insert_user(&mut conn, &member).await.unwrap();
        Database::insert_user(&mut conn, &stranger).await.unwrap();

        let study_id = Database::insert_study(
            &mut conn,
            &NewStudy {
                title: "Stroop".to_string(),
                locked: false,
            },
        )
        .await
        .unwrap();
        Database::add_study_member(&mut conn, study_id, &member.username)
            .await
            .unwrap();

        let batch_id = Database::insert_batch(&mut conn, study_id, "Default")
            .await
            .unwrap();
        let components = vec![
            Database::insert_component(&mut conn, study_id, "Intro")
                .await
                .unwrap(),
            Database::insert_component(&mut conn, study_id, "Trials")
                .await
                .unwrap(),
        ];
        drop(conn);

        let mut fixture = Self {
            temp,
            db: Arc::new(db),
            uploads,
            config,
            member,
            stranger,
            study_id,
            batch_id,
            components,
            workers: Vec::new(),
            study_results: Vec::new(),
            component_results: Vec::new(),
        };

        let a = fixture
            .add_run(WorkerType::PersonalSingle, &[Some("r1c1"), Some("r1c2")])
            .await;
        let b = fixture
            .add_run(WorkerType::GeneralMultiple, &[Some("r2c1")])
            .await;
        fixture.study_results = vec![a.0, b.0];
        fixture.component_results = a.1.into_iter().chain(b.1).collect();

        fixture
    }

    /// Add a worker of the given type and one study run with one component
    /// result per payload, cycling through the study's components
    pub async fn add_run(
        &mut self,
        worker_type: WorkerType,
        payloads: &[Option<&str>],
    ) -> (StudyResultId, Vec<ComponentResultId>) {
        let mut conn = self.db.acquire().await.unwrap();
        let worker_id = Database::insert_worker(
            &mut conn,
            &NewWorker {
                worker_type,
                username: None,
                comment: None,
            },
        )
        .await
        .unwrap();
        Database::add_batch_worker(&mut conn, self.batch_id, worker_id)
            .await
            .unwrap();
        self.workers.push(worker_id);
        drop(conn);

        self.add_run_for(worker_id, payloads).await
    }

    /// Add a study run for an existing worker
    pub async fn add_run_for(
        &self,
        worker_id: WorkerId,
        payloads: &[Option<&str>],
    ) -> (StudyResultId, Vec<ComponentResultId>) {
        let mut conn = self.db.acquire().await.unwrap();
        let study_result_id = Database::insert_study_result(
            &mut conn,
            &NewStudyResult {
                study_id: self.study_id,
                batch_id: self.batch_id,
                worker_id,
                state: StudyResultState::Finished,
                active_group_result_id: None,
                history_group_result_id: None,
                url_query_parameters: None,
            },
        )
        .await
        .unwrap();

        let mut component_results = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            let id = Database::insert_component_result(
                &mut conn,
                &NewComponentResult {
                    study_result_id,
                    component_id: self.components[i % self.components.len()],
                    state: ComponentResultState::Finished,
                    data: payload.map(str::to_string),
                },
            )
            .await
            .unwrap();
            component_results.push(id);
        }

        (study_result_id, component_results)
    }

    /// Add a study that `member` doesn't belong to, with one run; returns the run
    pub async fn add_foreign_study(&self) -> StudyResultId {
        let mut conn = self.db.acquire().await.unwrap();
        let study_id = Database::insert_study(
            &mut conn,
            &NewStudy {
                title: "Foreign".to_string(),
                locked: false,
            },
        )
        .await
        .unwrap();
        let batch_id = Database::insert_batch(&mut conn, study_id, "Default")
            .await
            .unwrap();
        let component_id = Database::insert_component(&mut conn, study_id, "Only")
            .await
            .unwrap();
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
        let study_result_id = Database::insert_study_result(
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
        Database::insert_component_result(
            &mut conn,
            &NewComponentResult {
                study_result_id,
                component_id,
                state: ComponentResultState::Finished,
                data: Some("foreign".to_string()),
            },
        )
        .await
        .unwrap();

        study_result_id
    }

    /// Add a group result in the fixture's batch
    pub async fn add_group(&self, state: GroupState) -> GroupResultId {
        let mut conn = self.db.acquire().await.unwrap();
        Database::insert_group_result(&mut conn, self.batch_id, state)
            .await
            .unwrap()
    }

    /// Put a study result into a group, as active or historical member
    pub async fn join_group(&self, study_result_id: StudyResultId, group: GroupResultId, active: bool) {
        let column = if active {
            "active_group_result_id"
        } else {
            "history_group_result_id"
        };
        sqlx::query(&format!("UPDATE study_results SET {column} = ? WHERE id = ?"))
            .bind(group)
            .bind(study_result_id)
            .execute(self.db.pool())
            .await
            .unwrap();
    }
}
