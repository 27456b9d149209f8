//! Test harness for isolated service runs.
//!
//! Each `TestHarness` owns a temporary data directory and a `TaskService`
//! whose pipeline uses the fakes from `common::fakes`. Two dev tokens are
//! registered: `alice-token` (id 1) and `bob-token` (id 2).

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use docraster::auth::DevTokenAuthenticator;
use docraster::config::DevToken;
use docraster::service::{SubmitRequest, TaskService, TaskView, Upload};
use docraster::{Pipeline, PipelineConfig, Principal, Settings};

use super::fakes::{FakeConverter, FakeRasterizer};

pub const ALICE: &str = "Bearer alice-token";
pub const BOB: &str = "Bearer bob-token";

pub struct TestHarness {
    temp_dir: TempDir,
    pub settings: Settings,
    pub service: TaskService,
}

impl TestHarness {
    /// One worker, no pause, two-page documents.
    pub fn new() -> Self {
        Self::with_fakes(1, FakeConverter::default(), FakeRasterizer::new(2))
    }

    pub fn with_fakes(workers: usize, converter: FakeConverter, rasterizer: FakeRasterizer) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let mut settings = Settings::with_data_dir(temp_dir.path().join("data"));
        settings.max_worker_threads = workers;
        settings.worker_pause_ms = 0;
        settings.auth.dev_tokens = dev_tokens();

        let pipeline = Pipeline::new(
            Arc::new(PipelineConfig::from_settings(&settings)),
            Box::new(converter),
            Box::new(rasterizer),
        );
        let service = TaskService::with_pipeline(
            settings.clone(),
            pipeline,
            Box::new(DevTokenAuthenticator::new(settings.auth.dev_tokens.clone())),
        )
        .expect("Failed to start service");

        Self {
            temp_dir,
            settings,
            service,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn result_dir(&self) -> PathBuf {
        self.settings.result_dir()
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.settings.upload_dir()
    }

    pub fn principal(&self, authorization: &str) -> Principal {
        self.service
            .authenticate(authorization)
            .expect("dev token should authenticate")
    }

    pub fn pdf(name: &str) -> Upload {
        Upload::new(name, b"%PDF-1.4\n%%EOF\n".to_vec())
    }

    pub fn docx(name: &str) -> Upload {
        Upload::new(name, b"PK\x03\x04 not really a docx".to_vec())
    }

    pub fn submit(&self, authorization: &str, request: SubmitRequest) -> Vec<TaskView> {
        let principal = self.principal(authorization);
        self.service
            .submit(&principal, request)
            .expect("submission should be accepted")
    }

    pub fn submit_files(&self, authorization: &str, files: Vec<Upload>) -> Vec<TaskView> {
        self.submit(
            authorization,
            SubmitRequest {
                files,
                ..Default::default()
            },
        )
    }

    /// Polls until the task is terminal or `timeout` passes.
    pub fn wait_for(&self, authorization: &str, task_id: &str, timeout: Duration) -> TaskView {
        let principal = self.principal(authorization);
        let deadline = Instant::now() + timeout;
        loop {
            let view = self
                .service
                .status(&principal, task_id)
                .expect("status should be readable by the owner");
            if view.state.is_terminal() || Instant::now() >= deadline {
                return view;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn wait_all(&self, authorization: &str, views: &[TaskView]) -> Vec<TaskView> {
        views
            .iter()
            .map(|v| self.wait_for(authorization, &v.task_id, Duration::from_secs(10)))
            .collect()
    }

    /// Files left in the upload directory.
    pub fn uploads_left(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.upload_dir())
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.service.shutdown();
    }
}

fn dev_tokens() -> HashMap<String, DevToken> {
    let mut tokens = HashMap::new();
    tokens.insert(
        "alice-token".to_string(),
        DevToken {
            id: 1,
            username: Some("alice".to_string()),
            email: Some("alice@example.com".to_string()),
        },
    );
    tokens.insert(
        "bob-token".to_string(),
        DevToken {
            id: 2,
            username: Some("bob".to_string()),
            email: None,
        },
    );
    tokens
}
