use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use image::ImageFormat;
use tracing::{debug, info_span};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ConversionError, StorageError};
use crate::processor::{
    apply_background, BackgroundSpec, DocumentFormat, LibreOfficeConverter, OfficeConverter,
    PdftoppmRasterizer, Rasterizer,
};
use crate::sanitize;
use crate::storage::{remove_path, write_metadata, WorkspaceMetadata, WorkspaceStore};
use crate::task::{ConversionOutput, Task, TaskState};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;

pub const IMAGES_DIR: &str = "images";
pub const PDF_DIR: &str = "pdf";
pub const SNAPSHOT_FILE: &str = "page-001-original.png";

/// `page-001.png`, `page-002.png`, ...
pub fn page_file_name(index: usize) -> String {
    format!("page-{:03}.png", index)
}

pub fn archive_file_name(task_id: &str) -> String {
    format!("{}.zip", task_id)
}

/// Relative URL of a completed task's archive.
pub fn download_url(task: &Task) -> Option<String> {
    (task.state() == TaskState::Completed).then(|| format!("/tasks/{}/download", task.id))
}

/// Relative URL of a completed task's unprocessed first page, if one was kept.
pub fn original_snapshot_url(task: &Task) -> Option<String> {
    task.output()
        .and_then(|o| o.original_snapshot.as_ref())
        .map(|_| format!("/tasks/{}/original", task.id))
}

/// Paths deleted when the guard drops, however the run ends, including by
/// unwinding. The workspace is deleted too unless the run was kept.
#[derive(Default)]
struct CleanupGuard {
    paths: Vec<PathBuf>,
    workspace: Option<PathBuf>,
}

impl CleanupGuard {
    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn track_workspace(&mut self, workspace: PathBuf) {
        self.workspace = Some(workspace);
    }

    fn keep_workspace(&mut self) {
        self.workspace = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            remove_path(path);
        }
        if let Some(ref workspace) = self.workspace {
            remove_path(workspace);
        }
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    store: WorkspaceStore,
    converter: Box<dyn OfficeConverter>,
    rasterizer: Box<dyn Rasterizer>,
}

impl Pipeline {
    /// Production constructor: LibreOffice and pdftoppm from the configured paths.
    pub fn from_config(config: Arc<PipelineConfig>) -> Self {
        let converter = Box::new(LibreOfficeConverter::new(config.libreoffice_path.clone()));
        let rasterizer = Box::new(PdftoppmRasterizer::new(
            config.pdftoppm_path.clone(),
            config.convert_timeout,
        ));
        Self::new(config, converter, rasterizer)
    }

    /// Inject specific collaborators.
    pub fn new(
        config: Arc<PipelineConfig>,
        converter: Box<dyn OfficeConverter>,
        rasterizer: Box<dyn Rasterizer>,
    ) -> Self {
        let store = WorkspaceStore::new(&config.result_dir);
        Self {
            config,
            store,
            converter,
            rasterizer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    /// Run the full conversion for one task.
    ///
    /// The uploaded source, the per-task background image and the source copy
    /// inside the workspace are deleted on every exit path. On failure the
    /// partially built workspace goes as well.
    pub fn run(&self, ctx: &mut PipelineContext) -> Result<ConversionOutput, PipelineError> {
        let filename = sanitize::redact_path(&ctx.task.source_path);
        let _pipeline_span = info_span!("pipeline",
            task_id = %ctx.task.id,
            filename = %filename,
            background = %ctx.task.background,
            dpi = ctx.task.dpi,
        )
        .entered();

        let mut cleanup = CleanupGuard::default();
        cleanup.track(ctx.task.source_path.clone());
        if let Some(ref background) = ctx.task.background_image {
            cleanup.track(background.clone());
        }

        let output = self.run_steps(ctx, &mut cleanup)?;
        cleanup.keep_workspace();
        Ok(output)
    }

    fn run_steps(
        &self,
        ctx: &mut PipelineContext,
        cleanup: &mut CleanupGuard,
    ) -> Result<ConversionOutput, PipelineError> {
        // Step 1: Workspace setup
        {
            let _step = info_span!("prepare_workspace").entered();
            self.step_prepare_workspace(ctx, cleanup)?;
        }

        // Step 2: Resolve background parameters before any image work
        {
            let _step = info_span!("resolve_background").entered();
            ctx.background = Some(BackgroundSpec::from_task(&ctx.task)?);
        }

        // Step 3: Normalize to PDF
        {
            let _step = info_span!("normalize_pdf").entered();
            self.step_normalize_pdf(ctx)?;
        }

        // Step 4: Rasterize
        {
            let _step = info_span!("rasterize").entered();
            self.step_rasterize(ctx)?;
        }

        // Step 5: Background compositing
        {
            let _step = info_span!("apply_background").entered();
            self.step_apply_background(ctx);
        }

        // Step 6: Persist pages and package
        {
            let _step = info_span!("package").entered();
            self.step_package(ctx)?;
        }

        // Step 7: Finalize
        {
            let _step = info_span!("finalize").entered();
            self.step_finalize(ctx)?;
        }

        Ok(ConversionOutput {
            workspace: workspace(ctx).to_path_buf(),
            archive_path: ctx.archive_path.clone().expect("step 6 completed"),
            original_snapshot: ctx.snapshot_path.clone(),
            expires_at: ctx.expires_at.expect("step 7 completed"),
            page_count: ctx.page_paths.len(),
        })
    }

    fn step_prepare_workspace(
        &self,
        ctx: &mut PipelineContext,
        cleanup: &mut CleanupGuard,
    ) -> Result<(), PipelineError> {
        let task = &ctx.task;
        let format = DocumentFormat::from_path(&task.source_path)
            .or_else(|| DocumentFormat::from_path(Path::new(&task.source_name)))
            .ok_or_else(|| ConversionError::UnsupportedFormat(task.source_name.clone()))?;

        let owner = task.owner_segment();
        let workspace = self
            .store
            .create_workspace(&task.id, &task.source_name, Some(&owner))?;
        cleanup.track_workspace(workspace.clone());
        ctx.workspace = Some(workspace.clone());

        let copy_name = format!("source.{}", format.extension());
        let source_copy = self
            .store
            .copy_into(&task.source_path, &workspace, &copy_name)?;
        cleanup.track(source_copy.clone());

        debug!(
            "Workspace {} for {}",
            sanitize::redact_path(&workspace),
            sanitize::redact_path(&task.source_path)
        );

        ctx.format = Some(format);
        ctx.source_copy = Some(source_copy);
        Ok(())
    }

    fn step_normalize_pdf(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let source = ctx.source_copy.clone().expect("step 1 completed");
        let format = ctx.format.expect("step 1 completed");

        let pdf = if format.needs_office_conversion() {
            let out_dir = workspace(ctx).join(PDF_DIR);
            self.converter
                .convert(&source, &out_dir, self.config.convert_timeout)?
        } else {
            source
        };

        ctx.pdf_path = Some(pdf);
        Ok(())
    }

    fn step_rasterize(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let pdf = ctx.pdf_path.as_deref().expect("step 3 completed");
        let pages = self.rasterizer.rasterize(pdf, ctx.task.dpi)?;
        if pages.is_empty() {
            return Err(ConversionError::NoPages.into());
        }
        debug!("Rasterized {} page(s) at {} dpi", pages.len(), ctx.task.dpi);

        ctx.first_page = pages.first().cloned();
        ctx.pages = pages;
        Ok(())
    }

    fn step_apply_background(&self, ctx: &mut PipelineContext) {
        let spec = ctx.background.as_ref().expect("step 2 completed");
        let pages = std::mem::take(&mut ctx.pages);
        ctx.pages = apply_background(pages, spec, self.config.background_threshold);
    }

    fn step_package(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let workspace = workspace(ctx).to_path_buf();
        let images_dir = workspace.join(IMAGES_DIR);
        std::fs::create_dir_all(&images_dir).map_err(|e| StorageError::CreateDirectory {
            path: images_dir.clone(),
            source: e,
        })?;

        let mut page_paths = Vec::with_capacity(ctx.pages.len());
        for (index, page) in ctx.pages.iter().enumerate() {
            let target = images_dir.join(page_file_name(index + 1));
            save_png(page, &target)?;
            page_paths.push(target);
        }

        let snapshot = match ctx.first_page.take() {
            Some(first) => {
                let target = workspace.join(SNAPSHOT_FILE);
                save_png(&image::DynamicImage::ImageRgb8(first.to_rgb8()), &target)?;
                Some(target)
            }
            None => None,
        };

        let archive = workspace.join(archive_file_name(&ctx.task.id));
        let mut entries: Vec<&Path> = page_paths.iter().map(PathBuf::as_path).collect();
        if let Some(ref snapshot) = snapshot {
            entries.push(snapshot);
        }
        write_archive(&archive, &entries)?;

        write_metadata(
            &workspace,
            &WorkspaceMetadata {
                source: ctx.task.source_name.clone(),
                pages: page_paths.len(),
                dpi: ctx.task.dpi,
                background: ctx.task.background.to_string(),
                generated_at: Utc::now().to_rfc3339(),
                zip_path: file_name(&archive),
                original_snapshot: snapshot.as_deref().map(file_name),
            },
        )?;

        ctx.page_paths = page_paths;
        ctx.snapshot_path = snapshot;
        ctx.archive_path = Some(archive);
        Ok(())
    }

    fn step_finalize(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let expires_at = Utc::now() + self.config.retention;
        self.store.mark_expiry(workspace(ctx), expires_at)?;
        ctx.expires_at = Some(expires_at);
        Ok(())
    }
}

fn workspace(ctx: &PipelineContext) -> &Path {
    ctx.workspace.as_deref().expect("step 1 completed")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn save_png(image: &image::DynamicImage, target: &Path) -> Result<(), ConversionError> {
    image
        .save_with_format(target, ImageFormat::Png)
        .map_err(|e| ConversionError::WriteImage {
            path: target.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Stores `files` flat in a zip, each under its own file name.
fn write_archive(archive: &Path, files: &[&Path]) -> Result<(), ConversionError> {
    let archive_err = |reason: String| ConversionError::Archive {
        path: archive.to_path_buf(),
        reason,
    };

    let file = File::create(archive).map_err(|e| archive_err(e.to_string()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for path in files {
        writer
            .start_file(file_name(path), options)
            .map_err(|e| archive_err(e.to_string()))?;
        let mut source = File::open(path).map_err(|e| archive_err(e.to_string()))?;
        std::io::copy(&mut source, &mut writer).map_err(|e| archive_err(e.to_string()))?;
    }

    writer.finish().map_err(|e| archive_err(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::storage::{read_expiry, read_metadata, EXPIRY_MARKER};
    use crate::task::{BackgroundMode, Owner, TaskStatus};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct FakeConverter {
        calls: Arc<AtomicUsize>,
        missing: bool,
    }

    impl OfficeConverter for FakeConverter {
        fn convert(
            &self,
            source: &Path,
            out_dir: &Path,
            _timeout: Duration,
        ) -> Result<PathBuf, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.missing {
                return Err(ConfigError::ToolMissing {
                    tool: "soffice".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                }
                .into());
            }
            std::fs::create_dir_all(out_dir).unwrap();
            let stem = source.file_stem().unwrap().to_str().unwrap();
            let pdf = out_dir.join(format!("{}.pdf", stem));
            std::fs::write(&pdf, b"%PDF-1.5").unwrap();
            Ok(pdf)
        }
    }

    struct FakeRasterizer {
        pages: usize,
        calls: Arc<AtomicUsize>,
    }

    impl Rasterizer for FakeRasterizer {
        fn rasterize(&self, _pdf: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.pages)
                .map(|_| {
                    let mut img = RgbImage::from_pixel(8, 6, Rgb([255, 255, 255]));
                    img.put_pixel(1, 1, Rgb([0, 0, 0]));
                    DynamicImage::ImageRgb8(img)
                })
                .collect())
        }
    }

    struct Setup {
        _tmp: TempDir,
        uploads: PathBuf,
        results: PathBuf,
        pipeline: Pipeline,
        converter_calls: Arc<AtomicUsize>,
        rasterizer_calls: Arc<AtomicUsize>,
    }

    fn setup(pages: usize, converter_missing: bool) -> Setup {
        let tmp = TempDir::new().unwrap();
        let uploads = tmp.path().join("uploads");
        let results = tmp.path().join("results");
        std::fs::create_dir_all(&uploads).unwrap();

        let config = Arc::new(PipelineConfig {
            result_dir: results.clone(),
            libreoffice_path: PathBuf::from("soffice"),
            pdftoppm_path: PathBuf::from("pdftoppm"),
            convert_timeout: Duration::from_secs(5),
            retention: chrono::Duration::hours(24),
            background_threshold: 235,
        });
        let converter_calls = Arc::new(AtomicUsize::new(0));
        let rasterizer_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            config,
            Box::new(FakeConverter {
                calls: Arc::clone(&converter_calls),
                missing: converter_missing,
            }),
            Box::new(FakeRasterizer {
                pages,
                calls: Arc::clone(&rasterizer_calls),
            }),
        );

        Setup {
            _tmp: tmp,
            uploads,
            results,
            pipeline,
            converter_calls,
            rasterizer_calls,
        }
    }

    fn upload(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"document bytes").unwrap();
        path
    }

    fn owner() -> Owner {
        Owner {
            id: 7,
            email: None,
        }
    }

    fn zip_entries(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    // ── Happy paths ──

    #[test]
    fn test_pdf_single_page() {
        let s = setup(1, false);
        let source = upload(&s.uploads, "upload-1.pdf");
        let task = Task::new(source.clone(), "Report.pdf", 150, owner());
        let mut ctx = PipelineContext::new(task.clone());

        let output = s.pipeline.run(&mut ctx).unwrap();

        assert_eq!(output.page_count, 1);
        assert_eq!(output.workspace, s.results.join("7").join("report"));
        assert_eq!(
            zip_entries(&output.archive_path),
            vec!["page-001-original.png", "page-001.png"]
        );
        assert_eq!(
            output.archive_path.file_name().unwrap().to_str().unwrap(),
            format!("{}.zip", task.id)
        );
        assert!(output.workspace.join("images/page-001.png").exists());
        assert_eq!(
            output.original_snapshot,
            Some(output.workspace.join(SNAPSHOT_FILE))
        );
        assert_eq!(s.converter_calls.load(Ordering::SeqCst), 0);

        // Upload and source copy are gone, the marker is in place.
        assert!(!source.exists());
        assert!(!output.workspace.join("source.pdf").exists());
        let marker = read_expiry(&output.workspace).unwrap();
        assert!((marker - crate::storage::epoch_seconds(output.expires_at)).abs() < 1e-3);
    }

    #[test]
    fn test_docx_goes_through_converter() {
        let s = setup(3, false);
        let source = upload(&s.uploads, "upload-2.docx");
        let task = Task::new(source, "minutes.docx", 144, owner());
        let mut ctx = PipelineContext::new(task);

        let output = s.pipeline.run(&mut ctx).unwrap();

        assert_eq!(s.converter_calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.page_count, 3);
        assert_eq!(zip_entries(&output.archive_path).len(), 4);

        let metadata = read_metadata(&output.workspace).unwrap();
        assert_eq!(metadata.source, "minutes.docx");
        assert_eq!(metadata.pages, 3);
        assert_eq!(metadata.dpi, 144);
        assert_eq!(metadata.background, "none");
        assert_eq!(metadata.original_snapshot.as_deref(), Some(SNAPSHOT_FILE));
    }

    #[test]
    fn test_color_background_applied_to_pages_not_snapshot() {
        let s = setup(1, false);
        let source = upload(&s.uploads, "upload-3.pdf");
        let task = Task::new(source, "color.pdf", 144, owner())
            .with_color_background(Some("#ff0000".to_string()));
        let mut ctx = PipelineContext::new(task);

        let output = s.pipeline.run(&mut ctx).unwrap();

        let page = image::open(output.workspace.join("images/page-001.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(*page.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*page.get_pixel(1, 1), Rgb([0, 0, 0]));

        let snapshot = image::open(output.workspace.join(SNAPSHOT_FILE))
            .unwrap()
            .to_rgb8();
        assert_eq!(*snapshot.get_pixel(0, 0), Rgb([255, 255, 255]));
    }

    // ── Failure paths ──

    #[test]
    fn test_missing_converter_fails_and_cleans_up() {
        let s = setup(1, true);
        let source = upload(&s.uploads, "upload-4.docx");
        let task = Task::new(source.clone(), "letter.docx", 144, owner());
        let mut ctx = PipelineContext::new(task);

        let err = s.pipeline.run(&mut ctx).unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().starts_with("Configuration error:"));
        assert!(!source.exists());
        let workspace = ctx.workspace.unwrap();
        assert!(!workspace.exists());
        assert_eq!(s.rasterizer_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_color_fails_before_rendering() {
        let s = setup(1, false);
        let source = upload(&s.uploads, "upload-5.pdf");
        let task = Task::new(source.clone(), "x.pdf", 144, owner()).with_color_background(None);
        let mut ctx = PipelineContext::new(task);

        let err = s.pipeline.run(&mut ctx).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Conversion(ConversionError::MissingBackgroundColor)
        ));
        assert_eq!(s.rasterizer_calls.load(Ordering::SeqCst), 0);
        assert!(!source.exists());
    }

    #[test]
    fn test_missing_background_image_fails_before_rendering() {
        let s = setup(1, false);
        let source = upload(&s.uploads, "upload-6.pdf");
        let mut task = Task::new(source, "x.pdf", 144, owner());
        task.background = BackgroundMode::Image;
        let mut ctx = PipelineContext::new(task);

        let err = s.pipeline.run(&mut ctx).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Conversion(ConversionError::MissingBackgroundImage)
        ));
        assert_eq!(s.rasterizer_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_background_image_upload_removed() {
        let s = setup(2, false);
        let source = upload(&s.uploads, "upload-7.pdf");
        let bg = s.uploads.join("bg-1.png");
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 200])).save(&bg).unwrap();
        let task = Task::new(source, "x.pdf", 144, owner()).with_image_background(Some(bg.clone()));
        let mut ctx = PipelineContext::new(task);

        s.pipeline.run(&mut ctx).unwrap();

        assert!(!bg.exists());
    }

    #[test]
    fn test_unsupported_format() {
        let s = setup(1, false);
        let source = upload(&s.uploads, "upload-8.txt");
        let task = Task::new(source.clone(), "notes.txt", 144, owner());
        let mut ctx = PipelineContext::new(task);

        let err = s.pipeline.run(&mut ctx).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Conversion(ConversionError::UnsupportedFormat(_))
        ));
        assert!(!source.exists());
    }

    #[test]
    fn test_no_marker_on_failure() {
        let s = setup(0, false);
        let source = upload(&s.uploads, "upload-9.pdf");
        let task = Task::new(source, "empty.pdf", 144, owner());
        let mut ctx = PipelineContext::new(task);

        let err = s.pipeline.run(&mut ctx).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Conversion(ConversionError::NoPages)
        ));
        let workspace = ctx.workspace.unwrap();
        assert!(!workspace.join(EXPIRY_MARKER).exists());
        assert!(!workspace.exists());
    }

    // ── URL helpers ──

    #[test]
    fn test_urls_only_for_completed() {
        let mut task = Task::new(PathBuf::from("a.pdf"), "a.pdf", 144, owner());
        assert!(download_url(&task).is_none());
        assert!(original_snapshot_url(&task).is_none());

        task.status = TaskStatus::Completed(ConversionOutput {
            workspace: PathBuf::from("/r/a"),
            archive_path: PathBuf::from("/r/a/x.zip"),
            original_snapshot: Some(PathBuf::from("/r/a/page-001-original.png")),
            expires_at: Utc::now(),
            page_count: 1,
        });
        assert_eq!(
            download_url(&task),
            Some(format!("/tasks/{}/download", task.id))
        );
        assert_eq!(
            original_snapshot_url(&task),
            Some(format!("/tasks/{}/original", task.id))
        );
    }

    #[test]
    fn test_page_file_name() {
        assert_eq!(page_file_name(1), "page-001.png");
        assert_eq!(page_file_name(42), "page-042.png");
        assert_eq!(page_file_name(1000), "page-1000.png");
    }
}
