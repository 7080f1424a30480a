use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::models::{
    FieldBinding, SelectionMode, TaskEvent, TaskSnapshot, UploadSource, UploadStatus,
    transfer_percentage,
};
use crate::services::form::FormStateStore;
use crate::services::presign::UrlIssuer;
use crate::services::transfer::{ProgressFn, TransferSink};
use crate::utils::path::destination_path;

/// Identity of one upload attempt. Resubmitting a file name supersedes the
/// previous attempt; events carrying a stale attempt id fall through.
type AttemptId = u64;

struct ActiveTask {
    attempt: AttemptId,
    destination_path: String,
    token: CancellationToken,
}

#[derive(Default)]
struct Registry {
    /// Active Task Registry: one entry per in-flight upload.
    tasks: HashMap<String, ActiveTask>,
    /// Progress Registry: integer percentage per file, absent before the
    /// first tick, non-decreasing while the task is active.
    progress: HashMap<String, u8>,
    /// Last known status per submitted file.
    statuses: HashMap<String, UploadStatus>,
    next_attempt: AttemptId,
}

struct Inner {
    binding: FieldBinding,
    config: UploaderConfig,
    form: Arc<dyn FormStateStore>,
    issuer: Arc<dyn UrlIssuer>,
    sink: Arc<dyn TransferSink>,
    registry: Mutex<Registry>,
    active_count: watch::Sender<usize>,
}

/// Drives batches of uploads for one form field.
///
/// The submission loop is sequential: each file awaits its pre-signed URL
/// before the next file starts. The transfers themselves are spawned and
/// overlap freely. Every task state change funnels through [`transition`],
/// the only place Active Task Registry entries are removed.
///
/// [`transition`]: UploadCoordinator::transition
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<Inner>,
}

impl UploadCoordinator {
    pub fn new(
        binding: FieldBinding,
        config: UploaderConfig,
        form: Arc<dyn FormStateStore>,
        issuer: Arc<dyn UrlIssuer>,
        sink: Arc<dyn TransferSink>,
    ) -> Self {
        let (active_count, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                binding,
                config,
                form,
                issuer,
                sink,
                registry: Mutex::new(Registry::default()),
                active_count,
            }),
        }
    }

    /// Submits a batch of files for upload. Fire and forget: issuance and
    /// transfer failures surface per file through the status and the form
    /// store's error slot, never as a batch error.
    pub async fn submit_batch(&self, files: Vec<UploadSource>) {
        if files.is_empty() {
            return;
        }

        info!(
            "📤 Submitting {} file(s) under prefix '{}'",
            files.len(),
            self.inner.binding.prefix
        );
        self.record_selection(&files);

        for source in files {
            self.submit_one(source).await;
        }
    }

    /// Cancels the upload for `file_name`, if one is active.
    ///
    /// The file always leaves the form's selection, task or no task. Unknown
    /// names and repeated calls are no-ops.
    pub fn cancel(&self, file_name: &str) {
        let binding = &self.inner.binding;
        let selection: Vec<String> = self
            .inner
            .form
            .selection(&binding.field)
            .into_iter()
            .filter(|name| name != file_name)
            .collect();
        self.inner.form.set_selection(&binding.field, selection);

        let attempt = {
            let registry = self.lock_registry();
            registry.tasks.get(file_name).map(|task| task.attempt)
        };
        match attempt {
            Some(attempt) => self.transition(file_name, attempt, TaskEvent::Canceled),
            None => debug!("Cancel of '{}' ignored: no active task", file_name),
        }
    }

    /// Number of in-flight uploads.
    pub fn active_count(&self) -> usize {
        self.lock_registry().tasks.len()
    }

    /// Whether an upload for `file_name` is in flight.
    pub fn has_active(&self, file_name: &str) -> bool {
        self.lock_registry().tasks.contains_key(file_name)
    }

    /// Last recorded progress percentage for `file_name`.
    pub fn progress_of(&self, file_name: &str) -> Option<u8> {
        self.lock_registry().progress.get(file_name).copied()
    }

    /// Last recorded status for `file_name`.
    pub fn status_of(&self, file_name: &str) -> Option<UploadStatus> {
        self.lock_registry().statuses.get(file_name).copied()
    }

    /// Snapshot of every submitted file, ordered by name.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let registry = self.lock_registry();
        let mut snapshots: Vec<TaskSnapshot> = registry
            .statuses
            .iter()
            .map(|(file_name, status)| TaskSnapshot {
                file_name: file_name.clone(),
                status: *status,
                progress: registry.progress.get(file_name).copied(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        snapshots
    }

    /// Resolves once no uploads are in flight.
    pub async fn wait_idle(&self) {
        let mut active = self.inner.active_count.subscribe();
        let _ = active.wait_for(|count| *count == 0).await;
    }

    pub fn binding(&self) -> &FieldBinding {
        &self.inner.binding
    }

    fn record_selection(&self, files: &[UploadSource]) {
        let field = &self.inner.binding.field;
        match self.inner.binding.mode {
            SelectionMode::Single => {
                if let Some(first) = files.first() {
                    self.inner
                        .form
                        .set_selection(field, vec![first.file_name.clone()]);
                }
            }
            SelectionMode::Multiple => {
                let mut selection = self.inner.form.selection(field);
                for source in files {
                    if !selection.contains(&source.file_name) {
                        selection.push(source.file_name.clone());
                    }
                }
                self.inner.form.set_selection(field, selection);
            }
        }
    }

    async fn submit_one(&self, source: UploadSource) {
        let file_name = source.file_name.clone();
        let dest = destination_path(&self.inner.binding.prefix, &file_name);

        let (attempt, token) = self.register(&file_name, &dest);
        debug!("Queued upload of '{}' to '{}'", file_name, dest);

        let total_bytes = match source.size_bytes().await {
            Ok(size) if size > self.inner.config.max_file_size => {
                self.transition(
                    &file_name,
                    attempt,
                    TaskEvent::Failed(UploadError::TooLarge {
                        size,
                        limit: self.inner.config.max_file_size,
                    }),
                );
                return;
            }
            Ok(size) => size,
            Err(err) => {
                self.transition(&file_name, attempt, TaskEvent::Failed(err));
                return;
            }
        };

        // Issuance is awaited inline: submissions are sequential over the
        // issuer while the spawned transfers overlap. A cancel or resubmission
        // landing here aborts the request; the registry entry is already gone
        // by the time the token fires.
        let url = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = self.inner.issuer.issue(&dest) => {
                match result {
                    Ok(url) => url,
                    Err(err) => {
                        self.transition(&file_name, attempt, TaskEvent::Failed(err));
                        return;
                    }
                }
            }
        };

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator
                .run_transfer(source, url, total_bytes, attempt, token)
                .await;
        });
    }

    async fn run_transfer(
        &self,
        source: UploadSource,
        url: String,
        total_bytes: u64,
        attempt: AttemptId,
        token: CancellationToken,
    ) {
        let file_name = source.file_name.clone();
        let progress = self.progress_fn(&file_name, attempt);

        debug!("Transferring '{}' ({} bytes)", file_name, total_bytes);
        let result = self
            .inner
            .sink
            .send(&url, &source, total_bytes, progress, token)
            .await;

        match result {
            // the sink's final tick normally completed the task already
            Ok(()) => self.transition(&file_name, attempt, TaskEvent::Completed),
            Err(UploadError::Canceled) => {
                self.transition(&file_name, attempt, TaskEvent::Canceled)
            }
            Err(err) => self.transition(&file_name, attempt, TaskEvent::Failed(err)),
        }
    }

    fn progress_fn(&self, file_name: &str, attempt: AttemptId) -> ProgressFn {
        let coordinator = self.clone();
        let file_name = file_name.to_string();
        Arc::new(move |sent, total| {
            coordinator.transition(
                &file_name,
                attempt,
                TaskEvent::Progress(transfer_percentage(sent, total)),
            );
        })
    }

    /// Registers a fresh cancellation handle for `file_name`, superseding any
    /// attempt still in flight under that name.
    fn register(&self, file_name: &str, dest: &str) -> (AttemptId, CancellationToken) {
        let token = CancellationToken::new();
        let mut registry = self.lock_registry();

        if let Some(previous) = registry.tasks.remove(file_name) {
            warn!("♻️  Restarting in-flight upload of '{}'", file_name);
            previous.token.cancel();
        }

        registry.next_attempt += 1;
        let attempt = registry.next_attempt;
        registry.tasks.insert(
            file_name.to_string(),
            ActiveTask {
                attempt,
                destination_path: dest.to_string(),
                token: token.clone(),
            },
        );
        // a fresh attempt starts with an unset progress slot
        registry.progress.remove(file_name);
        registry
            .statuses
            .insert(file_name.to_string(), UploadStatus::InFlight);
        self.publish_active_count(&registry);
        drop(registry);

        self.inner
            .form
            .clear_error(&self.inner.binding.field, file_name);
        (attempt, token)
    }

    /// Single funnel for task state changes. Registry entries leave here and
    /// nowhere else; events for a superseded or finished attempt are ignored.
    fn transition(&self, file_name: &str, attempt: AttemptId, event: TaskEvent) {
        match event {
            TaskEvent::Progress(pct) if pct < 100 => {
                let mut registry = self.lock_registry();
                if !Self::is_current(&registry, file_name, attempt) {
                    return;
                }
                let entry = registry.progress.entry(file_name.to_string()).or_insert(0);
                // ticks never regress while a task is active
                if pct > *entry {
                    *entry = pct;
                }
            }
            TaskEvent::Progress(_) | TaskEvent::Completed => {
                let dest = {
                    let registry = self.lock_registry();
                    match registry.tasks.get(file_name) {
                        Some(task) if task.attempt == attempt => {
                            task.destination_path.clone()
                        }
                        _ => return,
                    }
                };

                // The path lands in the form store before the 100 shows up in
                // the progress registry: an observer that sees 100 can always
                // resolve the destination path.
                self.merge_path(file_name, &dest);

                {
                    let mut registry = self.lock_registry();
                    // a resubmission may have claimed the name while the path
                    // merge ran; its slots are not ours to touch anymore
                    if !Self::is_current(&registry, file_name, attempt) {
                        return;
                    }
                    registry.progress.insert(file_name.to_string(), 100);
                    registry
                        .statuses
                        .insert(file_name.to_string(), UploadStatus::Complete);
                    // the entry leaves last: once the registry reads idle,
                    // every completion write is already readable
                    registry.tasks.remove(file_name);
                    self.publish_active_count(&registry);
                }

                info!("✅ Upload complete: '{}' -> '{}'", file_name, dest);
            }
            TaskEvent::Failed(err) => {
                {
                    let registry = self.lock_registry();
                    if !Self::is_current(&registry, file_name, attempt) {
                        return;
                    }
                }

                // the error slot fills before the terminal status shows up
                warn!("⚠️  Upload of '{}' failed: {}", file_name, err);
                self.inner
                    .form
                    .set_error(&self.inner.binding.field, file_name, &err.to_string());

                let mut registry = self.lock_registry();
                if !Self::is_current(&registry, file_name, attempt) {
                    return;
                }
                registry
                    .statuses
                    .insert(file_name.to_string(), UploadStatus::Failed);
                registry.tasks.remove(file_name);
                self.publish_active_count(&registry);
            }
            TaskEvent::Canceled => {
                let task = {
                    let mut registry = self.lock_registry();
                    if !Self::is_current(&registry, file_name, attempt) {
                        return;
                    }
                    let task = registry.tasks.remove(file_name);
                    if task.is_some() {
                        registry
                            .statuses
                            .insert(file_name.to_string(), UploadStatus::Canceled);
                        self.publish_active_count(&registry);
                    }
                    task
                };
                if let Some(task) = task {
                    task.token.cancel();
                    info!("🚫 Upload of '{}' canceled", file_name);
                }
            }
        }
    }

    fn merge_path(&self, file_name: &str, dest: &str) {
        let path_field = &self.inner.binding.path_field;
        let mut paths = self.inner.form.path_map(path_field);
        paths.insert(file_name.to_string(), dest.to_string());
        self.inner.form.set_path_map(path_field, paths);
    }

    fn is_current(registry: &Registry, file_name: &str, attempt: AttemptId) -> bool {
        registry
            .tasks
            .get(file_name)
            .is_some_and(|task| task.attempt == attempt)
    }

    fn publish_active_count(&self, registry: &Registry) {
        self.inner.active_count.send_replace(registry.tasks.len());
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap()
    }
}
