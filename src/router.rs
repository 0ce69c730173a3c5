use crate::config::{parse_file_uri_path, Config};
use crate::error::WorkflowError;
use crate::features::requests::SignatureRequest;
use crate::features::review::{
    handle_approve, handle_reject, handle_review_screen, handle_wet_ink_upload, refresh_review,
    render_review_screen,
};
use crate::features::signing::{
    apply_commit_result, handle_page_change, handle_page_step, handle_placement_open,
    handle_pointer_down, handle_pointer_move, handle_pointer_up, handle_signature_clear,
    handle_signature_file, handle_signature_set, handle_viewport, prepare_commit,
    render_placement_screen, CommitJob,
};
use crate::features::submission::{
    handle_method_select, handle_status_lookup, handle_status_screen, handle_submit,
    handle_submit_screen, render_status_screen, render_submit_screen,
};
use crate::features::validation::{
    handle_validate, handle_validate_screen, render_validation_screen,
};
use crate::features::workflow::Workflow;
use crate::features::{feature_catalog, render_menu};
use crate::i18n::{error_message, update_locale};
use crate::state::{AppState, Screen};
use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    os::unix::io::{FromRawFd, RawFd},
    path::Path,
    ptr,
    sync::{mpsc, Arc, Mutex, MutexGuard, OnceLock},
    thread,
};

#[cfg(test)]
use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

/// `init` bindings that change where and how the workflow stores things.
const CONFIG_BINDINGS: [&str; 3] = ["data_dir", "validation_base_url", "qr_size_px"];

struct GlobalState {
    ui: Mutex<AppState>,
    services: Mutex<Option<Arc<Workflow>>>,
    worker: OnceLock<WorkerRuntime>,
    notifications: Mutex<Vec<WorkerResult>>,
}

impl GlobalState {
    const fn new() -> Self {
        Self {
            ui: Mutex::new(AppState::new()),
            services: Mutex::new(None),
            worker: OnceLock::new(),
            notifications: Mutex::new(Vec::new()),
        }
    }

    #[cfg(test)]
    fn ui_lock(&self) -> MutexGuard<'_, AppState> {
        self.ui.lock().expect("ui mutex poisoned")
    }

    #[cfg(test)]
    fn ui_try_lock(&self) -> Option<MutexGuard<'_, AppState>> {
        self.ui.try_lock().ok()
    }

    fn services_lock(&self) -> MutexGuard<'_, Option<Arc<Workflow>>> {
        match self.services.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Opens the workflow from the environment on first use.
    fn services(&self) -> Result<Arc<Workflow>, String> {
        let mut slot = self.services_lock();
        if let Some(workflow) = slot.as_ref() {
            return Ok(Arc::clone(workflow));
        }
        let workflow = Arc::new(open_workflow(Config::from_env())?);
        *slot = Some(Arc::clone(&workflow));
        Ok(workflow)
    }

    fn replace_services(&self, config: Config) -> Result<(), String> {
        let workflow = Arc::new(open_workflow(config)?);
        *self.services_lock() = Some(workflow);
        Ok(())
    }

    fn worker(&self) -> Result<&WorkerRuntime, String> {
        if let Some(worker) = self.worker.get() {
            return Ok(worker);
        }
        let runtime = WorkerRuntime::spawn()?;
        Ok(self.worker.get_or_init(|| runtime))
    }

    fn push_worker_result(&self, result: WorkerResult) {
        if let Ok(mut guard) = self.notifications.lock() {
            guard.push(result);
        }
    }

    fn drain_worker_results(&self) -> Vec<WorkerResult> {
        self.notifications
            .lock()
            .map(|mut q| q.drain(..).collect())
            .unwrap_or_default()
    }
}

fn open_workflow(config: Config) -> Result<Workflow, String> {
    Workflow::open(config).map_err(|e| {
        log::error!("workflow unavailable: {e}");
        error_message(&e)
    })
}

struct WorkerRuntime {
    sender: mpsc::Sender<WorkerJob>,
}

impl WorkerRuntime {
    fn spawn() -> Result<Self, String> {
        let (tx, rx) = mpsc::channel::<WorkerJob>();
        thread::Builder::new()
            .name("signme-worker".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let result = run_worker_job(job);
                    STATE.push_worker_result(result);
                }
            })
            .map_err(|e| format!("worker_spawn_failed:{e}"))?;

        Ok(Self { sender: tx })
    }

    #[cfg(not(test))]
    fn enqueue(&self, job: WorkerJob) -> Result<(), String> {
        self.sender
            .send(job)
            .map_err(|e| format!("worker_send_failed:{e}"))
    }

    #[cfg(test)]
    fn enqueue(&self, job: WorkerJob) -> Result<(), String> {
        if TEST_FORCE_ASYNC_WORKER.load(Ordering::SeqCst) {
            self.sender
                .send(job)
                .map_err(|e| format!("worker_send_failed:{e}"))
        } else {
            let result = run_worker_job(job);
            STATE.push_worker_result(result);
            Ok(())
        }
    }
}

enum WorkerJob {
    Commit {
        workflow: Arc<Workflow>,
        job: CommitJob,
    },
}

enum WorkerResult {
    Commit {
        request_id: String,
        value: Result<SignatureRequest, WorkflowError>,
    },
}

fn run_worker_job(job: WorkerJob) -> WorkerResult {
    match job {
        WorkerJob::Commit { workflow, job } => {
            test_worker_delay();
            let value = job.run(&workflow);
            if let Err(e) = &value {
                log::warn!("commit for {} failed: {e}", job.request_id);
            }
            WorkerResult::Commit {
                request_id: job.request_id,
                value,
            }
        }
    }
}

static STATE: GlobalState = GlobalState::new();

#[cfg(test)]
static TEST_FORCE_ASYNC_WORKER: AtomicBool = AtomicBool::new(false);

#[cfg(test)]
static TEST_WORKER_DELAY_MS: AtomicU64 = AtomicU64::new(0);

#[cfg(test)]
fn test_worker_delay() {
    let delay = TEST_WORKER_DELAY_MS.load(Ordering::SeqCst);
    if delay > 0 {
        thread::sleep(Duration::from_millis(delay));
    }
}

#[cfg(not(test))]
fn test_worker_delay() {}

#[derive(Deserialize, Default)]
struct Command {
    action: String,
    path: Option<String>,
    fd: Option<i32>,
    error: Option<String>,
    target: Option<String>,
    bindings: Option<HashMap<String, String>>,
    snapshot: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    page: Option<usize>,
}

#[derive(Debug)]
struct FdHandle(Option<i32>);

impl FdHandle {
    fn new(fd: Option<i32>) -> Self {
        Self(fd)
    }

    fn take(&mut self) -> Option<i32> {
        self.0.take()
    }
}

impl Drop for FdHandle {
    fn drop(&mut self) {
        if let Some(fd) = self.0.take() {
            unsafe { File::from_raw_fd(fd as RawFd) };
        }
    }
}

/// A file handed over by the host picker, as a descriptor or a path.
#[derive(Debug)]
struct FileInput {
    fd: FdHandle,
    path: Option<String>,
    name: Option<String>,
    error: Option<String>,
}

#[derive(Debug)]
enum Action {
    Init {
        bindings: HashMap<String, String>,
    },
    Reset,
    Back,
    Home,
    Snapshot,
    Restore {
        snapshot: String,
    },
    SetLocale {
        locale: String,
    },
    SubmitScreen,
    SubmitMethod {
        method: Option<String>,
    },
    Submit {
        bindings: HashMap<String, String>,
        file: FileInput,
    },
    StatusScreen,
    StatusLookup {
        bindings: HashMap<String, String>,
    },
    ReviewScreen,
    ReviewApprove {
        id: Option<String>,
    },
    ReviewReject {
        id: Option<String>,
        bindings: HashMap<String, String>,
    },
    WetInkUpload {
        id: Option<String>,
        file: FileInput,
    },
    PlacementOpen {
        id: Option<String>,
    },
    PlacementViewport {
        width: f64,
        height: f64,
    },
    PlacementPage {
        page: usize,
    },
    PlacementPageStep {
        forward: bool,
    },
    PointerDown {
        x: f64,
        y: f64,
    },
    PointerMove {
        x: f64,
        y: f64,
    },
    PointerUp,
    PlacementSignatureStore {
        reference: String,
    },
    PlacementSignatureLoad {
        file: FileInput,
    },
    PlacementSignatureClear,
    PlacementCommit {
        signature: Option<String>,
    },
    ValidateScreen,
    Validate {
        token: Option<String>,
    },
}

impl Action {
    /// Host housekeeping and pointer traffic keep the current banners.
    fn is_passive(&self) -> bool {
        matches!(
            self,
            Action::Init { .. }
                | Action::Snapshot
                | Action::PlacementViewport { .. }
                | Action::PointerDown { .. }
                | Action::PointerMove { .. }
                | Action::PointerUp
        )
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_action(command: Command) -> Result<Action, String> {
    let Command {
        action,
        path,
        fd,
        error,
        target,
        bindings,
        snapshot,
        x,
        y,
        width,
        height,
        page,
    } = command;

    let bindings = bindings.unwrap_or_default();
    let file = |fd: Option<i32>, path: Option<String>, error: Option<String>| FileInput {
        fd: FdHandle::new(fd),
        path,
        name: non_empty(bindings.get("file_name")),
        error,
    };
    let pointer = || match (x, y) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err("missing_pointer_coordinates".to_string()),
    };

    match action.as_str() {
        "init" => Ok(Action::Init { bindings }),
        "reset" => Ok(Action::Reset),
        "back" => Ok(Action::Back),
        "home" => Ok(Action::Home),
        "snapshot" => Ok(Action::Snapshot),
        "restore_state" => snapshot
            .map(|snapshot| Action::Restore { snapshot })
            .ok_or_else(|| "missing_snapshot".into()),
        "set_locale" => non_empty(bindings.get("locale"))
            .or(target)
            .map(|locale| Action::SetLocale { locale })
            .ok_or_else(|| "missing_locale".into()),
        "submit_screen" => Ok(Action::SubmitScreen),
        "submit_method" => Ok(Action::SubmitMethod { method: target }),
        "submit" => Ok(Action::Submit {
            file: file(fd, path, error),
            bindings,
        }),
        "status_screen" => Ok(Action::StatusScreen),
        "status_lookup" => Ok(Action::StatusLookup { bindings }),
        "review_screen" => Ok(Action::ReviewScreen),
        "review_approve" => Ok(Action::ReviewApprove { id: target }),
        "review_reject" => Ok(Action::ReviewReject {
            id: target,
            bindings,
        }),
        "wet_ink_upload" => Ok(Action::WetInkUpload {
            file: file(fd, path, error),
            id: target,
        }),
        "placement_open" => Ok(Action::PlacementOpen { id: target }),
        "placement_viewport" => match (width, height) {
            (Some(width), Some(height)) => Ok(Action::PlacementViewport { width, height }),
            _ => Err("missing_viewport_size".into()),
        },
        "placement_page" => page
            .map(|page| Action::PlacementPage { page })
            .ok_or_else(|| "missing_page".into()),
        "placement_page_prev" => Ok(Action::PlacementPageStep { forward: false }),
        "placement_page_next" => Ok(Action::PlacementPageStep { forward: true }),
        "pointer_down" => pointer().map(|(x, y)| Action::PointerDown { x, y }),
        "pointer_move" => pointer().map(|(x, y)| Action::PointerMove { x, y }),
        "pointer_up" => Ok(Action::PointerUp),
        "placement_signature_store" => non_empty(bindings.get("signature_base64"))
            .map(|reference| Action::PlacementSignatureStore { reference })
            .ok_or_else(|| "missing_signature".into()),
        "placement_signature_load" => Ok(Action::PlacementSignatureLoad {
            file: file(fd, path, error),
        }),
        "placement_signature_clear" => Ok(Action::PlacementSignatureClear),
        "placement_commit" => Ok(Action::PlacementCommit {
            signature: non_empty(bindings.get("signature_base64")),
        }),
        "validate_screen" => Ok(Action::ValidateScreen),
        "validate" => Ok(Action::Validate {
            token: target.or_else(|| non_empty(bindings.get("validation_token"))),
        }),
        other => {
            // Ensure fd is closed even on unknown actions.
            drop(FdHandle::new(fd));
            Err(error.unwrap_or_else(|| format!("unknown_action:{other}")))
        }
    }
}

fn read_bytes_from_fd(fd: RawFd) -> Result<Vec<u8>, String> {
    if fd < 0 {
        return Err("invalid_fd".into());
    }

    let mut file = unsafe { File::from_raw_fd(fd) };
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| format!("read_failed:{e}"))?;
    Ok(contents)
}

/// Bytes plus a file name usable as a default document name.
fn read_file_input(mut input: FileInput) -> Result<(Vec<u8>, Option<String>), String> {
    if let Some(err) = input.error.take() {
        return Err(err);
    }
    let name = input.name.take().or_else(|| {
        input
            .path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string)
    });
    if let Some(fd) = input.fd.take() {
        return read_bytes_from_fd(fd as RawFd).map(|bytes| (bytes, name));
    }
    let path = input.path.as_deref().ok_or("missing_file")?;
    let resolved = parse_file_uri_path(path).unwrap_or_else(|| path.into());
    std::fs::read(&resolved)
        .map(|bytes| (bytes, name))
        .map_err(|e| format!("read_failed:{e}"))
}

#[no_mangle]
pub extern "system" fn Java_app_signme_MainActivity_dispatch(
    mut env: JNIEnv,
    _class: JClass,
    input: JString,
) -> jstring {
    let response = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let input_str: String = env
            .get_string(&input)
            .map(|s| s.into())
            .unwrap_or_else(|_| "{}".to_string());

        let command: Command = serde_json::from_str(&input_str).unwrap_or(Command {
            action: "error".into(),
            error: Some("invalid_json".into()),
            ..Command::default()
        });

        handle_command(command)
    }));

    let json_value = match response {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => error_ui(&err),
        Err(_) => {
            log::error!("dispatch panicked");
            error_ui("panic")
        }
    };

    let output_string = json_value.to_string();
    match env.new_string(output_string) {
        Ok(java_str) => java_str.into_raw(),
        Err(_) => {
            let fallback = error_ui("jni_new_string_failed").to_string();
            env.new_string(fallback)
                .map(|s| s.into_raw())
                .unwrap_or(ptr::null_mut())
        }
    }
}

fn with_services(state: &mut AppState, f: impl FnOnce(&mut AppState, &Workflow)) {
    match STATE.services() {
        Ok(workflow) => f(state, &workflow),
        Err(e) => state.last_error = Some(e),
    }
}

fn handle_init(state: &mut AppState, bindings: &HashMap<String, String>) {
    if let Some(locale) = bindings.get("locale") {
        update_locale(state, locale);
    }
    if CONFIG_BINDINGS.iter().any(|k| bindings.contains_key(*k)) {
        let config = Config::from_env().apply_bindings(bindings);
        log::info!("init with data dir {}", config.data_dir.display());
        if let Err(e) = STATE.replace_services(config) {
            state.last_error = Some(e);
        }
    }
}

fn enqueue_commit(state: &mut AppState, signature: Option<String>) {
    if let Some(reference) = signature {
        if !handle_signature_set(state, &reference) {
            return;
        }
    }
    let job = match prepare_commit(state) {
        Ok(job) => job,
        Err(msg) => {
            state.last_error = Some(msg);
            return;
        }
    };
    let queued = STATE.services().and_then(|workflow| {
        STATE
            .worker()?
            .enqueue(WorkerJob::Commit { workflow, job })
    });
    if let Err(e) = queued {
        state.placement.commit_in_flight = false;
        state.last_error = Some(e);
    }
}

fn handle_command(command: Command) -> Result<Value, String> {
    let action = parse_action(command);

    let mut state = match STATE.ui.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    state.ensure_navigation();

    let action = match action {
        Ok(action) => action,
        Err(err) => {
            state.last_error = Some(err);
            apply_worker_results(&mut state);
            return Ok(render_ui(&state));
        }
    };
    if !action.is_passive() {
        state.clear_banners();
    }
    apply_worker_results(&mut state);

    match action {
        Action::Init { bindings } => handle_init(&mut state, &bindings),
        Action::Snapshot => {
            let snap =
                serde_json::to_string(&*state).map_err(|e| format!("snapshot_failed:{e}"))?;
            return Ok(json!({
                "type": "Snapshot",
                "snapshot": snap
            }));
        }
        Action::Restore { snapshot } => match serde_json::from_str::<AppState>(&snapshot) {
            Ok(mut restored) => {
                restored.ensure_navigation();
                // A job from before the snapshot cannot be tracked any more.
                restored.placement.commit_in_flight = false;
                let locale = restored.locale.clone();
                *state = restored;
                update_locale(&mut state, &locale);
            }
            Err(e) => {
                state.last_error = Some(format!("restore_failed:{e}"));
            }
        },
        Action::Reset => {
            state.reset_runtime();
            state.reset_navigation();
        }
        Action::Back => {
            state.pop_screen();
        }
        Action::Home => state.reset_navigation(),
        Action::SetLocale { locale } => update_locale(&mut state, &locale),
        Action::SubmitScreen => handle_submit_screen(&mut state),
        Action::SubmitMethod { method } => handle_method_select(&mut state, method.as_deref()),
        Action::Submit { bindings, file } => match read_file_input(file) {
            Ok((bytes, name)) => with_services(&mut state, |state, workflow| {
                handle_submit(state, workflow, &bindings, &bytes, name.as_deref())
            }),
            Err(e) => state.last_error = Some(e),
        },
        Action::StatusScreen => handle_status_screen(&mut state),
        Action::StatusLookup { bindings } => with_services(&mut state, |state, workflow| {
            handle_status_lookup(state, workflow, &bindings)
        }),
        Action::ReviewScreen => with_services(&mut state, handle_review_screen),
        Action::ReviewApprove { id } => with_services(&mut state, |state, workflow| {
            handle_approve(state, workflow, id.as_deref())
        }),
        Action::ReviewReject { id, bindings } => with_services(&mut state, |state, workflow| {
            handle_reject(state, workflow, id.as_deref(), &bindings)
        }),
        Action::WetInkUpload { id, file } => match read_file_input(file) {
            Ok((bytes, _)) => with_services(&mut state, |state, workflow| {
                handle_wet_ink_upload(state, workflow, id.as_deref(), &bytes)
            }),
            Err(e) => state.last_error = Some(e),
        },
        Action::PlacementOpen { id } => with_services(&mut state, |state, workflow| {
            handle_placement_open(state, workflow, id.as_deref())
        }),
        Action::PlacementViewport { width, height } => handle_viewport(&mut state, width, height),
        Action::PlacementPage { page } => with_services(&mut state, |state, workflow| {
            handle_page_change(state, workflow, page)
        }),
        Action::PlacementPageStep { forward } => with_services(&mut state, |state, workflow| {
            handle_page_step(state, workflow, forward)
        }),
        Action::PointerDown { x, y } => handle_pointer_down(&mut state, x, y),
        Action::PointerMove { x, y } => handle_pointer_move(&mut state, x, y),
        Action::PointerUp => handle_pointer_up(&mut state),
        Action::PlacementSignatureStore { reference } => {
            handle_signature_set(&mut state, &reference);
        }
        Action::PlacementSignatureLoad { file } => match read_file_input(file) {
            Ok((bytes, name)) => handle_signature_file(&mut state, &bytes, name.as_deref()),
            Err(e) => state.last_error = Some(e),
        },
        Action::PlacementSignatureClear => handle_signature_clear(&mut state),
        Action::PlacementCommit { signature } => enqueue_commit(&mut state, signature),
        Action::ValidateScreen => handle_validate_screen(&mut state),
        Action::Validate { token } => with_services(&mut state, |state, workflow| {
            handle_validate(state, workflow, token.as_deref())
        }),
    }

    // The test worker runs jobs inline; pick their results up right away.
    apply_worker_results(&mut state);
    Ok(render_ui(&state))
}

fn error_ui(message: &str) -> Value {
    json!({
        "type": "Column",
        "padding": 24,
        "children": [
            { "type": "Text", "text": rust_i18n::t!("common.error_title"), "size": 18.0 },
            { "type": "Text", "text": message }
        ]
    })
}

fn render_ui(state: &AppState) -> Value {
    match state.current_screen() {
        Screen::Home => render_menu(state, &feature_catalog()),
        Screen::Submit => render_submit_screen(state),
        Screen::Status => render_status_screen(state),
        Screen::Review => render_review_screen(state),
        Screen::Placement => render_placement_screen(state),
        Screen::Validate => render_validation_screen(state),
    }
}

fn apply_worker_results(state: &mut AppState) {
    let mut signed_any = false;
    for result in STATE.drain_worker_results() {
        match result {
            WorkerResult::Commit { request_id, value } => {
                let value = value.map_err(|e| error_message(&e));
                signed_any |= apply_commit_result(state, &request_id, value);
            }
        }
    }
    if signed_any && state.current_screen() == Screen::Review {
        with_services(state, refresh_review);
    }
}
