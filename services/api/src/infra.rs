use chrono::NaiveDate;
use directory_billing::billing::{
    DirectorySeed, FileStore, FileStoreError, FixtureError, InMemoryStore, Notification,
    NotificationError, NotificationSender, ProofUpload,
};
use directory_billing::config::BillingConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const BUILT_IN_DIRECTORY: &str = include_str!("../fixtures/directory.json");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Seeds the store from `APP_SEED_PATH` when set, else from the bundled directory.
pub(crate) fn load_store(config: &BillingConfig) -> Result<InMemoryStore, FixtureError> {
    let seed = match &config.seed_path {
        Some(path) => {
            info!(path = %path.display(), "loading directory seed");
            DirectorySeed::from_path(path)?
        }
        None => built_in_seed()?,
    };
    Ok(InMemoryStore::from_seed(seed))
}

pub(crate) fn built_in_seed() -> Result<DirectorySeed, FixtureError> {
    DirectorySeed::from_json(BUILT_IN_DIRECTORY)
}

/// Writes proof images under a local directory with generated file names.
#[derive(Debug, Default, Clone)]
pub(crate) struct LocalFileStore;

impl LocalFileStore {
    fn extension(upload: &ProofUpload) -> String {
        let from_name = upload
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| mime_guess::from_ext(ext).first().is_some_and(|guess| {
                guess.essence_str() == upload.content_type.trim()
            }));
        match from_name {
            Some(ext) => ext.to_ascii_lowercase(),
            None => mime_guess::get_mime_extensions_str(upload.content_type.trim())
                .and_then(|candidates| candidates.first())
                .map(|ext| ext.to_string())
                .unwrap_or_else(|| "bin".to_string()),
        }
    }
}

impl FileStore for LocalFileStore {
    fn save(&self, upload: &ProofUpload, directory: &str) -> Result<String, FileStoreError> {
        let write_error = |reason: String| FileStoreError::Write {
            directory: directory.to_string(),
            reason,
        };
        fs::create_dir_all(directory).map_err(|err| write_error(err.to_string()))?;

        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), Self::extension(upload));
        let path: PathBuf = Path::new(directory).join(file_name);
        fs::write(&path, &upload.bytes).map_err(|err| write_error(err.to_string()))?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn remove(&self, path: &str) -> Result<(), FileStoreError> {
        fs::remove_file(path).map_err(|err| FileStoreError::Remove {
            path: path.to_string(),
            reason: err.to_string(),
        })
    }
}

/// Emits notifications as structured log events.
#[derive(Debug, Default, Clone)]
pub(crate) struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Keeps notifications for the demo transcript.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryOutbox {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationSender for InMemoryOutbox {
    fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let mut guard = self
            .sent
            .lock()
            .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))?;
        guard.push(notification.clone());
        Ok(())
    }
}

impl InMemoryOutbox {
    pub(crate) fn drain(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => {
                warn!("outbox lock poisoned; dropping transcript");
                Vec::new()
            }
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
