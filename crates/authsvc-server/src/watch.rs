use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use authsvc_introspect::{KeyStore, KeysConfig, load_key_set};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tracing::{error, info, warn};

use crate::config::loader;

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watch a single file and call `reload` when it changes, at most once per debounce window.
///
/// The parent directory is watched so that editors which replace the file
/// atomically are still noticed. `reload` returns `true` when it applied the
/// new content; a failed reload does not consume the debounce window, so the
/// next event (e.g. the end of a partial write) tries again.
///
/// Returns a join handle for the thread that keeps the watcher alive.
pub fn start_file_watcher<F>(path: PathBuf, reload: F) -> Option<std::thread::JoinHandle<()>>
where
    F: Fn(&Path) -> bool + Send + 'static,
{
    if !path.exists() {
        warn!(path = %path.display(), "watched file does not exist; watcher disabled");
        return None;
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().map(|n| n.to_os_string());

    let handle = std::thread::spawn(move || {
        let last_reload: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let target = path.clone();

        let mut watcher = match recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let touches_target = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_target {
                        return;
                    }
                    let Ok(mut last) = last_reload.lock() else {
                        return;
                    };
                    let now = Instant::now();
                    let due = last.is_none_or(|t| now.duration_since(t) >= DEBOUNCE);
                    if due && reload(target.as_path()) {
                        *last = Some(now);
                    }
                }
                Err(e) => error!("watch error: {}", e),
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                error!("failed to start file watcher: {}", e);
                return;
            }
        };

        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            error!(path = %dir.display(), "failed to watch directory: {}", e);
            return;
        }

        // Keep thread alive forever
        loop {
            std::thread::park();
        }
    });

    Some(handle)
}

/// Rebuild the key set from `keys` and publish it if it is non-empty and valid.
///
/// Returns the new generation, or `None` if the old set was kept.
pub fn reload_keys(keys: &KeysConfig, store: &KeyStore) -> Option<u64> {
    match load_key_set(keys) {
        Ok(set) if set.is_empty() => {
            warn!("key reload produced an empty key set; keeping current keys");
            None
        }
        Ok(set) => {
            let count = set.len();
            let generation = store.replace(set);
            info!(generation, keys = count, "verification keys reloaded");
            Some(generation)
        }
        Err(e) => {
            error!(error = %e, "key reload failed; keeping current keys");
            None
        }
    }
}

/// Watch the JWKS file named in `keys` and republish the whole key set on change.
pub fn start_key_watcher(
    keys: KeysConfig,
    store: Arc<KeyStore>,
) -> Option<std::thread::JoinHandle<()>> {
    let jwks = keys.jwks_file.as_ref().filter(|j| j.watch)?;
    let path = jwks.path.clone();
    info!(path = %path.display(), "watching JWKS file for key rotation");
    start_file_watcher(path, move |_| reload_keys(&keys, &store).is_some())
}

/// Watch the configuration file and apply hot-reloadable settings (the logging level).
pub fn start_config_watcher(path: PathBuf) -> Option<std::thread::JoinHandle<()>> {
    start_file_watcher(path, |changed| match loader::load_config(changed.to_str()) {
        Ok(new_cfg) => {
            crate::observability::apply_logging_level(&new_cfg.logging.level);
            info!("configuration reloaded successfully");
            true
        }
        Err(e) => {
            error!("configuration reload failed: {}", e);
            false
        }
    })
}
