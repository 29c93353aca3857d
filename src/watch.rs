use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use notify::{EventKind, RecursiveMode, Watcher};

/// Signals once per relevant filesystem event on the terrain config file.
pub fn spawn_config_watcher(path: &Path) -> Receiver<()> {
    let (tx, rx) = unbounded::<()>();
    let path: PathBuf = path.to_path_buf();
    let spawned = thread::Builder::new()
        .name("hexterra-watch".into())
        .spawn(move || {
            let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    match event.kind {
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any => {
                            let _ = tx.send(());
                        }
                        _ => {}
                    }
                }
            });
            let mut watcher = match watcher {
                Ok(w) => w,
                Err(e) => {
                    log::warn!("config watcher unavailable: {}", e);
                    return;
                }
            };
            if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                log::warn!("cannot watch {}: {}", path.display(), e);
                return;
            }
            log::info!("watching {} for terrain changes", path.display());
            loop {
                thread::sleep(Duration::from_secs(3600));
            }
        });
    if let Err(e) = spawned {
        log::warn!("failed to start config watcher: {}", e);
    }
    rx
}
