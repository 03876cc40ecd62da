use crate::prelude::*;
use crate::subject::lock;

use chrono::Utc;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Appends one JSON line per device publish: a timestamp, the device count
/// and every mobile value.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    file: Arc<Mutex<std::fs::File>>,
    path: String,
    lines_written: Arc<Mutex<u64>>,
}

impl SnapshotWriter {
    pub fn new(path: &str) -> Result<Self> {
        info!("Opening snapshot file at {}", path);

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => return Err(file_error!("Failed to open snapshot file {}: {}", path, e)),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)) {
                error!("Failed to set permissions on snapshot file {}: {}", path, e);
                return Err(e.into());
            }
        }

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_string(),
            lines_written: Arc::new(Mutex::new(0)),
        })
    }

    pub fn write_snapshot(
        &self,
        device_count: usize,
        mobile: &BTreeMap<String, ChannelValue>,
    ) -> Result<()> {
        let line = serde_json::json!({
            "utc_timestamp": Utc::now().timestamp(),
            "devices": device_count,
            "mobile": mobile,
        });
        let json_string = serde_json::to_string(&line)?;

        let mut file = lock(&self.file);
        if let Err(e) = writeln!(file, "{}", json_string).and_then(|_| file.flush()) {
            return Err(file_error!("Failed to write to snapshot file {}: {}", self.path, e));
        }

        let mut lines_written = lock(&self.lines_written);
        *lines_written += 1;
        debug!("snapshot lines written: {}", *lines_written);

        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        *lock(&self.lines_written)
    }

    /// Writes a snapshot on every device publish until cancelled.
    pub async fn start(&self, devices: N2kDevices, cancel: CancellationToken) -> Result<()> {
        let mut published = devices.subscribe();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                snapshot = published.recv() => {
                    let Some(snapshot) = snapshot else { break };
                    if let Err(e) = self.write_snapshot(snapshot.len(), &devices.to_mobile_dict()) {
                        warn!("snapshot skipped: {}", e);
                    }
                }
            }
        }

        Ok(())
    }
}
