mod controller;
mod ffmpeg;
mod manager;
mod session;

pub use controller::StreamController;
pub use ffmpeg::{FfmpegLauncher, ProcessLauncher};
pub use manager::{StreamingOptions, StreamingSessionManager};
pub use session::{ConnectionId, PrepareRequest, SessionId, StartRequest};

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context as _;
use derive_more::derive::{Display, Error};
use serde::Deserialize;

use crate::device::DeviceId;

#[derive(Debug, Display, Error)]
pub enum CameraError {
    #[display("All {max} streams are in use")]
    StreamLimitReached { max: usize },

    #[display("Session {session} is already streaming")]
    SessionActive { session: SessionId },

    #[display("Session {session} has no video stream")]
    NoVideoStream { session: SessionId },

    #[display("Error running transcoder")]
    Spawn { source: std::io::Error },

    #[display("Transcoder exited with {status}")]
    Transcoder { status: ExitStatus },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_video_processor")]
    pub video_processor: String,
    #[serde(default = "default_vcodec")]
    pub vcodec: String,
    #[serde(default = "default_max_fps")]
    pub max_fps: u32,
    #[serde(default = "default_max_bitrate")]
    pub max_bitrate: u32,
    #[serde(default = "default_max_streams")]
    pub max_streams: usize,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    //KEY=VALUE entries, the only environment the transcoder sees
    #[serde(default = "default_env")]
    pub env: Vec<String>,
    #[serde(default)]
    pub local_address: Option<IpAddr>,
}

fn default_video_processor() -> String {
    "ffmpeg".to_string()
}

fn default_vcodec() -> String {
    "libx264".to_string()
}

fn default_max_fps() -> u32 {
    10
}

fn default_max_bitrate() -> u32 {
    300
}

fn default_max_streams() -> usize {
    2
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_env() -> Vec<String> {
    vec!["PATH=/usr/local/bin:/usr/bin:/bin".to_string()]
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            video_processor: default_video_processor(),
            vcodec: default_vcodec(),
            max_fps: default_max_fps(),
            max_bitrate: default_max_bitrate(),
            max_streams: default_max_streams(),
            cache_dir: default_cache_dir(),
            env: default_env(),
            local_address: None,
        }
    }
}

impl CameraConfig {
    pub fn snapshot_path(&self, device: &DeviceId) -> PathBuf {
        crate::snapshot::snapshot_file(&self.cache_dir, device)
    }

    fn environment(&self) -> anyhow::Result<HashMap<String, String>> {
        self.env
            .iter()
            .map(|entry| {
                entry
                    .split_once('=')
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .with_context(|| format!("Invalid transcoder environment entry {}, expected KEY=VALUE", entry))
            })
            .collect()
    }

    fn streaming_options(&self, device: &DeviceId, debug: bool) -> anyhow::Result<StreamingOptions> {
        let snapshot = self.snapshot_path(device).to_string_lossy().into_owned();
        let source: Vec<String> = vec!["-loop".to_string(), "1".to_string(), "-i".to_string(), snapshot];

        Ok(StreamingOptions {
            video_processor: self.video_processor.clone(),
            vcodec: self.vcodec.clone(),
            max_fps: self.max_fps,
            max_bitrate: self.max_bitrate,
            max_streams: self.max_streams,
            still_image_source: Some(source.clone()),
            source,
            env: self.environment()?,
            local_address: self.local_address,
            debug,
        })
    }
}

//Streaming session managers of all camera devices
pub struct CameraHub {
    config: CameraConfig,
    debug: bool,
    launcher: Arc<dyn ProcessLauncher>,
    cameras: Mutex<HashMap<DeviceId, Arc<StreamingSessionManager>>>,
}

impl CameraHub {
    pub fn new(config: CameraConfig, debug: bool) -> anyhow::Result<Self> {
        Self::with_launcher(config, debug, Arc::new(FfmpegLauncher))
    }

    pub fn with_launcher(config: CameraConfig, debug: bool, launcher: Arc<dyn ProcessLauncher>) -> anyhow::Result<Self> {
        if config.max_streams == 0 {
            anyhow::bail!("camera.max_streams must be at least 1");
        }
        config.environment()?;

        Ok(Self {
            config,
            debug,
            launcher,
            cameras: Mutex::new(HashMap::new()),
        })
    }

    fn cameras(&self) -> MutexGuard<'_, HashMap<DeviceId, Arc<StreamingSessionManager>>> {
        self.cameras.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //Returns the existing manager if the device already has a camera
    pub fn attach(&self, device: &DeviceId) -> anyhow::Result<Arc<StreamingSessionManager>> {
        let mut cameras = self.cameras();
        if let Some(existing) = cameras.get(device) {
            return Ok(existing.clone());
        }

        let options = self.config.streaming_options(device, self.debug)?;
        let manager = Arc::new(StreamingSessionManager::new(
            device.to_string(),
            options,
            self.launcher.clone(),
        )?);
        cameras.insert(*device, manager.clone());

        Ok(manager)
    }

    pub fn detach(&self, device: &DeviceId) -> bool {
        let removed = self.cameras().remove(device);
        match removed {
            Some(manager) => {
                manager.stop_all();
                true
            }
            None => false,
        }
    }

    pub fn camera(&self, device: &DeviceId) -> Option<Arc<StreamingSessionManager>> {
        self.cameras().get(device).cloned()
    }

    //Every controller of every camera decides on its own whether it is affected
    pub fn handle_close_connection(&self, connection: &ConnectionId) {
        let cameras: Vec<Arc<StreamingSessionManager>> = self.cameras().values().cloned().collect();
        for camera in cameras {
            camera.handle_close_connection(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: CameraConfig = serde_json::from_value(serde_json::json!({})).unwrap();

        assert_eq!(config.video_processor, "ffmpeg");
        assert_eq!(config.vcodec, "libx264");
        assert_eq!(config.max_fps, 10);
        assert_eq!(config.max_bitrate, 300);
        assert_eq!(config.max_streams, 2);
    }

    #[test]
    fn test_environment_is_explicit() {
        let config = CameraConfig {
            env: vec!["PATH=/opt/ffmpeg/bin".to_string(), "FFREPORT=file=x.log".to_string()],
            ..CameraConfig::default()
        };

        let env = config.environment().unwrap();

        assert_eq!(env.len(), 2);
        assert_eq!(env["PATH"], "/opt/ffmpeg/bin");
        assert_eq!(env["FFREPORT"], "file=x.log");
    }

    #[test]
    fn test_invalid_configuration_is_fatal() {
        let no_streams = CameraConfig {
            max_streams: 0,
            ..CameraConfig::default()
        };
        assert!(CameraHub::new(no_streams, false).is_err());

        let bad_env = CameraConfig {
            env: vec!["PATH".to_string()],
            ..CameraConfig::default()
        };
        assert!(CameraHub::new(bad_env, false).is_err());
    }

    #[test]
    fn test_video_source_loops_cached_snapshot() {
        let config = CameraConfig {
            cache_dir: PathBuf::from("/var/cache/skybridge"),
            ..CameraConfig::default()
        };
        let device = DeviceId::from_station_id("A");

        let options = config.streaming_options(&device, false).unwrap();

        assert_eq!(
            options.source,
            vec![
                "-loop".to_string(),
                "1".to_string(),
                "-i".to_string(),
                format!("/var/cache/skybridge/{}.jpg", device)
            ]
        );
    }

    #[test]
    fn test_attach_is_idempotent_and_detach_removes() {
        let hub = CameraHub::new(CameraConfig::default(), false).unwrap();
        let device = DeviceId::from_station_id("A");

        let first = hub.attach(&device).unwrap();
        let second = hub.attach(&device).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.controllers().len(), 2);

        assert!(hub.detach(&device));
        assert!(hub.camera(&device).is_none());
        assert!(!hub.detach(&device));
    }

    #[test]
    fn test_close_connection_reaches_every_camera() {
        let hub = CameraHub::new(
            CameraConfig {
                local_address: Some("10.0.0.5".parse().unwrap()),
                ..CameraConfig::default()
            },
            false,
        )
        .unwrap();
        let a = hub.attach(&DeviceId::from_station_id("A")).unwrap();
        let b = hub.attach(&DeviceId::from_station_id("B")).unwrap();
        let request = |session: &str| PrepareRequest {
            session_id: session.to_string(),
            connection_id: Some(ConnectionId("conn-1".to_string())),
            target_address: "192.168.1.20".parse().unwrap(),
            video: None,
            audio: None,
        };
        a.prepare(request("s1")).unwrap();
        b.prepare(request("s2")).unwrap();

        hub.handle_close_connection(&ConnectionId("conn-1".to_string()));

        assert!(!a.is_pending(&SessionId::new("s1")));
        assert!(!b.is_pending(&SessionId::new("s2")));
    }
}
