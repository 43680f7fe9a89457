use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use super::CameraError;
use super::controller::{StreamController, StreamSlot};
use super::ffmpeg::{ProcessLauncher, VideoStream, snapshot_args, stream_args};
use super::session::{
    ConnectionId, NegotiatedLeg, PrepareRequest, PrepareResponse, PreparedSession, RunningSession, SessionId,
    SharedSessions, StartRequest,
};

const DEFAULT_RESOLUTION: (u32, u32) = (640, 640);

#[derive(Debug, Clone)]
pub struct StreamingOptions {
    pub video_processor: String,
    pub vcodec: String,
    pub max_fps: u32,
    pub max_bitrate: u32,
    pub max_streams: usize,
    pub source: Vec<String>,
    pub still_image_source: Option<Vec<String>>,
    pub env: HashMap<String, String>,
    pub local_address: Option<IpAddr>,
    pub debug: bool,
}

pub struct StreamingSessionManager {
    name: String,
    options: StreamingOptions,
    launcher: Arc<dyn ProcessLauncher>,
    sessions: SharedSessions,
    controllers: Vec<Arc<dyn StreamController>>,
    next_run_id: AtomicU64,
}

impl StreamingSessionManager {
    pub fn new(
        name: impl Into<String>,
        options: StreamingOptions,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> anyhow::Result<Self> {
        let name = name.into();

        if options.source.is_empty() {
            anyhow::bail!("Missing source for camera {}", name);
        }
        if options.max_streams == 0 {
            anyhow::bail!("Camera {} must allow at least one stream", name);
        }

        let sessions = SharedSessions::default();
        let controllers = (0..options.max_streams)
            .map(|index| Arc::new(StreamSlot::new(index, sessions.clone())) as Arc<dyn StreamController>)
            .collect();

        Ok(Self {
            name,
            options,
            launcher,
            sessions,
            controllers,
            next_run_id: AtomicU64::new(0),
        })
    }

    pub fn controllers(&self) -> &[Arc<dyn StreamController>] {
        &self.controllers
    }

    pub fn is_pending(&self, session: &SessionId) -> bool {
        self.sessions.lock().pending.contains_key(session)
    }

    pub fn is_ongoing(&self, session: &SessionId) -> bool {
        self.sessions.lock().ongoing.contains_key(session)
    }

    pub fn prepare(&self, request: PrepareRequest) -> Result<PrepareResponse, CameraError> {
        let session = SessionId::new(&request.session_id);

        if self.is_pending(&session) || self.is_ongoing(&session) {
            return Err(CameraError::SessionActive { session });
        }

        //A slot still bound to this id is reused, a session never holds two
        let claimed = self
            .controllers
            .iter()
            .any(|controller| controller.session_identifier().as_ref() == Some(&session))
            || self
                .controllers
                .iter()
                .any(|controller| controller.try_claim(&session, request.connection_id.as_ref()));
        if !claimed {
            return Err(CameraError::StreamLimitReached {
                max: self.options.max_streams,
            });
        }

        let video = request.video.map(NegotiatedLeg::negotiate);
        let audio = request.audio.map(NegotiatedLeg::negotiate);

        let response = PrepareResponse {
            session_id: session.clone(),
            address: self.local_address().into(),
            video: video.as_ref().map(NegotiatedLeg::response),
            audio: audio.as_ref().map(NegotiatedLeg::response),
        };

        tracing::debug!("Prepared stream session {} for {}", session, self.name);

        //Audio is negotiated for the host but never transcoded
        self.sessions.lock().pending.insert(
            session,
            PreparedSession {
                target_address: request.target_address,
                video,
            },
        );

        Ok(response)
    }

    //Returns false if there was no pending session to start
    pub fn start(&self, session: &SessionId, request: &StartRequest) -> Result<bool, CameraError> {
        let Some(prepared) = self.sessions.lock().pending.remove(session) else {
            tracing::debug!("Ignoring start of unknown session {} for {}", session, self.name);
            return Ok(false);
        };

        let Some(video) = prepared.video.as_ref() else {
            self.release_controllers(session);
            return Err(CameraError::NoVideoStream {
                session: session.clone(),
            });
        };

        let (mut width, mut height) = DEFAULT_RESOLUTION;
        let mut fps = self.options.max_fps;
        let mut bitrate = self.options.max_bitrate;
        if let Some(requested) = &request.video {
            width = requested.width;
            height = requested.height;
            fps = fps.min(requested.fps);
            bitrate = bitrate.min(requested.max_bit_rate);
        }

        let args = stream_args(&VideoStream {
            source: &self.options.source,
            vcodec: &self.options.vcodec,
            fps,
            bitrate_kbit: bitrate,
            ssrc: video.ssrc,
            srtp_params: video.srtp_params(),
            address: prepared.target_address,
            port: video.leg.port,
        });

        tracing::info!(
            "Start streaming video from {} with {}x{}@{}kBit",
            self.name,
            width,
            height,
            bitrate
        );
        if self.options.debug {
            tracing::debug!("{} {}", self.options.video_processor, args.join(" "));
        }

        let mut child = match self
            .launcher
            .spawn(&self.options.video_processor, &args, &self.options.env)
        {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Error spawning transcoder for {} session {}: {:?}", self.name, session, e);
                self.release_controllers(session);
                return Err(CameraError::Spawn { source: e });
            }
        };

        drain_output(child.stdout.take(), session.clone(), self.options.debug);
        drain_output(child.stderr.take(), session.clone(), self.options.debug);

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.sessions.lock().ongoing.insert(
            session.clone(),
            RunningSession {
                run_id,
                cancel: cancel.clone(),
            },
        );

        tokio::spawn(watch_process(
            child,
            ProcessWatch {
                name: self.name.clone(),
                session: session.clone(),
                run_id,
                cancel,
                sessions: self.sessions.clone(),
                controllers: self.controllers.clone(),
            },
        ));

        Ok(true)
    }

    //Stopping an unknown session is not an error
    pub fn stop(&self, session: &SessionId) -> bool {
        let stopped = self.sessions.lock().discard(session);
        self.release_controllers(session);

        if stopped {
            tracing::info!("Stopped stream session {} for {}", session, self.name);
        }

        stopped
    }

    pub fn stop_all(&self) {
        let ids: Vec<SessionId> = {
            let sessions = self.sessions.lock();
            sessions.pending.keys().chain(sessions.ongoing.keys()).cloned().collect()
        };

        for id in ids {
            self.stop(&id);
        }
    }

    pub fn handle_close_connection(&self, connection: &ConnectionId) {
        if self.options.debug {
            tracing::debug!(
                "Closing connection {} for {} stream(s) of {}",
                connection,
                self.controllers.len(),
                self.name
            );
        }

        for controller in self.controllers.iter() {
            controller.handle_close_connection(connection);
        }
    }

    pub async fn snapshot(&self, width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
        let source = self
            .options
            .still_image_source
            .as_deref()
            .unwrap_or(&self.options.source);
        let args = snapshot_args(source, width, height);

        tracing::info!("Snapshot from {} at {}x{}", self.name, width, height);
        if self.options.debug {
            tracing::debug!("{} {}", self.options.video_processor, args.join(" "));
        }

        let child = self
            .launcher
            .spawn(&self.options.video_processor, &args, &self.options.env)
            .map_err(|e| CameraError::Spawn { source: e })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CameraError::Spawn { source: e })?;

        if !output.status.success() {
            tracing::error!(
                "Snapshot transcoder for {} exited with {}: {}",
                self.name,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
            return Err(CameraError::Transcoder { status: output.status });
        }

        Ok(output.stdout)
    }

    fn release_controllers(&self, session: &SessionId) {
        for controller in self.controllers.iter() {
            controller.release(session);
        }
    }

    fn local_address(&self) -> IpAddr {
        if let Some(address) = self.options.local_address {
            return address;
        }

        match local_ip_address::local_ip() {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("Error detecting local address, falling back to loopback: {:?}", e);
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            }
        }
    }
}

struct ProcessWatch {
    name: String,
    session: SessionId,
    run_id: u64,
    cancel: CancellationToken,
    sessions: SharedSessions,
    controllers: Vec<Arc<dyn StreamController>>,
}

async fn watch_process(mut child: Child, watch: ProcessWatch) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = watch.cancel.cancelled() => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            terminate(&mut child);
            child.wait().await
        }
    };

    //Still tracked means the process ended on its own, not through stop
    let still_tracked = {
        let mut sessions = watch.sessions.lock();
        let matches = sessions
            .ongoing
            .get(&watch.session)
            .is_some_and(|running| running.run_id == watch.run_id);
        if matches {
            sessions.ongoing.remove(&watch.session);
        }
        matches
    };

    let bound_controllers = watch
        .controllers
        .iter()
        .filter(|controller| controller.session_identifier().as_ref() == Some(&watch.session));

    match status {
        Ok(status) if is_normal_exit(&status) => {
            tracing::info!("Stopped streaming {} session {}", watch.name, watch.session);
            if still_tracked {
                bound_controllers.for_each(|controller| controller.release(&watch.session));
            }
        }
        Ok(status) => {
            tracing::error!(
                "Transcoder for {} session {} exited with {}",
                watch.name,
                watch.session,
                status
            );
            bound_controllers.for_each(|controller| controller.force_stop());
        }
        Err(e) => {
            tracing::error!(
                "Error waiting for transcoder of {} session {}: {:?}",
                watch.name,
                watch.session,
                e
            );
            bound_controllers.for_each(|controller| controller.force_stop());
        }
    }
}

//Exit codes 0 and 255 are clean stops, no code means terminated by signal
fn is_normal_exit(status: &ExitStatus) -> bool {
    matches!(status.code(), None | Some(0) | Some(255))
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        tracing::warn!("Error sending SIGTERM to transcoder {}, killing it: {:?}", pid, e);
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!("Error killing transcoder: {:?}", e);
    }
}

//The pipes must be read even when nothing is logged, a full pipe stalls the transcoder
fn drain_output<R>(reader: Option<R>, session: SessionId, debug: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(reader) = reader else {
        return;
    };

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).split(b'\n');
        loop {
            match lines.next_segment().await {
                Ok(Some(line)) => {
                    if debug {
                        tracing::debug!("[{}] {}", session, String::from_utf8_lossy(&line).trim_end());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Error reading transcoder output of {}: {:?}", session, e);
                    break;
                }
            }
        }
    });
}
