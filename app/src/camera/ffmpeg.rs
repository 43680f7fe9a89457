use std::collections::HashMap;
use std::net::IpAddr;
use std::process::Stdio;

use tokio::process::{Child, Command};

use super::session::Ssrc;

const PACKET_SIZE: u32 = 1316;
const PAYLOAD_TYPE: u32 = 99;
const SRTP_SUITE: &str = "AES_CM_128_HMAC_SHA1_80";

pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, program: &str, args: &[String], env: &HashMap<String, String>) -> std::io::Result<Child>;
}

//Spawns the transcoder with exactly the given environment
#[derive(Debug, Clone, Default)]
pub struct FfmpegLauncher;

impl ProcessLauncher for FfmpegLauncher {
    fn spawn(&self, program: &str, args: &[String], env: &HashMap<String, String>) -> std::io::Result<Child> {
        Command::new(program)
            .args(args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

#[derive(Debug, Clone)]
pub(super) struct VideoStream<'a> {
    pub source: &'a [String],
    pub vcodec: &'a str,
    pub fps: u32,
    pub bitrate_kbit: u32,
    pub ssrc: Ssrc,
    pub srtp_params: String,
    pub address: IpAddr,
    pub port: u16,
}

pub(super) fn stream_args(stream: &VideoStream) -> Vec<String> {
    let bitrate = format!("{}k", stream.bitrate_kbit);
    let fps = stream.fps.to_string();
    let gop = (stream.fps * 2).to_string();
    let payload_type = PAYLOAD_TYPE.to_string();
    let ssrc = stream.ssrc.to_string();
    let destination = srtp_destination(stream.address, stream.port);

    let mut args: Vec<String> = ["-threads", "0", "-an", "-re", "-r", "1"]
        .into_iter()
        .map(str::to_owned)
        .collect();
    args.extend(stream.source.iter().cloned());
    args.extend(
        [
            "-vf",
            "fps=1",
            "-map",
            "0:0",
            "-f",
            "mp4",
            "-vcodec",
            stream.vcodec,
            "-preset",
            "fast",
            "-pix_fmt",
            "yuv420p",
            "-an",
            "-r",
            fps.as_str(),
            "-g",
            gop.as_str(),
            "-movflags",
            "frag_keyframe+empty_moov",
            "-tune",
            "stillimage",
            "-b:v",
            bitrate.as_str(),
            "-bufsize",
            bitrate.as_str(),
            "-maxrate",
            bitrate.as_str(),
            "-payload_type",
            payload_type.as_str(),
            "-ssrc",
            ssrc.as_str(),
            "-f",
            "rtp",
            "-srtp_out_suite",
            SRTP_SUITE,
            "-srtp_out_params",
            stream.srtp_params.as_str(),
            destination.as_str(),
        ]
        .into_iter()
        .map(str::to_owned),
    );

    args
}

pub(super) fn snapshot_args(source: &[String], width: u32, height: u32) -> Vec<String> {
    let resolution = format!("{}x{}", width, height);
    let mut args = source.to_vec();
    args.extend(
        ["-t", "1", "-s", resolution.as_str(), "-f", "image2", "-"]
            .into_iter()
            .map(str::to_owned),
    );
    args
}

fn srtp_destination(address: IpAddr, port: u16) -> String {
    let host = match address {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    };

    format!(
        "srtp://{}:{}?rtcpport={}&localrtcpport={}&pkt_size={}",
        host, port, port, port, PACKET_SIZE
    )
}
