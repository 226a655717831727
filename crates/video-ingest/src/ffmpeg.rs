use std::{
    io::{ErrorKind, Read},
    process::{Child, Command, Stdio},
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use tracing::{debug, info, warn};

use crate::{
    camera::parse_device_index,
    source::FrameSource,
    types::{CaptureError, CaptureSettings, Frame},
};

/// Longest wait for ffmpeg to produce a frame before the child is restarted.
const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

type FrameResult = Result<Frame, CaptureError>;
type CommandFactory = Box<dyn Fn(&CaptureSettings) -> Command + Send>;

/// Splits a raw `bgr24` byte stream into fixed-size frames.
pub struct RawFrameReader<R> {
    inner: R,
    width: u32,
    height: u32,
    frame_len: usize,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(inner: R, settings: &CaptureSettings) -> Self {
        Self {
            inner,
            width: settings.width,
            height: settings.height,
            frame_len: settings.frame_len(),
        }
    }

    /// Read exactly one frame. A fresh buffer is used per frame so no bytes
    /// from the previous frame can leak into the next one.
    pub fn read_frame(&mut self) -> FrameResult {
        let mut data = vec![0u8; self.frame_len];
        match self.inner.read_exact(&mut data) {
            Ok(()) => Frame::from_bgr(data, self.width, self.height),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(
                CaptureError::Unavailable("capture stream ended mid-frame".into()),
            ),
            Err(err) => Err(CaptureError::Io(err)),
        }
    }
}

/// Drain `reader` on a background thread, keeping only the newest frame.
///
/// The returned receiver holds at most one frame. When nobody is reading,
/// older frames are discarded so the next receive is always current. A read
/// failure is delivered after any pending frame and ends the thread.
pub fn spawn_frame_pump<R>(
    reader: RawFrameReader<R>,
) -> Result<Receiver<FrameResult>, CaptureError>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let stale = rx.clone();
    thread::Builder::new()
        .name("ffmpeg-reader".into())
        .spawn(move || pump_frames(reader, tx, stale))?;
    Ok(rx)
}

fn pump_frames<R: Read>(
    mut reader: RawFrameReader<R>,
    tx: Sender<FrameResult>,
    stale: Receiver<FrameResult>,
) {
    loop {
        match reader.read_frame() {
            Ok(frame) => publish_latest(&tx, &stale, Ok(frame)),
            Err(err) => {
                drop(stale);
                let _ = tx.send(Err(err));
                return;
            }
        }
    }
}

fn publish_latest(
    tx: &Sender<FrameResult>,
    stale: &Receiver<FrameResult>,
    mut item: FrameResult,
) {
    loop {
        match tx.try_send(item) {
            Ok(()) => return,
            Err(TrySendError::Full(back)) => {
                let _ = stale.try_recv();
                item = back;
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
}

/// Camera capture through an `ffmpeg` child process emitting raw BGR frames.
///
/// The child is spawned once with the fixed resolution and frame rate and
/// drained continuously, so a session starting after an idle period gets a
/// live frame rather than a backlog. If a read fails the child is torn down;
/// the next `acquire` starts a new one.
pub struct FfmpegSource {
    settings: CaptureSettings,
    command: CommandFactory,
    child: Option<Child>,
    frames: Option<Receiver<FrameResult>>,
}

impl FfmpegSource {
    pub fn open(settings: CaptureSettings) -> Result<Self, CaptureError> {
        Self::with_command(settings, build_command)
    }

    /// Like [`FfmpegSource::open`] but with a custom process builder.
    pub fn with_command<F>(settings: CaptureSettings, command: F) -> Result<Self, CaptureError>
    where
        F: Fn(&CaptureSettings) -> Command + Send + 'static,
    {
        let mut source = Self {
            settings,
            command: Box::new(command),
            child: None,
            frames: None,
        };
        source.spawn()?;
        info!(
            "ffmpeg capture started: {} at {}x{} @ {} fps",
            source.settings.uri,
            source.settings.width,
            source.settings.height,
            source.settings.framerate
        );
        Ok(source)
    }

    fn spawn(&mut self) -> Result<(), CaptureError> {
        let mut cmd = (self.command)(&self.settings);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|err| {
            warn!("failed to spawn ffmpeg for {}: {err}", self.settings.uri);
            CaptureError::Open {
                uri: self.settings.uri.clone(),
            }
        })?;
        let Some(stdout) = child.stdout.take() else {
            reap(child);
            return Err(CaptureError::Unavailable(
                "failed to capture ffmpeg stdout".into(),
            ));
        };
        let frames = match spawn_frame_pump(RawFrameReader::new(stdout, &self.settings)) {
            Ok(frames) => frames,
            Err(err) => {
                reap(child);
                return Err(err);
            }
        };

        self.frames = Some(frames);
        self.child = Some(child);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.frames = None;
        if let Some(child) = self.child.take() {
            reap(child);
        }
    }
}

fn reap(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl FrameSource for FfmpegSource {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        if self.frames.is_none() {
            debug!("restarting ffmpeg capture for {}", self.settings.uri);
            self.spawn()?;
        }
        let Some(frames) = self.frames.as_ref() else {
            return Err(CaptureError::Unavailable("ffmpeg reader missing".into()));
        };
        let result = match frames.recv_timeout(FRAME_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Unavailable(format!(
                "no frame from ffmpeg within {}s",
                FRAME_TIMEOUT.as_secs()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CaptureError::Unavailable("ffmpeg reader stopped".into()))
            }
        };
        if let Err(err) = &result {
            warn!("ffmpeg capture failed: {err}");
            self.shutdown();
        }
        result
    }

    fn describe(&self) -> String {
        format!(
            "ffmpeg:{} {}x{}@{}",
            self.settings.uri, self.settings.width, self.settings.height, self.settings.framerate
        )
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build the `ffmpeg` invocation for the given capture settings.
///
/// V4L devices get the size and rate as input options so the driver is
/// configured directly; other URIs are paced with `-re` and rescaled. Output
/// timing is passed through, never padded with duplicate frames.
pub(crate) fn build_command(settings: &CaptureSettings) -> Command {
    let size_arg = format!("{}x{}", settings.width, settings.height);
    let scale_arg = format!("scale={}:{}", settings.width, settings.height);
    let rate_arg = settings.framerate.to_string();

    let (is_v4l, ffmpeg_uri) = if let Some(index) = parse_device_index(&settings.uri) {
        (true, format!("/dev/video{index}"))
    } else {
        (false, settings.uri.clone())
    };

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-fflags")
        .arg("nobuffer")
        .arg("-flags")
        .arg("low_delay");

    if is_v4l {
        cmd.arg("-f")
            .arg("video4linux2")
            .arg("-video_size")
            .arg(&size_arg)
            .arg("-framerate")
            .arg(&rate_arg);
    } else {
        cmd.arg("-re");
    }

    cmd.arg("-i")
        .arg(&ffmpeg_uri)
        .arg("-an")
        .arg("-vf")
        .arg(&scale_arg)
        .arg("-fps_mode")
        .arg("passthrough")
        .arg("-pix_fmt")
        .arg("bgr24")
        .arg("-f")
        .arg("rawvideo")
        .arg("-");
    cmd
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn settings(uri: &str) -> CaptureSettings {
        CaptureSettings {
            uri: uri.into(),
            width: 640,
            height: 480,
            framerate: 32,
        }
    }

    fn tiny() -> CaptureSettings {
        CaptureSettings {
            uri: "test".into(),
            width: 2,
            height: 2,
            framerate: 32,
        }
    }

    /// Flags once the wrapped reader has been read to the end.
    struct EofFlag<R> {
        inner: R,
        reached: Arc<AtomicBool>,
    }

    impl<R: Read> Read for EofFlag<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.inner.read(buf)?;
            if n == 0 && !buf.is_empty() {
                self.reached.store(true, Ordering::SeqCst);
            }
            Ok(n)
        }
    }

    #[test]
    fn reader_splits_stream_into_frames() {
        let mut bytes = vec![1u8; 2 * 2 * 3];
        bytes.extend(vec![2u8; 2 * 2 * 3]);
        let mut reader = RawFrameReader::new(Cursor::new(bytes), &tiny());

        let first = reader.read_frame().unwrap();
        let second = reader.read_frame().unwrap();
        assert!(first.data.iter().all(|&b| b == 1));
        assert!(second.data.iter().all(|&b| b == 2));
        assert_eq!((second.width, second.height), (2, 2));
    }

    #[test]
    fn reader_rejects_truncated_frame() {
        let mut reader = RawFrameReader::new(Cursor::new(vec![0u8; 5]), &tiny());
        assert!(matches!(
            reader.read_frame(),
            Err(CaptureError::Unavailable(_))
        ));
    }

    #[test]
    fn pump_keeps_only_the_newest_frame() {
        let mut bytes = Vec::new();
        for value in 1..=5u8 {
            bytes.extend(vec![value; 2 * 2 * 3]);
        }
        let reached = Arc::new(AtomicBool::new(false));
        let reader = EofFlag {
            inner: Cursor::new(bytes),
            reached: reached.clone(),
        };
        let frames = spawn_frame_pump(RawFrameReader::new(reader, &tiny())).unwrap();

        // Nobody consumes until the producer has written everything.
        for _ in 0..500 {
            if reached.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert!(reached.load(Ordering::SeqCst));

        let latest = frames.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert!(latest.data.iter().all(|&b| b == 5), "{:?}", latest.data);
        assert!(matches!(
            frames.recv_timeout(Duration::from_secs(1)),
            Ok(Err(CaptureError::Unavailable(_)))
        ));
    }

    #[test]
    fn pump_delivers_pending_frame_before_failure() {
        let frames =
            spawn_frame_pump(RawFrameReader::new(Cursor::new(vec![7u8; 12]), &tiny())).unwrap();
        let frame = frames.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert!(frame.data.iter().all(|&b| b == 7));
        assert!(frames.recv_timeout(Duration::from_secs(1)).unwrap().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn failed_child_is_respawned_on_next_acquire() {
        // Each child writes exactly one frame and exits.
        let mut source = FfmpegSource::with_command(tiny(), |settings| {
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(format!("head -c {} /dev/zero", settings.frame_len()));
            cmd
        })
        .unwrap();

        let first = source.acquire().unwrap();
        assert_eq!((first.width, first.height), (2, 2));
        assert!(source.acquire().is_err());
        assert!(source.child.is_none());

        let respawned = source.acquire().unwrap();
        assert_eq!(respawned.data.len(), 12);
    }

    #[test]
    fn missing_program_is_an_open_error() {
        let result = FfmpegSource::with_command(tiny(), |_| Command::new("/nonexistent/ffmpeg"));
        assert!(matches!(result, Err(CaptureError::Open { .. })));
    }

    #[test]
    fn device_command_configures_driver() {
        let cmd = build_command(&settings("/dev/video2"));
        let args = args(&cmd);
        assert_eq!(cmd.get_program(), "ffmpeg");
        let joined = args.join(" ");
        assert!(joined.contains("-f video4linux2 -video_size 640x480 -framerate 32"));
        assert!(joined.contains("-i /dev/video2"));
        assert!(joined.ends_with("-pix_fmt bgr24 -f rawvideo -"));
        assert!(!args.iter().any(|a| a == "-re"));
    }

    #[test]
    fn output_is_unbuffered_and_not_rate_padded() {
        let cmd = build_command(&settings("/dev/video0"));
        let joined = args(&cmd).join(" ");
        assert!(joined.contains("-fflags nobuffer"));
        assert!(joined.contains("-fps_mode passthrough"));
        assert!(!args(&cmd).iter().any(|a| a == "-r"));
    }

    #[test]
    fn index_is_mapped_to_device_node() {
        let joined = args(&build_command(&settings("1"))).join(" ");
        assert!(joined.contains("-i /dev/video1"));
    }

    #[test]
    fn url_command_is_paced_and_scaled() {
        let joined = args(&build_command(&settings("rtsp://cam.local/live"))).join(" ");
        assert!(joined.contains("-re -i rtsp://cam.local/live"));
        assert!(joined.contains("-vf scale=640:480"));
        assert!(!joined.contains("video4linux2"));
    }
}
