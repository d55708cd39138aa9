//! External decoder process feeding the shared frame buffer.
//!
//! The stream is decoded by ffmpeg into raw `bgr24` frames of the
//! configured resolution on its stdout; a reader worker slices the byte
//! stream into frames and publishes each one. A short read means the
//! decoder exited and ends the worker.

use crate::error::{GuidanceError, Result};
use crate::frame::{Frame, FrameSource, SharedFrameBuffer};
use log::{error, info};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Handle over the decoder process and its reader worker.
pub struct VideoDecoder {
    child: Mutex<Child>,
    running: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl VideoDecoder {
    /// Spawns the decoder for `stream_url` and starts publishing frames
    /// into `buffer` at the buffer's resolution.
    pub fn spawn(stream_url: &str, buffer: Arc<SharedFrameBuffer>) -> Result<Self> {
        let (width, height) = buffer.resolution();

        let mut child = Command::new("ffmpeg")
            .args([
                "-fflags",
                "nobuffer",
                "-flags",
                "low_delay",
                "-i",
                stream_url,
                "-f",
                "rawvideo",
                "-pix_fmt",
                "bgr24",
                "-s",
                &format!("{}x{}", width, height),
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GuidanceError::Link("decoder stdout not captured".to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let reader = {
            let running = Arc::clone(&running);
            thread::spawn(move || read_frames(stdout, buffer, width, height, running))
        };

        info!("video decoder started for {}", stream_url);
        Ok(VideoDecoder {
            child: Mutex::new(child),
            running,
            reader: Some(reader),
        })
    }

    /// True while the reader worker is still publishing frames.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Terminates the decoder process and joins the reader. Idempotent.
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let mut child = self.child.lock().unwrap();
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_frames(
    mut stdout: impl Read,
    buffer: Arc<SharedFrameBuffer>,
    width: u32,
    height: u32,
    running: Arc<AtomicBool>,
) {
    let frame_size = width as usize * height as usize * 3;
    let mut bytes = vec![0u8; frame_size];

    while running.load(Ordering::SeqCst) {
        match stdout.read_exact(&mut bytes) {
            Ok(()) => buffer.publish(Frame::from_bgr(width, height, bytes.clone())),
            Err(err) => {
                if running.load(Ordering::SeqCst) {
                    error!("video stream ended: {}", err);
                }
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    info!("video reader stopped");
}
