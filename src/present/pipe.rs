use anyhow::{Context, Result};
use image::RgbaImage;
use std::io::Write;
use std::process::{Child, Command, Stdio};

/// A viewer process that shows raw RGBA frames written to its stdin.
/// Any ffplay-compatible program works.
pub struct ViewerPipe {
    child: Child,
    width: u32,
    height: u32,
}

fn viewer_args(width: u32, height: u32, fps: u32) -> Vec<String> {
    vec![
        "-loglevel".into(), "error".into(),
        "-window_title".into(), "barglow".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", width, height),
        "-framerate".into(), fps.to_string(),
        "-i".into(), "-".into(),
    ]
}

impl ViewerPipe {
    pub fn spawn(program: &str, width: u32, height: u32, fps: u32) -> Result<Self> {
        let child = Command::new(program)
            .args(viewer_args(width, height, fps))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn viewer '{}'. Is it installed?", program))?;

        log::info!("Viewer started: {} {}x{} @ {}fps", program, width, height, fps);
        Ok(Self { child, width, height })
    }

    /// Fails once the viewer has gone away (window closed).
    pub fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            anyhow::bail!(
                "frame is {}x{}, viewer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            );
        }
        let stdin = self.child.stdin.as_mut().context("Viewer stdin not available")?;
        stdin.write_all(frame.as_raw()).context("Failed to write frame to viewer")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        drop(self.child.stdin.take());
        let status = self.child.wait().context("Failed to wait for viewer")?;
        if !status.success() {
            log::debug!("Viewer exited with {}", status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_reads_raw_rgba_from_stdin() {
        let args = viewer_args(1280, 360, 60);
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo"));
        assert!(joined.contains("-pixel_format rgba"));
        assert!(joined.contains("-video_size 1280x360"));
        assert!(joined.contains("-framerate 60"));
        assert!(joined.ends_with("-i -"));
    }

    #[test]
    fn missing_viewer_fails_to_spawn() {
        assert!(ViewerPipe::spawn("/nonexistent/ffplay", 4, 4, 30).is_err());
    }
}
