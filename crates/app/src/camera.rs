use std::path::{Path, PathBuf};

use image::DynamicImage;
use services::error::CaptureError;
use services::{CaptureDevice, CaptureSource, FacingMode};
use tracing::{debug, info};

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Replays still images from a directory as a camera, looping forever.
pub struct DirectoryCamera {
    dir: Option<PathBuf>,
}

impl DirectoryCamera {
    /// `None` behaves like a machine without a camera.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

impl CaptureDevice for DirectoryCamera {
    fn acquire(&mut self, facing: FacingMode) -> Result<Box<dyn CaptureSource>, CaptureError> {
        let dir = self.dir.as_deref().ok_or(CaptureError::NotFound)?;
        let frames = load_frames(dir)?;
        info!(dir = %dir.display(), frames = frames.len(), ?facing, "replay camera opened");
        Ok(Box::new(ReplaySource { frames, next: 0 }))
    }
}

struct ReplaySource {
    frames: Vec<DynamicImage>,
    next: usize,
}

impl CaptureSource for ReplaySource {
    fn is_ready(&self) -> bool {
        !self.frames.is_empty()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames
            .get(self.next)
            .map(|frame| (frame.width(), frame.height()))
    }

    fn current_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        let frame = self
            .frames
            .get(self.next)
            .cloned()
            .ok_or(CaptureError::NotReady)?;
        self.next = (self.next + 1) % self.frames.len();
        Ok(frame)
    }

    fn release(&mut self) {
        self.frames.clear();
        self.next = 0;
        debug!("replay camera released");
    }
}

fn load_frames(dir: &Path) -> Result<Vec<DynamicImage>, CaptureError> {
    let entries = std::fs::read_dir(dir).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => CaptureError::NotFound,
        std::io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
        _ => CaptureError::Unavailable(err.to_string()),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();

    let frames = paths
        .iter()
        .map(|path| image::open(path).map_err(|err| CaptureError::Frame(format!("{}: {err}", path.display()))))
        .collect::<Result<Vec<_>, _>>()?;
    if frames.is_empty() {
        return Err(CaptureError::NotFound);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gestu_camera_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_directory_is_not_found() {
        let mut camera = DirectoryCamera::new(None);
        assert_eq!(
            camera.acquire(FacingMode::User).err(),
            Some(CaptureError::NotFound)
        );
        let mut camera = DirectoryCamera::new(Some(PathBuf::from("/definitely/not/here")));
        assert_eq!(
            camera.acquire(FacingMode::User).err(),
            Some(CaptureError::NotFound)
        );
    }

    #[test]
    fn frames_loop_in_name_order() {
        let dir = temp_dir("loop");
        RgbImage::from_pixel(8, 6, Rgb([0, 0, 0]))
            .save(dir.join("b.png"))
            .unwrap();
        RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]))
            .save(dir.join("a.png"))
            .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut camera = DirectoryCamera::new(Some(dir.clone()));
        let mut source = camera.acquire(FacingMode::User).ok().unwrap();
        assert!(source.is_ready());
        assert_eq!(source.dimensions(), Some((4, 4)));
        assert_eq!(source.current_frame().unwrap().width(), 4);
        assert_eq!(source.current_frame().unwrap().width(), 8);
        assert_eq!(source.current_frame().unwrap().width(), 4);

        source.release();
        assert!(!source.is_ready());
        let _ = std::fs::remove_dir_all(dir);
    }
}
