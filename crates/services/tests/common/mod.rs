#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use image::{DynamicImage, Rgb, RgbImage};
use services::error::{CaptureError, SendRejection};
use services::transport::{Connector, SessionEvent, SessionSeq, SocketEvent, SocketHandle};
use services::{CaptureDevice, CaptureSource, FacingMode};
use url::Url;

#[derive(Debug, Default)]
pub struct SocketLog {
    pub seq: Option<SessionSeq>,
    pub sent: Vec<String>,
    pub closed_with: Option<(u16, String)>,
    pub detached: bool,
}

/// Connector whose sockets only record what the transport asked of them.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub sockets: Arc<Mutex<Vec<Arc<Mutex<SocketLog>>>>>,
}

impl ScriptedConnector {
    pub fn opened(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    pub fn socket(&self, index: usize) -> Arc<Mutex<SocketLog>> {
        Arc::clone(&self.sockets.lock().unwrap()[index])
    }
}

struct ScriptedSocket(Arc<Mutex<SocketLog>>);

impl SocketHandle for ScriptedSocket {
    fn send_text(&mut self, text: String) -> Result<(), SendRejection> {
        self.0.lock().unwrap().sent.push(text);
        Ok(())
    }

    fn buffered_amount(&self) -> usize {
        0
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.0.lock().unwrap().closed_with = Some((code, reason.to_string()));
    }

    fn detach(&mut self) {
        self.0.lock().unwrap().detached = true;
    }
}

impl Connector for ScriptedConnector {
    fn open(&mut self, seq: SessionSeq, _url: &Url) -> Box<dyn SocketHandle> {
        let log = Arc::new(Mutex::new(SocketLog {
            seq: Some(seq),
            ..SocketLog::default()
        }));
        self.sockets.lock().unwrap().push(Arc::clone(&log));
        Box::new(ScriptedSocket(log))
    }
}

pub fn inference_url() -> Url {
    Url::parse("ws://127.0.0.1:8000/ws/gesture").unwrap()
}

pub fn opened(seq: u64) -> SessionEvent {
    SessionEvent::new(SessionSeq::new(seq), SocketEvent::Opened)
}

pub fn closed(seq: u64, code: u16) -> SessionEvent {
    SessionEvent::new(
        SessionSeq::new(seq),
        SocketEvent::Closed {
            code: Some(code),
            reason: String::new(),
        },
    )
}

pub fn message(seq: u64, text: &str) -> SessionEvent {
    SessionEvent::new(SessionSeq::new(seq), SocketEvent::Message(text.to_string()))
}

/// Camera that always shows a flat grey frame.
pub struct GreyCamera;

struct GreySource;

impl CaptureSource for GreySource {
    fn is_ready(&self) -> bool {
        true
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((320, 240))
    }

    fn current_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            320,
            240,
            Rgb([128, 128, 128]),
        )))
    }

    fn release(&mut self) {}
}

impl CaptureDevice for GreyCamera {
    fn acquire(&mut self, _facing: FacingMode) -> Result<Box<dyn CaptureSource>, CaptureError> {
        Ok(Box::new(GreySource))
    }
}
