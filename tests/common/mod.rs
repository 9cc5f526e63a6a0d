//! Simulated scanner firmware for integration tests.
//!
//! Speaks the device side of the protocol over one end of a `tokio::io::duplex`:
//! announces its field of view and `Isetup finished` on start, clamps and echoes
//! moves, and answers temperature requests from a fixed temperature field.

#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

/// Temperature the simulated sensor reports at `(x, y)`.
pub fn field(x: i32, y: i32) -> f32 {
    20.0 + x as f32 + 10.0 * y as f32
}

pub struct MockFirmware {
    fov: (i32, i32, i32, i32),
    x: i32,
    y: i32,
    answered: usize,
    wedge_after: Option<usize>,
    on_wedge: Option<oneshot::Sender<()>>,
    received: Vec<String>,
}

impl MockFirmware {
    pub fn new(xmin: i32, xmax: i32, ymin: i32, ymax: i32) -> Self {
        Self {
            fov: (xmin, xmax, ymin, ymax),
            x: xmin,
            y: ymin,
            answered: 0,
            wedge_after: None,
            on_wedge: None,
            received: Vec::new(),
        }
    }

    /// Answer only the first `count` object requests, then go silent and fire the
    /// returned receiver.
    pub fn wedge_after(mut self, count: usize) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        self.wedge_after = Some(count);
        self.on_wedge = Some(tx);
        (self, rx)
    }

    /// Serve `stream` until the host hangs up; returns every command received.
    pub async fn run(mut self, mut stream: DuplexStream) -> Vec<String> {
        let (xmin, xmax, ymin, ymax) = self.fov;
        let hello = format!("Idims:{xmin},{xmax},{ymin},{ymax}\r\nIsetup finished\r\n");
        if stream.write_all(hello.as_bytes()).await.is_err() {
            return self.received;
        }

        let mut token = String::new();
        let mut byte = [0u8; 1];
        while let Ok(1) = stream.read(&mut byte).await {
            if byte[0] != b'!' {
                token.push(byte[0] as char);
                continue;
            }
            let reply = self.execute(&token);
            self.received.push(std::mem::take(&mut token));
            if !reply.is_empty() && stream.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
        self.received
    }

    fn execute(&mut self, token: &str) -> String {
        let (xmin, xmax, ymin, ymax) = self.fov;
        if let Some(value) = token.strip_prefix("px") {
            match value.parse::<i32>() {
                Ok(v) => {
                    self.x = v.clamp(xmin, xmax);
                    format!("Ix: {}\r\n", self.x)
                }
                Err(_) => "Einvalid x pos\r\n".to_string(),
            }
        } else if let Some(value) = token.strip_prefix("py") {
            match value.parse::<i32>() {
                Ok(v) => {
                    self.y = v.clamp(ymin, ymax);
                    format!("Iy: {}\r\n", self.y)
                }
                Err(_) => "Einvalid y pos\r\n".to_string(),
            }
        } else if token == "to" {
            if self.wedge_after.is_some_and(|limit| self.answered >= limit) {
                if let Some(tx) = self.on_wedge.take() {
                    let _ = tx.send(());
                }
                return String::new();
            }
            self.answered += 1;
            format!("Itemp object:{:.2}\r\n", field(self.x, self.y))
        } else if token == "ta" {
            "Itemp ambient:21.00\r\n".to_string()
        } else {
            String::new()
        }
    }
}
