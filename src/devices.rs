use crate::fields::{OpResult, Size};
use crate::memory::MemoryRange;
use minifb::{Key, Window, WindowOptions};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

pub type DeviceList = Vec<(MemoryRange, Box<dyn Device>)>;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Signal {
    Ok,
    Quit,
}

impl Signal {
    pub fn add(&mut self, rhs: &Self) {
        if let Self::Quit = rhs {
            *self = Self::Quit;
        }
    }
}

/// A memory-mapped peripheral. `read`/`write` receive the offset into the
/// device's claimed range; `update` is the event-loop hook for work that is
/// not triggered by a guest access (display refresh, audio pull).
pub trait Device {
    fn update(&mut self) -> Signal {
        Signal::Ok
    }
    fn read(&mut self, offset: usize, size: Size) -> OpResult;
    fn write(&mut self, offset: usize, value: OpResult) -> Signal;
}

// Devices that are shared between the bus and another device (palette, VCP)
// attach as clones of their Rc handle.
impl<T: Device> Device for Rc<RefCell<T>> {
    fn update(&mut self) -> Signal {
        self.borrow_mut().update()
    }
    fn read(&mut self, offset: usize, size: Size) -> OpResult {
        self.borrow_mut().read(offset, size)
    }
    fn write(&mut self, offset: usize, value: OpResult) -> Signal {
        self.borrow_mut().write(offset, value)
    }
}

#[derive(Error, Debug)]
pub enum RealizeError {
    #[error("no audio backend available: {0}")]
    Audio(String),
    #[error("failed to create display console: {0}")]
    Display(String),
}

/// Host display surface the VPU scans out into. 32-bit 0x00RRGGBB pixels.
pub trait Console {
    fn resize(&mut self, width: usize, height: usize);
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn surface_data(&mut self) -> &mut [u32];
    /// Surface row pitch in pixels.
    fn surface_stride(&self) -> usize;
    fn update_rect(&mut self, x: usize, y: usize, width: usize, height: usize);
    fn is_open(&self) -> bool {
        true
    }
}

/// Host audio output voice: interleaved stereo S16LE, pull-driven. The APU
/// asks `free_bytes` for its pull budget and answers with `write` calls.
pub trait Voice {
    fn open(&mut self, freq: u32);
    fn set_active(&mut self, active: bool);
    fn write(&mut self, samples: &[i16]);
    fn free_bytes(&self) -> usize;
}

pub struct Monitor {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl Monitor {
    pub fn new() -> Result<Box<Monitor>, RealizeError> {
        let window = Window::new("Sandpiper - ESC to exit", 640, 480, WindowOptions::default())
            .map_err(|e| RealizeError::Display(e.to_string()))?;
        let buffer: Vec<u32> = vec![0; 640 * 480];
        Ok(Box::new(Monitor { window, buffer, width: 640, height: 480 }))
    }
}

impl Console for Monitor {
    fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.buffer = vec![0; width * height];
    }
    fn width(&self) -> usize {
        self.width
    }
    fn height(&self) -> usize {
        self.height
    }
    fn surface_data(&mut self) -> &mut [u32] {
        &mut self.buffer
    }
    fn surface_stride(&self) -> usize {
        self.width
    }
    fn update_rect(&mut self, _x: usize, _y: usize, _width: usize, _height: usize) {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .expect("Error updating screen!");
    }
    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }
}

// Queue depth kept shallow so rate changes and HALT take effect quickly.
const VOICE_QUEUE_CHUNKS: usize = 4;
const VOICE_CHUNK_BYTES: usize = 4096;

pub struct RodioVoice {
    _stream: OutputStream,
    sink: Sink,
    freq: u32,
    active: bool,
}

impl RodioVoice {
    pub fn new() -> Result<Box<RodioVoice>, RealizeError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| RealizeError::Audio(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| RealizeError::Audio(e.to_string()))?;
        sink.pause();
        Ok(Box::new(RodioVoice { _stream: stream, sink, freq: 44100, active: false }))
    }
}

impl Voice for RodioVoice {
    fn open(&mut self, freq: u32) {
        self.freq = freq;
    }
    fn set_active(&mut self, active: bool) {
        self.active = active;
        if active {
            self.sink.play();
        } else {
            self.sink.pause();
        }
    }
    fn write(&mut self, samples: &[i16]) {
        self.sink.append(SamplesBuffer::new(2, self.freq, samples.to_vec()));
    }
    fn free_bytes(&self) -> usize {
        if !self.active || self.sink.len() >= VOICE_QUEUE_CHUNKS {
            0
        } else {
            (VOICE_QUEUE_CHUNKS - self.sink.len()) * VOICE_CHUNK_BYTES
        }
    }
}
