// Sandpiper APU: a stereo double-buffered DMA engine behind a two-word
// command FIFO. START pulls a whole buffer of guest PCM synchronously; the
// host voice drains the engine through the pull callback.

use crate::devices::{Device, Signal, Voice};
use crate::fields::{OpResult, Size};
use crate::memory::RamPtr;
use log::debug;

const APUCMD_BUFFERSIZE: u32 = 0x0;
const APUCMD_START: u32 = 0x1;
const APUCMD_NOOP: u32 = 0x2;
const APUCMD_SWAPCHANNELS: u32 = 0x3;
const APUCMD_SETRATE: u32 = 0x4;

pub const BUFFER_SIZES: [usize; 6] = [32, 64, 128, 256, 512, 1024];
pub const SAMPLE_RATES: [u32; 3] = [44100, 22050, 11025];
const RATE_HALT: u32 = 3;

// Twin-slot storage sized for the largest buffer, interleaved stereo.
const SAMPLE_BUFFER_CAPACITY: usize = 2 * 1024 * 2;

pub struct Apu {
    command_fifo: [u32; 2],
    command_fifo_level: usize,
    buffer_size_idx: usize,
    sample_rate_idx: usize,
    dma_address: u32,
    channels_swapped: bool,
    enabled: bool,
    frame_status: usize,
    word_count: u32,
    read_cursor: usize,
    buffer_samples: usize,
    sample_buffer: Vec<i16>,
    ram: RamPtr,
    voice: Box<dyn Voice>,
}

impl Apu {
    pub fn new(ram: RamPtr, voice: Box<dyn Voice>) -> Self {
        let mut apu = Apu {
            command_fifo: [0; 2],
            command_fifo_level: 0,
            buffer_size_idx: 0,
            sample_rate_idx: RATE_HALT as usize,
            dma_address: 0,
            channels_swapped: false,
            enabled: false,
            frame_status: 0,
            word_count: 0,
            read_cursor: 0,
            buffer_samples: 0,
            sample_buffer: vec![0; SAMPLE_BUFFER_CAPACITY],
            ram,
            voice,
        };
        apu.reset();
        apu
    }

    pub fn reset(&mut self) {
        self.command_fifo_level = 0;
        self.buffer_size_idx = 0;
        self.sample_rate_idx = RATE_HALT as usize;
        self.dma_address = 0;
        self.channels_swapped = false;
        self.enabled = false;
        self.frame_status = 0;
        self.read_cursor = 0;
        self.buffer_samples = BUFFER_SIZES[0];
        self.word_count = (BUFFER_SIZES[0] - 1) as u32;
        for s in self.sample_buffer.iter_mut() {
            *s = 0;
        }
    }

    fn process_command(&mut self) {
        let cmd = self.command_fifo[0];
        let arg = self.command_fifo[1];
        match cmd {
            APUCMD_BUFFERSIZE => {
                if (arg as usize) < BUFFER_SIZES.len() {
                    self.buffer_size_idx = arg as usize;
                    self.buffer_samples = BUFFER_SIZES[self.buffer_size_idx];
                    self.word_count = (self.buffer_samples - 1) as u32;
                }
            }
            APUCMD_START => {
                self.dma_address = arg;
                // Fill the half not named by frame_status; the cursor picks
                // it up on the next pull. Short reads leave the tail as-is.
                let half = self.frame_status ^ 1;
                let offset = half * self.buffer_samples * 2;
                let mut bytes = vec![0u8; self.buffer_samples * 2 * 2];
                let n = self.ram.borrow().read(self.dma_address as usize, &mut bytes);
                for (i, pair) in bytes[..n - n % 2].chunks_exact(2).enumerate() {
                    self.sample_buffer[offset + i] = i16::from_le_bytes([pair[0], pair[1]]);
                }
            }
            APUCMD_SWAPCHANNELS => {
                self.channels_swapped = arg != 0;
            }
            APUCMD_SETRATE => {
                if arg < RATE_HALT {
                    self.sample_rate_idx = arg as usize;
                    self.enabled = true;
                    let freq = SAMPLE_RATES[self.sample_rate_idx];
                    debug!("apu: voice open at {} Hz", freq);
                    self.voice.open(freq);
                    self.voice.set_active(true);
                } else if arg == RATE_HALT {
                    self.sample_rate_idx = RATE_HALT as usize;
                    self.enabled = false;
                    self.voice.set_active(false);
                }
            }
            _ => {}
        }
    }

    /// Pull callback: the host voice has `free` bytes of space. Interleaved
    /// stereo S16, so 4 bytes per sample pair.
    pub fn audio_callback(&mut self, free: usize) {
        if !self.enabled {
            return;
        }
        let mut samples_to_play = free / 4;
        while samples_to_play > 0 {
            let available = self.buffer_samples - self.read_cursor;
            let chunk = samples_to_play.min(available);
            if chunk > 0 {
                let half = self.frame_status ^ 1;
                let start = (half * self.buffer_samples + self.read_cursor) * 2;
                let src = &self.sample_buffer[start..start + chunk * 2];
                if self.channels_swapped {
                    let mut swapped = Vec::with_capacity(chunk * 2);
                    for pair in src.chunks_exact(2) {
                        swapped.push(pair[1]);
                        swapped.push(pair[0]);
                    }
                    self.voice.write(&swapped);
                } else {
                    self.voice.write(src);
                }
                self.read_cursor += chunk;
                samples_to_play -= chunk;
            }
            if self.read_cursor >= self.buffer_samples {
                // Buffer finished; flip. Whatever sits in the newly selected
                // half plays, filled or not.
                self.frame_status ^= 1;
                self.read_cursor = 0;
            }
        }
    }
}

impl Device for Apu {
    fn update(&mut self) -> Signal {
        let free = self.voice.free_bytes();
        if free > 0 {
            self.audio_callback(free);
        }
        Signal::Ok
    }

    fn read(&mut self, _offset: usize, _size: Size) -> OpResult {
        // Bit 0: frame status. Bits 1..10: buffer samples - 1.
        OpResult::Long((self.word_count << 1) | (self.frame_status as u32 & 1))
    }

    fn write(&mut self, _offset: usize, value: OpResult) -> Signal {
        let value = value.inner();
        if value == APUCMD_NOOP {
            // Sync barrier; commands dispatch synchronously here, so there
            // is nothing to wait on and it never enters the FIFO. The filter
            // applies to argument words too: a pending command never receives
            // 0x2 as its argument, so BUFFERSIZE index 2 cannot be selected
            // through this port.
            return Signal::Ok;
        }
        self.command_fifo[self.command_fifo_level] = value;
        self.command_fifo_level += 1;
        if self.command_fifo_level == 2 {
            self.process_command();
            self.command_fifo_level = 0;
        }
        Signal::Ok
    }
}
