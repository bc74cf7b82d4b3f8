// Sandpiper VPU and its palette companion. Commands arrive as words in a
// 1024-deep FIFO; most latch an opcode and consume the following word as
// their parameter. SYNCSWAP stalls the FIFO until the VBLANK tick retires
// the page flip. Scanout copies the mapped framebuffer page into the host
// surface and steps the raster coprocessor down the frame as it goes.

use crate::devices::{Console, Device, Signal};
use crate::fields::{OpResult, Size};
use crate::memory::RamPtr;
use crate::vcp::Vcp;
use log::warn;
use std::cell::RefCell;
use std::rc::Rc;

pub type PalettePtr = Rc<RefCell<Palette>>;
pub type VcpPtr = Rc<RefCell<Vcp>>;

pub const PALETTE_SIZE: usize = 256;

/// 256-entry 0x00RRGGBB lookup table, word-addressed over its MMIO region.
pub struct Palette {
    entries: [u32; PALETTE_SIZE],
}

impl Palette {
    pub fn new() -> Self {
        Palette { entries: [0; PALETTE_SIZE] }
    }
    pub fn lookup(&self, index: u8) -> u32 {
        self.entries[index as usize]
    }
    pub fn set(&mut self, index: u8, value: u32) {
        self.entries[index as usize] = value;
    }
}

impl Device for Palette {
    fn read(&mut self, offset: usize, _size: Size) -> OpResult {
        let index = offset >> 2;
        if index >= PALETTE_SIZE {
            warn!("palette: invalid read at offset {:#x}", offset);
            return OpResult::Long(0);
        }
        OpResult::Long(self.entries[index])
    }
    fn write(&mut self, offset: usize, value: OpResult) -> Signal {
        let index = offset >> 2;
        if index >= PALETTE_SIZE {
            warn!("palette: invalid write at offset {:#x}", offset);
            return Signal::Ok;
        }
        self.entries[index] = value.inner();
        Signal::Ok
    }
}

const CMD_SETVPAGE: u8 = 0x00;
const CMD_FINALIZE: u8 = 0x01;
const CMD_VMODE: u8 = 0x02;
const CMD_SHIFTCACHE: u8 = 0x03;
const CMD_SHIFTSCANOUT: u8 = 0x04;
const CMD_SHIFTPIXEL: u8 = 0x05;
const CMD_SETSECONDBUFFER: u8 = 0x06;
const CMD_SYNCSWAP: u8 = 0x07;
const CMD_WCONTROLREG: u8 = 0x08;

pub const VMODE_SCAN_ENABLE: u32 = 1 << 0;
pub const VMODE_WIDTH_640: u32 = 1 << 1;
pub const VMODE_DEPTH_16BPP: u32 = 1 << 2;
pub const VMODE_SCAN_DOUBLE: u32 = 1 << 3;

const FIFO_DEPTH: usize = 1024;

/// Reset scanout target; the firmware hand-off framebuffer sits at the
/// bottom of RAM.
pub const DEFAULT_VPAGE: u32 = 0x1800_0000;

pub struct Vpu {
    vpage: u32,
    second_buffer: u32,
    mode_flags: u32,
    cmd_pending: bool,
    pending_opcode: u8,
    fifo: Vec<u32>,
    fifo_head: usize,
    fifo_tail: usize,
    fifo_count: usize,
    swap_pending: bool,
    vblank_toggle: bool,
    palette: Option<PalettePtr>,
    vcp: Option<VcpPtr>,
    con: Box<dyn Console>,
    ram: RamPtr,
}

impl Vpu {
    pub fn new(ram: RamPtr, con: Box<dyn Console>) -> Self {
        let mut vpu = Vpu {
            vpage: 0,
            second_buffer: 0,
            mode_flags: 0,
            cmd_pending: false,
            pending_opcode: 0,
            fifo: vec![0; FIFO_DEPTH],
            fifo_head: 0,
            fifo_tail: 0,
            fifo_count: 0,
            swap_pending: false,
            vblank_toggle: false,
            palette: None,
            vcp: None,
            con,
            ram,
        };
        vpu.reset();
        vpu
    }

    pub fn set_palette(&mut self, palette: PalettePtr) {
        self.palette = Some(palette);
    }

    pub fn set_vcp(&mut self, vcp: VcpPtr) {
        self.vcp = Some(vcp);
    }

    pub fn reset(&mut self) {
        self.vpage = DEFAULT_VPAGE;
        self.mode_flags = VMODE_SCAN_ENABLE | VMODE_WIDTH_640 | VMODE_DEPTH_16BPP;
        self.second_buffer = 0;
        self.cmd_pending = false;
        self.pending_opcode = 0;
        self.vblank_toggle = false;
        self.swap_pending = false;
        self.fifo_head = 0;
        self.fifo_tail = 0;
        self.fifo_count = 0;
    }

    pub fn vpage(&self) -> u32 {
        self.vpage
    }

    pub fn second_buffer(&self) -> u32 {
        self.second_buffer
    }

    pub fn mode_flags(&self) -> u32 {
        self.mode_flags
    }

    pub fn console(&mut self) -> &mut dyn Console {
        &mut *self.con
    }

    fn process_commands(&mut self) {
        while self.fifo_count > 0 {
            if self.swap_pending {
                // Stall until the swap retires at VBLANK.
                break;
            }
            let cmd_word = self.fifo[self.fifo_tail];
            self.fifo_tail = (self.fifo_tail + 1) % FIFO_DEPTH;
            self.fifo_count -= 1;

            if self.cmd_pending {
                match self.pending_opcode {
                    CMD_SETVPAGE => self.vpage = cmd_word,
                    CMD_VMODE => self.mode_flags = cmd_word,
                    CMD_SETSECONDBUFFER => self.second_buffer = cmd_word,
                    // Shift parameters are accepted and discarded.
                    _ => {}
                }
                self.cmd_pending = false;
                continue;
            }

            let opcode = (cmd_word & 0xff) as u8;
            match opcode {
                CMD_SETVPAGE | CMD_VMODE | CMD_SETSECONDBUFFER | CMD_SHIFTCACHE
                | CMD_SHIFTSCANOUT | CMD_SHIFTPIXEL => {
                    self.pending_opcode = opcode;
                    self.cmd_pending = true;
                }
                CMD_SYNCSWAP => self.swap_pending = true,
                CMD_WCONTROLREG | CMD_FINALIZE => {}
                _ => {}
            }
        }
    }

    /// One simulated VBLANK: flip the status toggle, retire a pending page
    /// flip, then let commands queued behind the SYNCSWAP barrier drain.
    pub fn vblank_tick(&mut self) {
        self.vblank_toggle = !self.vblank_toggle;
        if self.swap_pending {
            std::mem::swap(&mut self.vpage, &mut self.second_buffer);
            self.swap_pending = false;
        }
        self.process_commands();
    }

    /// Host display refresh: scan the framebuffer page out to the console,
    /// driving the VCP with the raster position at the start and end of each
    /// line so palette writes can race the beam.
    pub fn refresh(&mut self) -> Signal {
        if !self.con.is_open() {
            return Signal::Quit;
        }
        if self.mode_flags & VMODE_SCAN_ENABLE == 0 {
            return Signal::Ok;
        }
        let width = if self.mode_flags & VMODE_WIDTH_640 != 0 { 640 } else { 320 };
        let height = if self.mode_flags & VMODE_SCAN_DOUBLE != 0 { 240 } else { 480 };
        let bpp = if self.mode_flags & VMODE_DEPTH_16BPP != 0 { 16 } else { 8 };
        // 320-wide 8bpp lines are padded to 384 bytes in RAM.
        let src_stride = if width == 320 && bpp == 8 { 384 } else { width * bpp / 8 };

        if self.con.width() != width || self.con.height() != height {
            self.con.resize(width, height);
        }
        if self.vpage == 0 {
            return Signal::Ok;
        }
        let ram = self.ram.borrow();
        let src = match ram.map(self.vpage as usize, src_stride * height) {
            Some(src) => src,
            None => return Signal::Ok,
        };

        let stride = self.con.surface_stride();
        for y in 0..height {
            if let Some(vcp) = &self.vcp {
                vcp.borrow_mut().run(y as u32, 0);
            }
            {
                let dest = self.con.surface_data();
                let row = &mut dest[y * stride..y * stride + width];
                if bpp == 8 {
                    let line = &src[y * src_stride..y * src_stride + width];
                    match &self.palette {
                        Some(palette) => {
                            let palette = palette.borrow();
                            for (out, &idx) in row.iter_mut().zip(line) {
                                *out = palette.lookup(idx);
                            }
                        }
                        None => {
                            for (out, &idx) in row.iter_mut().zip(line) {
                                *out = idx as u32 * 0x010101;
                            }
                        }
                    }
                } else {
                    let line = &src[y * src_stride..y * src_stride + width * 2];
                    for (out, bytes) in row.iter_mut().zip(line.chunks_exact(2)) {
                        let pixel = u16::from_le_bytes([bytes[0], bytes[1]]);
                        let r = ((pixel >> 11) & 0x1f) as u32;
                        let g = ((pixel >> 5) & 0x3f) as u32;
                        let b = (pixel & 0x1f) as u32;
                        let r = (r << 3) | (r >> 2);
                        let g = (g << 2) | (g >> 4);
                        let b = (b << 3) | (b >> 2);
                        *out = (r << 16) | (g << 8) | b;
                    }
                }
            }
            if let Some(vcp) = &self.vcp {
                vcp.borrow_mut().run(y as u32, width as u32 - 1);
            }
        }
        drop(ram);
        self.con.update_rect(0, 0, width, height);
        Signal::Ok
    }
}

impl Device for Vpu {
    fn update(&mut self) -> Signal {
        self.refresh()
    }

    fn read(&mut self, offset: usize, _size: Size) -> OpResult {
        if offset == 0 {
            // Bit 0: VBLANK toggle. Bit 11: FIFO not empty.
            let mut status = self.vblank_toggle as u32;
            if self.fifo_count > 0 {
                status |= 1 << 11;
            }
            return OpResult::Long(status);
        }
        OpResult::Long(0)
    }

    fn write(&mut self, _offset: usize, value: OpResult) -> Signal {
        let cmd_word = value.inner();
        if self.fifo_count < FIFO_DEPTH {
            self.fifo[self.fifo_head] = cmd_word;
            self.fifo_head = (self.fifo_head + 1) % FIFO_DEPTH;
            self.fifo_count += 1;
        } else {
            warn!("vpu: command fifo overflow, dropping {:#010x}", cmd_word);
        }
        self.process_commands();
        Signal::Ok
    }
}
