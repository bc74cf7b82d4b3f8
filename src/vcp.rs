// Sandpiper VCP: a small coprocessor clocked against the raster beam. The
// host writes a program into its 1 KiB memory over the two-phase MMIO
// protocol, then EXEC arms it; the VPU re-enters `run` with the current
// beam position and the program suspends itself on WAITSCANLINE/WAITPIXEL.
// STORE writes into the same word array fetch reads, so programs can and do
// rewrite themselves mid-frame.

use crate::devices::{Device, Signal};
use crate::fields::{OpResult, Size};
use crate::instructions::Instruction;
use crate::memory::RamPtr;
use crate::vpu::PalettePtr;
use log::{debug, warn};

const VCP_CMD_SETBUFFERSIZE: u32 = 0x0;
const VCP_CMD_STARTDMA: u32 = 0x1;
const VCP_CMD_EXEC: u32 = 0x2;

pub const VCP_MEM_WORDS: usize = 1024;
pub const VCP_MEM_BYTES: usize = VCP_MEM_WORDS * 4;

/// Runaway guard: ceiling on instructions retired per `run` invocation.
pub const MAX_INSTRUCTIONS_PER_RUN: usize = 1000;

#[derive(Debug, Copy, Clone, PartialEq)]
enum CmdState {
    Idle,
    WaitBufferSize,
    WaitDmaAddr,
}

pub struct Vcp {
    regs: [u32; 16],
    pc: usize,
    program_mem: [u32; VCP_MEM_WORDS],
    cmpreg: u32,
    running: bool,
    waiting: bool,
    wait_line: Option<u32>,
    wait_pixel: Option<u32>,
    cmd_state: CmdState,
    buffer_size: u32,
    palette: Option<PalettePtr>,
    ram: RamPtr,
}

impl Vcp {
    pub fn new(ram: RamPtr) -> Self {
        Vcp {
            regs: [0; 16],
            pc: 0,
            program_mem: [0; VCP_MEM_WORDS],
            cmpreg: 0,
            running: false,
            waiting: false,
            wait_line: None,
            wait_pixel: None,
            cmd_state: CmdState::Idle,
            buffer_size: 0,
            palette: None,
            ram,
        }
    }

    pub fn set_palette(&mut self, palette: PalettePtr) {
        self.palette = Some(palette);
    }

    pub fn reset(&mut self) {
        self.regs = [0; 16];
        self.pc = 0;
        self.cmpreg = 0;
        self.running = false;
        self.waiting = false;
        self.wait_line = None;
        self.wait_pixel = None;
        self.cmd_state = CmdState::Idle;
        self.buffer_size = 0;
    }

    pub fn regs(&self) -> &[u32; 16] {
        &self.regs
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn waiting(&self) -> bool {
        self.waiting
    }

    fn dma_load(&mut self, addr: u32) {
        let len = if self.buffer_size > 0 {
            (self.buffer_size as usize).min(VCP_MEM_BYTES)
        } else {
            VCP_MEM_BYTES
        };
        let mut bytes = [0u8; VCP_MEM_BYTES];
        let n = self.ram.borrow().read(addr as usize, &mut bytes[..len]);
        let full = n / 4;
        for i in 0..full {
            self.program_mem[i] =
                u32::from_le_bytes([bytes[4 * i], bytes[4 * i + 1], bytes[4 * i + 2], bytes[4 * i + 3]]);
        }
        // A trailing partial word only overwrites the bytes the DMA covered.
        let rem = n % 4;
        if rem > 0 {
            let mut word = self.program_mem[full].to_le_bytes();
            word[..rem].copy_from_slice(&bytes[4 * full..4 * full + rem]);
            self.program_mem[full] = u32::from_le_bytes(word);
        }
        debug!("vcp: loaded {} program bytes from {:#010x}", n, addr);
    }

    /// Execute against the simulated beam position. Returns when the program
    /// suspends on a wait, runs off the end, or exhausts the instruction
    /// budget for this invocation.
    pub fn run(&mut self, current_y: u32, current_x: u32) {
        if !self.running {
            return;
        }
        let mut executed = 0;
        while executed < MAX_INSTRUCTIONS_PER_RUN {
            if self.waiting {
                let condition_met = if let Some(line) = self.wait_line {
                    current_y >= line
                } else if let Some(pixel) = self.wait_pixel {
                    current_x >= pixel
                } else {
                    false
                };
                if condition_met {
                    self.waiting = false;
                    self.wait_line = None;
                    self.wait_pixel = None;
                    self.pc += 1;
                } else {
                    return;
                }
            }

            if self.pc >= VCP_MEM_WORDS {
                self.running = false;
                return;
            }

            match Instruction::from_word(self.program_mem[self.pc]) {
                Instruction::Noop | Instruction::Reserved => {}
                Instruction::LoadImm { dest, imm24 } => self.regs[dest] = imm24,
                Instruction::PalWrite { src1, src2 } => {
                    if let Some(palette) = &self.palette {
                        let index = (self.regs[src1] & 0xff) as u8;
                        palette.borrow_mut().set(index, self.regs[src2]);
                    }
                }
                Instruction::WaitScanline { src1 } => {
                    self.wait_line = Some(self.regs[src1]);
                    self.wait_pixel = None;
                    self.waiting = true;
                    return;
                }
                Instruction::WaitPixel { src1 } => {
                    self.wait_pixel = Some(self.regs[src1]);
                    self.wait_line = None;
                    self.waiting = true;
                    return;
                }
                Instruction::MathOp { dest, src1, src2, func } => {
                    let v1 = self.regs[src1];
                    let v2 = self.regs[src2];
                    self.regs[dest] = func.map(|f| f.apply(v1, v2)).unwrap_or(0);
                }
                Instruction::Jump { dest, src1, imm16 } => {
                    self.pc = if dest & 1 != 0 {
                        // Relative jump in bytes against pc * 4.
                        ((self.pc as i64 * 4 + (imm16 as i16) as i64) / 4) as usize
                    } else {
                        (self.regs[src1] / 4) as usize
                    };
                    executed += 1;
                    continue;
                }
                Instruction::Cmp { src1, src2, cond } => {
                    let v1 = self.regs[src1];
                    let v2 = self.regs[src2];
                    self.cmpreg = cond.map(|c| c.eval(v1, v2)).unwrap_or(false) as u32;
                }
                Instruction::Branch { dest, src1, imm16 } => {
                    if self.cmpreg != 0 {
                        self.pc = if dest & 1 != 0 {
                            // Unlike JUMP, the offset applies to the word
                            // index, not the byte address.
                            ((self.pc as i64 + (imm16 as i16) as i64) / 4) as usize
                        } else {
                            (self.regs[src1] / 4) as usize
                        };
                        executed += 1;
                        continue;
                    }
                }
                Instruction::Store { src1, src2 } => {
                    let addr = (self.regs[src1] / 4) as usize;
                    if addr < VCP_MEM_WORDS {
                        self.program_mem[addr] = self.regs[src2];
                    }
                }
                Instruction::Load { dest, src1 } => {
                    let addr = (self.regs[src1] / 4) as usize;
                    if addr < VCP_MEM_WORDS {
                        self.regs[dest] = self.program_mem[addr];
                    }
                }
                Instruction::ReadScanInfo { dest, src1 } => {
                    self.regs[dest] = if src1 & 1 != 0 { current_x } else { current_y };
                }
                Instruction::LogicOp { dest, src1, src2, func } => {
                    let v1 = self.regs[src1];
                    let v2 = self.regs[src2];
                    let cmpreg = self.cmpreg;
                    self.regs[dest] = func.map(|f| f.apply(v1, v2, cmpreg)).unwrap_or(0);
                }
            }

            self.pc += 1;
            executed += 1;
        }
    }
}

impl Device for Vcp {
    fn read(&mut self, offset: usize, _size: Size) -> OpResult {
        match offset {
            0x00 => {
                // Bit 0: run state. Bits 8..20: program counter (words).
                let status = (self.running as u32) | ((self.pc as u32 & 0x1fff) << 8);
                OpResult::Long(status)
            }
            _ => {
                warn!("vcp: bad read offset {:#x}", offset);
                OpResult::Long(0)
            }
        }
    }

    fn write(&mut self, offset: usize, value: OpResult) -> Signal {
        if offset != 0 {
            warn!("vcp: bad write offset {:#x}", offset);
            return Signal::Ok;
        }
        let value = value.inner();
        match self.cmd_state {
            CmdState::WaitBufferSize => {
                self.buffer_size = value;
                self.cmd_state = CmdState::Idle;
            }
            CmdState::WaitDmaAddr => {
                self.dma_load(value);
                self.cmd_state = CmdState::Idle;
            }
            CmdState::Idle => {
                let cmd = value & 0xf;
                let flags = (value >> 4) & 0xf;
                match cmd {
                    VCP_CMD_SETBUFFERSIZE => self.cmd_state = CmdState::WaitBufferSize,
                    VCP_CMD_STARTDMA => self.cmd_state = CmdState::WaitDmaAddr,
                    VCP_CMD_EXEC => {
                        self.running = flags & 0x1 != 0;
                        self.waiting = false;
                        self.pc = 0;
                    }
                    _ => {}
                }
            }
        }
        Signal::Ok
    }
}
