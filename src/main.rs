use empiper::devices::{Monitor, RodioVoice, Signal};
use empiper::fields::{Condition, LogicFunc, MathFunc, OpResult};
use empiper::instructions::Instruction::*;
use empiper::sandpiper::{sandpiper, Sandpiper, RAM_BASE, VCP_BASE, VPU_BASE};
use empiper::vpu::VMODE_SCAN_ENABLE;
use std::sync::mpsc::channel;

// 320x480x8bpp framebuffer occupies 384 * 480 bytes at the bottom of RAM;
// the demo program lives well past it.
const DEMO_PROGRAM_ADDR: usize = RAM_BASE + 0x0010_0000;

const FRAMES_PER_SECOND: i64 = 60;

/// Raster-bar demo: the whole framebuffer is palette entry 0, and the
/// coprocessor rewrites that entry on every scanline, so the visible
/// gradient exists only because the palette races the beam.
fn demo_program() -> Vec<u32> {
    let program = [
        LoadImm { dest: 0, imm24: 0 },                                      // r0: next scanline
        // loop: (byte address 4)
        WaitScanline { src1: 0 },
        ReadScanInfo { dest: 1, src1: 0 },                                  // r1 = current y
        LoadImm { dest: 4, imm24: 16 },
        LogicOp { dest: 5, src1: 1, src2: 4, func: Some(LogicFunc::Shl) }, // r5 = y << 16
        LoadImm { dest: 2, imm24: 0 },
        PalWrite { src1: 2, src2: 5 },                                      // entry 0 = red ramp
        MathOp { dest: 0, src1: 0, src2: 0, func: Some(MathFunc::Inc) },
        LoadImm { dest: 7, imm24: 480 },
        Cmp { src1: 0, src2: 7, cond: Some(Condition::Lt) },
        LoadImm { dest: 8, imm24: 4 },
        Branch { dest: 0, src1: 8, imm16: 0 },                              // next line
        LoadImm { dest: 0, imm24: 0 },                                      // frame done: rewind
        Jump { dest: 0, src1: 8, imm16: 0 },
    ];
    program.iter().map(|i| i.to_word()).collect()
}

fn load_demo(machine: &Sandpiper) {
    let mut bytes = Vec::new();
    for word in demo_program() {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    machine.ram.borrow_mut().write(DEMO_PROGRAM_ADDR, &bytes);

    let mut bus = machine.bus.borrow_mut();
    // 320x480, 8bpp, scanning out of the bottom of RAM.
    bus.write(VPU_BASE, OpResult::Long(0x02));
    bus.write(VPU_BASE, OpResult::Long(VMODE_SCAN_ENABLE));
    bus.write(VPU_BASE, OpResult::Long(0x00));
    bus.write(VPU_BASE, OpResult::Long(RAM_BASE as u32));
    // Upload the coprocessor program and arm it.
    bus.write(VCP_BASE, OpResult::Long(0x0));
    bus.write(VCP_BASE, OpResult::Long(bytes.len() as u32));
    bus.write(VCP_BASE, OpResult::Long(0x1));
    bus.write(VCP_BASE, OpResult::Long(DEMO_PROGRAM_ADDR as u32));
    bus.write(VCP_BASE, OpResult::Long(0x12));
}

fn main() {
    env_logger::init();

    let con = Monitor::new().expect("Could not open a display window!");
    let voice = RodioVoice::new().expect("Could not open an audio voice!");
    let machine = sandpiper(con, voice);
    load_demo(&machine);

    let timer = timer::Timer::new();
    let (tx, rx) = channel();
    let _guard = timer
        .schedule_repeating(chrono::Duration::nanoseconds(1_000_000_000 / FRAMES_PER_SECOND), move || {
            tx.send(()).ok();
        });

    loop {
        if rx.recv().is_err() {
            break;
        }
        machine.vpu.borrow_mut().vblank_tick();
        match machine.bus.borrow_mut().update() {
            Signal::Quit => break,
            _ => {}
        }
    }
}
