// Sandpiper SoC media subsystem board wiring. Guest RAM sits at
// 0x1800_0000 (the VPU's reset scanout target is its base); each peripheral
// claims a 4 KiB MMIO region.

use crate::apu::Apu;
use crate::devices::{Console, Voice};
use crate::memory::{Bus, BusPtr, Ram, RamPtr};
use crate::vcp::Vcp;
use crate::vpu::{Palette, PalettePtr, Vpu};
use std::cell::RefCell;
use std::rc::Rc;

pub const RAM_BASE: usize = 0x1800_0000;
pub const RAM_SIZE: usize = 0x0100_0000;

pub const VPU_BASE: usize = 0x3000_0000;
pub const PALETTE_BASE: usize = 0x3000_1000;
pub const VCP_BASE: usize = 0x3000_2000;
pub const APU_BASE: usize = 0x3000_3000;
pub const MMIO_SIZE: usize = 0x1000;

pub struct Sandpiper {
    pub bus: BusPtr,
    pub ram: RamPtr,
    pub palette: PalettePtr,
    pub vpu: Rc<RefCell<Vpu>>,
    pub vcp: Rc<RefCell<Vcp>>,
    pub apu: Rc<RefCell<Apu>>,
}

/// Build the media subsystem: RAM, palette, VPU, VCP and APU on one bus.
/// The VPU owns the console and drives the VCP; both it and the VCP share
/// the palette.
pub fn sandpiper(con: Box<dyn Console>, voice: Box<dyn Voice>) -> Sandpiper {
    let ram = Rc::new(RefCell::new(Ram::new(RAM_BASE, RAM_SIZE)));
    let palette = Rc::new(RefCell::new(Palette::new()));

    let vcp = Rc::new(RefCell::new(Vcp::new(Rc::clone(&ram))));
    vcp.borrow_mut().set_palette(Rc::clone(&palette));

    let vpu = Rc::new(RefCell::new(Vpu::new(Rc::clone(&ram), con)));
    vpu.borrow_mut().set_palette(Rc::clone(&palette));
    vpu.borrow_mut().set_vcp(Rc::clone(&vcp));

    let apu = Rc::new(RefCell::new(Apu::new(Rc::clone(&ram), voice)));

    let mut bus = Bus::new();
    bus.attach((RAM_BASE, RAM_BASE + RAM_SIZE - 1), Box::new(Rc::clone(&ram)));
    bus.attach((VPU_BASE, VPU_BASE + MMIO_SIZE - 1), Box::new(Rc::clone(&vpu)));
    bus.attach((PALETTE_BASE, PALETTE_BASE + MMIO_SIZE - 1), Box::new(Rc::clone(&palette)));
    bus.attach((VCP_BASE, VCP_BASE + MMIO_SIZE - 1), Box::new(Rc::clone(&vcp)));
    bus.attach((APU_BASE, APU_BASE + MMIO_SIZE - 1), Box::new(Rc::clone(&apu)));

    Sandpiper { bus: Rc::new(RefCell::new(bus)), ram, palette, vpu, vcp, apu }
}
