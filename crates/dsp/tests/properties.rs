use dsp::{
    Config, Core, Dsp, Fault, Ram, Reg, Roms, StepError, decode,
    ifx::{CMBH, CMBL, DMBH, DMBL, DSBL, DSCR, DSMAH, DSMAL, DSPA, READY},
    mem::IROM_BASE,
};
use std::sync::{Arc, atomic::AtomicU32};

const HALT: u16 = 0x0021;

fn core_with(ram: Ram, program: &[u16]) -> Core {
    let mut core = Core::new(Config::default(), &Roms::default(), Arc::new(ram));
    core.mem.iram[..program.len()].copy_from_slice(program);
    core.regs.pc = 0;
    core
}

#[test]
fn decode_is_deterministic() {
    for word in (0..=u16::MAX).step_by(7) {
        let bytes = [(word >> 8) as u8, word as u8, 0xAB, 0xCD];
        let Ok((first, len)) = decode(&bytes) else {
            continue;
        };

        assert!(len == 2 || len == 4, "{word:04X}");
        let (second, len_again) = decode(&bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(len, len_again);
    }
}

#[test]
fn mailbox_read_consumes() {
    let core = core_with(Ram::new(0x100), &[]);
    let ifx = core.ifx().clone();
    let mut core = core;

    ifx.host_write(CMBH, 0x1234).unwrap();
    ifx.host_write(CMBL, 0x5678).unwrap();
    assert!(ifx.cpu_to_dsp.ready());

    assert_eq!(core.read_dmem(CMBH), READY | 0x1234);
    assert_eq!(core.read_dmem(CMBL), 0x5678);
    assert!(!ifx.cpu_to_dsp.ready());

    assert_eq!(core.read_dmem(CMBL), 0x5678);
    assert!(!ifx.cpu_to_dsp.ready());
}

#[test]
fn mailbox_overwrite_loses_previous_message() {
    let mut core = core_with(Ram::new(0x100), &[]);

    core.write_dmem(DMBH, 0x0001);
    core.write_dmem(DMBL, 0x0002);
    core.write_dmem(DMBH, 0x0003);

    // the old low word is still in place, but the message is no longer the old one
    let ifx = core.ifx().clone();
    assert_eq!(ifx.host_read(DMBL), Ok(0x0002));
    assert_eq!(ifx.dsp_to_cpu.read_hi(), 0x0003);

    core.write_dmem(DMBL, 0x0004);
    assert_eq!(ifx.dsp_to_cpu.peek(), ((READY as u32 | 3) << 16) | 4);
}

#[test]
fn host_cannot_write_dsp_mailbox() {
    let core = core_with(Ram::new(0x100), &[]);
    assert_eq!(
        core.ifx().host_write(DMBL, 1),
        Err(Fault::MailboxDirection {
            addr: DMBL,
            value: 1
        })
    );
}

#[test]
fn dma_to_imem_round_trips() {
    let bytes: Vec<u8> = (0..0x200u32).map(|i| (i * 7 + 3) as u8).collect();
    let mut core = core_with(Ram::from_bytes(bytes.clone()), &[]);

    let (main, dsp, len) = (0x0040u32, 0x0800u16, 0x0100u16);
    core.write_dmem(DSMAH, (main >> 16) as u16);
    core.write_dmem(DSMAL, main as u16);
    core.write_dmem(DSPA, dsp);
    core.write_dmem(DSCR, 0b10);
    core.write_dmem(DSBL, len);

    let read: Vec<u8> = (0..len / 2)
        .flat_map(|i| core.read_imem(dsp + i).to_be_bytes())
        .collect();

    assert_eq!(read, bytes[main as usize..][..len as usize]);
}

#[test]
fn dma_into_rom_faults() {
    let mut core = core_with(Ram::new(0x100), &[0x00FE, DSBL]);
    core.write_dmem(DSPA, 0x1000);
    core.write_dmem(DSCR, 0);
    core.regs.acc40[0].mid = 0x20;

    // sr @DSBL, $ac0.m
    assert_eq!(
        core.step(),
        Err(Fault::InvalidDmaAddress {
            addr: 0x1000,
            len: 0x20,
            imem: false,
        })
    );
}

#[test]
fn dma_from_rom_to_main() {
    let drom: Vec<u8> = (0..0x1000u32).map(|i| (i * 13 + 1) as u8).collect();
    let roms = Roms {
        irom: None,
        drom: Some(drom.clone()),
    };

    let ram = Arc::new(Ram::new(0x100));
    let mut core = Core::new(Config::default(), &roms, ram.clone());
    core.mem.iram[..2].copy_from_slice(&[0x00FE, DSBL]);
    core.regs.pc = 0;

    core.write_dmem(DSMAH, 0);
    core.write_dmem(DSMAL, 0x0020);
    core.write_dmem(DSPA, 0x1010);
    core.write_dmem(DSCR, 0b01);
    core.regs.acc40[0].mid = 0x40;

    // sr @DSBL, $ac0.m
    assert_eq!(core.step(), Ok(()));

    let main = ram.to_vec();
    assert_eq!(main[0x20..][..0x40], drom[0x20..][..0x40]);
    assert!(main[..0x20].iter().all(|&b| b == 0));
}

fn add(lhs: i64, rhs: i64, sign_extend: bool) -> Core {
    // add $ac0, $ac1 ; halt
    let mut core = core_with(Ram::new(0x100), &[0x4C00, HALT]);
    core.regs.status.set_sign_extend_to_40(sign_extend);
    core.regs.acc40[0].set(lhs);
    core.regs.acc40[1].set(rhs);

    while !core.is_halted() {
        core.step().unwrap();
    }

    core
}

#[test]
fn accumulator_keeps_40_bit_sums() {
    for sign_extend in [false, true] {
        let core = add(0x7FFF_FFFF, 1, sign_extend);
        assert_eq!(core.regs.acc40[0].get(), 0x8000_0000);
        assert!(core.regs.status.above_s32());

        let core = add(0xFFFF_FFFF, 0xFFFF_FFFF, sign_extend);
        assert_eq!(core.regs.acc40[0].get(), 0x1_FFFF_FFFE);
        assert!(core.regs.status.above_s32());
    }
}

#[test]
fn hard_reset_state() {
    // call 0x0003 ; halt ; bloopi 2, 0x0005
    let mut core = core_with(Ram::new(0x100), &[0x02BF, 0x0003, HALT, 0x1102, 0x0005]);
    core.step().unwrap();
    core.step().unwrap();
    core.write_dmem(DMBH, 0x1111);
    core.write_dmem(DMBL, 0x2222);
    core.ifx().host_write(CMBH, 0x3333).unwrap();
    assert!(!core.regs.loop_stack.is_empty());

    core.hard_reset();
    assert_eq!(core.pc(), IROM_BASE);
    assert!(core.regs.call_stack.is_empty());
    assert!(core.regs.data_stack.is_empty());
    assert!(core.regs.loop_stack.is_empty());
    assert!(core.regs.loop_count.is_empty());
    assert_eq!(core.ifx().dsp_to_cpu.peek(), 0);
    assert_eq!(core.ifx().cpu_to_dsp.peek(), 0);
}

#[test]
fn scheduler_steps() {
    // lri $ac0.m, 0x0010 ; inc $ac0 ; jmp 0x0000
    let core = core_with(Ram::new(0x100), &[0x009E, 0x0010, 0x7600, 0x029F, 0x0000]);
    let dsp = Dsp::new(core, Arc::new(AtomicU32::new(0)));

    dsp.step().unwrap();
    assert_eq!(dsp.with_core(|core| core.pc()), 2);
    assert_eq!(dsp.with_core(|core| core.regs.get(Reg::Acc40Mid0)), 0x0010);

    dsp.step().unwrap();
    assert_eq!(dsp.with_core(|core| core.pc()), 3);

    dsp.step().unwrap();
    assert_eq!(dsp.with_core(|core| core.pc()), 0);

    // the clock never advances: nothing executes while running
    dsp.run();
    let before = dsp.with_core(|core| core.regs.clone());
    assert!(matches!(dsp.step(), Err(StepError::Running)));
    assert_eq!(dsp.with_core(|core| core.regs.clone()), before);

    dsp.suspend();
    dsp.wait();
    assert!(!dsp.is_running());
}

#[test]
fn reset_through_scheduler() {
    let core = core_with(Ram::new(0x100), &[HALT]);
    let dsp = Dsp::new(core, Arc::new(AtomicU32::new(0)));

    dsp.step().unwrap();
    assert!(dsp.with_core(|core| core.is_halted()));

    dsp.assert_reset();
    assert!(!dsp.with_core(|core| core.is_halted()));
    assert_eq!(dsp.with_core(|core| core.pc()), IROM_BASE);
}
