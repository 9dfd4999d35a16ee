mod common;

use common::*;
use lr35902::{Config, Fault, Gameboy, LoadError, Rom};
use paste;

// MBC1 can't map banks 0x00, 0x20, 0x40 or 0x60 into the switchable window, it picks the one after instead.
macro_rules! mbc1_bank_cases {
    ( $( $name:ident: $select:expr => $bank:expr, )* ) => {
        $(
        paste::item! {
            #[test]
            fn [<mbc1_select_ $name>] () {
                let mut gb = gameboy_with_cart(0x01, 6, 0, SPIN);
                gb.poke(0x2000, $select & 0x1F);
                gb.poke(0x4000, $select >> 5);
                assert_eq!(gb.peek(0x4000), $bank);
            }
        }
        )*
    }
}

mbc1_bank_cases!(
    bank_00: 0x00u8 => 0x01,
    bank_01: 0x01u8 => 0x01,
    bank_1f: 0x1Fu8 => 0x1F,
    bank_20: 0x20u8 => 0x21,
    bank_40: 0x40u8 => 0x41,
    bank_45: 0x45u8 => 0x45,
    bank_60: 0x60u8 => 0x61,
);

#[test]
fn mbc1_ram_enable_write_leaves_rom_bank_alone() {
    let mut gb = gameboy_with_cart(0x01, 6, 0, SPIN);
    gb.poke(0x2000, 0x1F);
    gb.poke(0x0000, 0x01);
    assert_eq!(gb.peek(0x4000), 0x1F);
}

#[test]
fn mbc1_bank_wraps_to_rom_size() {
    let mut gb = gameboy_with_cart(0x01, 2, 0, SPIN); // 8 banks
    gb.poke(0x2000, 0x0B);
    assert_eq!(gb.peek(0x4000), 0x03);
}

#[test]
fn mbc1_mode1_maps_secondary_bank_at_0000() {
    let mut gb = gameboy_with_cart(0x01, 6, 0, SPIN);
    gb.poke(0x4000, 0x01);
    assert_eq!(gb.peek(0x0000), 0x00);
    assert_eq!(gb.peek(0x0100), 0x18);

    gb.poke(0x6000, 0x01);
    assert_eq!(gb.peek(0x0000), 0x20);
    assert_eq!(gb.peek(0x4000), 0x21);

    gb.poke(0x6000, 0x00);
    assert_eq!(gb.peek(0x0100), 0x18);
}

#[test]
fn mbc1_ram_enable_and_banking() {
    let mut gb = gameboy_with_cart(0x03, 0, 3, SPIN);
    assert_eq!(gb.peek(0xA000), 0xFF);
    gb.poke(0xA000, 0x11);

    gb.poke(0x0000, 0x0A);
    assert_eq!(gb.peek(0xA000), 0x00);
    gb.poke(0xA000, 0x11);
    assert_eq!(gb.peek(0xA000), 0x11);
    assert!(gb.hw.battery_dirty);

    // RAM banking only happens in mode 1.
    gb.poke(0x4000, 0x02);
    assert_eq!(gb.peek(0xA000), 0x11);
    gb.poke(0x6000, 0x01);
    assert_eq!(gb.peek(0xA000), 0x00);
    gb.poke(0xA000, 0x22);
    assert_eq!(gb.hw.cart_ram[2 * 0x2000], 0x22);

    gb.poke(0x4000, 0x00);
    assert_eq!(gb.peek(0xA000), 0x11);

    gb.poke(0x0000, 0x00);
    assert_eq!(gb.peek(0xA000), 0xFF);
}

#[test]
fn mbc2_rom_banking_uses_address_bit_8() {
    let mut gb = gameboy_with_cart(0x05, 3, 0, SPIN);
    gb.poke(0x2100, 0x05);
    assert_eq!(gb.peek(0x4000), 0x05);

    // Bit 8 clear means RAM enable, not ROM bank.
    gb.poke(0x2000, 0x07);
    assert_eq!(gb.peek(0x4000), 0x05);

    gb.poke(0x2100, 0x00);
    assert_eq!(gb.peek(0x4000), 0x01);
}

#[test]
fn mbc2_ram_is_four_bits_wide_and_repeats() {
    let mut gb = gameboy_with_cart(0x06, 3, 0, SPIN);
    assert_eq!(gb.hw.cart_ram.len(), 0x200);
    gb.poke(0x0000, 0x0A);
    gb.poke(0xA000, 0xAB);
    assert_eq!(gb.peek(0xA000), 0xFB);
    assert_eq!(gb.peek(0xA200), 0xFB);
    assert_eq!(gb.peek(0xBE00), 0xFB);
}

#[test]
fn mbc3_rom_banking() {
    let mut gb = gameboy_with_cart(0x10, 6, 3, SPIN);
    gb.poke(0x2000, 0x7F);
    assert_eq!(gb.peek(0x4000), 0x7F);
    gb.poke(0x2000, 0x20);
    assert_eq!(gb.peek(0x4000), 0x20);
    gb.poke(0x2000, 0x00);
    assert_eq!(gb.peek(0x4000), 0x01);
}

#[test]
fn mbc3_ram_banking() {
    let mut gb = gameboy_with_cart(0x10, 6, 3, SPIN);
    gb.poke(0x0000, 0x0A);
    gb.poke(0x4000, 0x03);
    gb.poke(0xA123, 0x33);
    assert_eq!(gb.hw.cart_ram[3 * 0x2000 + 0x123], 0x33);
    gb.poke(0x4000, 0x00);
    assert_eq!(gb.peek(0xA123), 0x00);
}

#[test]
fn mbc3_rtc_latch_and_tick() {
    let mut gb = gameboy_with_cart(0x10, 6, 3, SPIN);
    gb.poke(0x0000, 0x0A);
    gb.poke(0x4000, 0x08);
    gb.poke(0xA000, 59);
    assert_eq!(gb.hw.rtc.seconds, 59);

    // Reads see the latched copy, which hasn't been taken yet.
    assert_eq!(gb.peek(0xA000), 0);

    gb.hw.rtc.subsecond = 4_194_303;
    gb.bus.mbc.clock(&mut gb.hw);
    assert_eq!(gb.hw.rtc.seconds, 0);
    assert_eq!(gb.hw.rtc.minutes, 1);

    gb.poke(0x6000, 0x00);
    gb.poke(0x6000, 0x01);
    assert_eq!(gb.peek(0xA000), 0);
    gb.poke(0x4000, 0x09);
    assert_eq!(gb.peek(0xA000), 1);
}

#[test]
fn mbc3_rtc_latch_needs_zero_then_one() {
    let mut gb = gameboy_with_cart(0x10, 6, 3, SPIN);
    gb.poke(0x0000, 0x0A);
    gb.poke(0x4000, 0x08);
    gb.poke(0xA000, 30);

    gb.poke(0x6000, 0x01);
    assert_eq!(gb.peek(0xA000), 0);
    gb.poke(0x6000, 0x00);
    gb.poke(0x6000, 0x01);
    assert_eq!(gb.peek(0xA000), 30);
}

#[test]
fn mbc3_rtc_halt_stops_the_clock() {
    let mut gb = gameboy_with_cart(0x10, 6, 3, SPIN);
    gb.poke(0x0000, 0x0A);
    gb.poke(0x4000, 0x0C);
    gb.poke(0xA000, 0x40);
    assert_eq!(gb.hw.rtc.day_hi, 0x40);

    gb.hw.rtc.subsecond = 4_194_303;
    gb.bus.mbc.clock(&mut gb.hw);
    assert_eq!(gb.hw.rtc.seconds, 0);
    assert_eq!(gb.hw.rtc.subsecond, 4_194_303);
}

#[test]
fn mbc3_rtc_day_counter_overflow_sets_carry() {
    let mut gb = gameboy_with_cart(0x10, 6, 3, SPIN);
    let rtc = &mut gb.hw.rtc;
    rtc.seconds = 59;
    rtc.minutes = 59;
    rtc.hours = 23;
    rtc.day_lo = 0xFF;
    rtc.day_hi = 0x01;
    rtc.subsecond = 4_194_303;

    gb.bus.mbc.clock(&mut gb.hw);
    let rtc = &gb.hw.rtc;
    assert_eq!((rtc.seconds, rtc.minutes, rtc.hours), (0, 0, 0));
    assert_eq!(rtc.day_lo, 0x00);
    assert_eq!(rtc.day_hi, 0x80);
}

#[test]
fn mbc3_without_timer_has_no_clock() {
    let mut gb = gameboy_with_cart(0x13, 6, 3, SPIN);
    gb.hw.rtc.subsecond = 4_194_303;
    gb.bus.mbc.clock(&mut gb.hw);
    assert_eq!(gb.hw.rtc.seconds, 0);
}

#[test]
fn mbc3_invalid_ram_select_faults() {
    // LD A,$0D; LD ($4000),A
    let mut gb = gameboy_with_cart(0x10, 6, 3, &[0x3E, 0x0D, 0xEA, 0x00, 0x40]);
    gb.run_instruction().unwrap();
    assert_eq!(gb.run_instruction(), Err(Fault::InvalidRamSelect(0x0D)));
}

#[test]
fn mbc5_nine_bit_rom_bank() {
    let mut gb = gameboy_with_cart(0x19, 8, 0, SPIN);
    gb.poke(0x2000, 0x05);
    gb.poke(0x3000, 0x01);
    assert_eq!(gb.peek(0x4000), 0x05);
    assert_eq!(gb.peek(0x4001), 0x01);

    // Bank 0 is allowed in the switchable window.
    gb.poke(0x2000, 0x00);
    gb.poke(0x3000, 0x00);
    assert_eq!(gb.peek(0x4100), 0x18);
}

#[test]
fn mbc5_ram_banking() {
    let mut gb = gameboy_with_cart(0x1A, 2, 4, SPIN);
    gb.poke(0x0000, 0x0A);
    gb.poke(0x4000, 0x0F);
    gb.poke(0xBFFF, 0x99);
    assert_eq!(gb.hw.cart_ram[16 * 0x2000 - 1], 0x99);
    assert!(!gb.hw.battery_dirty);
}

#[test]
fn no_mbc_ram_is_always_enabled() {
    let mut gb = gameboy_with_cart(0x08, 0, 2, SPIN);
    gb.poke(0xA000, 0x5A);
    assert_eq!(gb.peek(0xA000), 0x5A);
    // Writes to the ROM window go nowhere.
    gb.poke(0x2000, 0x01);
    assert_eq!(gb.peek(0x2000), 0x00);
}

#[test]
fn missing_cart_ram_reads_open_bus() {
    let mut gb = gameboy_with_cart(0x01, 0, 0, SPIN);
    gb.poke(0x0000, 0x0A);
    gb.poke(0xA000, 0x12);
    assert_eq!(gb.peek(0xA000), 0xFF);
}

#[test]
fn load_errors() {
    assert_eq!(
        Rom::new(vec![0; 0x100].into_boxed_slice()).err(),
        Some(LoadError::HeaderTooShort(0x100))
    );

    let mut rom = build_rom(0x00, 0, 0, SPIN);
    rom[0x147] = 0xFC;
    assert_eq!(
        Rom::new(rom.into_boxed_slice()).err(),
        Some(LoadError::UnsupportedCartridgeType(0xFC))
    );

    let mut rom = build_rom(0x00, 0, 0, SPIN);
    rom[0x148] = 0x09;
    assert_eq!(Rom::new(rom.into_boxed_slice()).err(), Some(LoadError::InvalidRomSize(0x09)));

    let mut rom = build_rom(0x01, 0, 0, SPIN);
    rom[0x149] = 0x06;
    assert_eq!(Rom::new(rom.into_boxed_slice()).err(), Some(LoadError::InvalidRamSize(0x06)));

    let mut rom = build_rom(0x01, 2, 0, SPIN);
    rom.truncate(0x8000);
    assert_eq!(
        Rom::new(rom.into_boxed_slice()).err(),
        Some(LoadError::TruncatedRom {
            expected: 0x20000,
            actual: 0x8000
        })
    );
}

#[test]
fn header_metadata() {
    let rom = load(build_rom(0x10, 6, 3, SPIN));
    assert_eq!(rom.title, "TEST");
    assert_eq!(rom.rom_banks, 128);
    assert_eq!(rom.ram_size, 0x8000);
    assert!(rom.has_battery);
    assert!(rom.has_rtc);
    assert_eq!(rom.checksum, 0xBEEF);
    assert_eq!(rom.rom_bank(3)[0], 3);
}

#[test]
fn battery_writes_are_reported() {
    // LD A,$0A; LD ($0000),A; LD A,$42; LD ($A000),A; JR -2
    let code = [0x3E, 0x0A, 0xEA, 0x00, 0x00, 0x3E, 0x42, 0xEA, 0x00, 0xA0, 0x18, 0xFE];
    let recorder = BatteryRecorder::default();
    let rom = load(build_rom(0x03, 0, 2, &code));
    let mut gb = Gameboy::new(rom, Config::default(), recorder.clone());

    for _ in 0..4 {
        gb.run_instruction().unwrap();
    }
    gb.run_cycles(100).unwrap();

    let writes = recorder.writes.borrow();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 0x2000);
    assert_eq!(writes[0][0], 0x42);
    assert!(!gb.hw.battery_dirty);
}

#[test]
fn cart_without_battery_reports_nothing() {
    let code = [0x3E, 0x0A, 0xEA, 0x00, 0x00, 0x3E, 0x42, 0xEA, 0x00, 0xA0, 0x18, 0xFE];
    let recorder = BatteryRecorder::default();
    let rom = load(build_rom(0x02, 0, 2, &code));
    let mut gb = Gameboy::new(rom, Config::default(), recorder.clone());

    gb.run_cycles(1000).unwrap();
    assert_eq!(gb.hw.cart_ram[0], 0x42);
    assert!(recorder.writes.borrow().is_empty());
}

#[test]
fn load_battery_ram_restores_contents() {
    let mut gb = gameboy_with_cart(0x03, 0, 2, SPIN);
    gb.load_battery_ram(&[1, 2, 3]);
    gb.poke(0x0000, 0x0A);
    assert_eq!(gb.peek(0xA001), 2);
    assert_eq!(gb.peek(0xA003), 0);
}
