//! Static register tables for the supported chips.
//!
//! Field layouts follow the TMC2209 (rev 1.09) and TMC2240 (rev 1.0)
//! datasheets. Only registers used by this crate are listed.

use crate::config::Chip;

use super::field::Field;
use super::register::Access::{Read as R, ReadWrite as RW, Write as W};
use super::register::{Access, RegisterDef};

/// GSTAT address, shared by both chips.
pub const GSTAT: u8 = 0x01;

/// IFCNT address (TMC2209 UART write counter).
pub const IFCNT: u8 = 0x02;

/// Register table for a chip.
pub fn table(chip: Chip) -> &'static [RegisterDef] {
    match chip {
        Chip::Tmc2209 => &TMC2209,
        Chip::Tmc2240 => &TMC2240,
    }
}

const fn reg(
    name: &'static str,
    addr: u8,
    access: Access,
    fields: &'static [Field],
) -> RegisterDef {
    RegisterDef {
        name,
        addr,
        access,
        fields,
    }
}

// ---------------------------------------------------------------------------
// TMC2209
// ---------------------------------------------------------------------------

static TMC2209: [RegisterDef; 18] = [
    reg(
        "GCONF",
        0x00,
        RW,
        &[
            Field::bit("i_scale_analog", 0),
            Field::bit("internal_rsense", 1),
            Field::bit("en_spreadcycle", 2),
            Field::bit("shaft", 3),
            Field::bit("index_otpw", 4),
            Field::bit("index_step", 5),
            Field::bit("pdn_disable", 6),
            Field::bit("mstep_reg_select", 7),
            Field::bit("multistep_filt", 8),
            Field::bit("test_mode", 9),
        ],
    ),
    reg(
        "GSTAT",
        GSTAT,
        RW,
        &[
            Field::bit("reset", 0),
            Field::bit("drv_err", 1),
            Field::bit("uv_cp", 2),
        ],
    ),
    reg("IFCNT", IFCNT, R, &[Field::new("ifcnt", 0, 8)]),
    reg("SLAVECONF", 0x03, W, &[Field::new("senddelay", 8, 4)]),
    reg(
        "IOIN",
        0x06,
        R,
        &[
            Field::bit("enn", 0),
            Field::bit("ms1", 2),
            Field::bit("ms2", 3),
            Field::bit("diag", 4),
            Field::bit("pdn_uart", 6),
            Field::bit("step", 7),
            Field::bit("spread_en", 8),
            Field::bit("dir", 9),
            Field::new("version", 24, 8),
        ],
    ),
    reg(
        "IHOLD_IRUN",
        0x10,
        W,
        &[
            Field::new("ihold", 0, 5),
            Field::new("irun", 8, 5),
            Field::new("iholddelay", 16, 4),
        ],
    ),
    reg("TPOWERDOWN", 0x11, W, &[Field::new("tpowerdown", 0, 8)]),
    reg("TSTEP", 0x12, R, &[Field::new("tstep", 0, 20)]),
    reg("TPWMTHRS", 0x13, W, &[Field::new("tpwmthrs", 0, 20)]),
    reg("TCOOLTHRS", 0x14, W, &[Field::new("tcoolthrs", 0, 20)]),
    reg("VACTUAL", 0x22, W, &[Field::signed("vactual", 0, 24)]),
    reg("SGTHRS", 0x40, W, &[Field::new("sgthrs", 0, 8)]),
    reg("SG_RESULT", 0x41, R, &[Field::new("sg_result", 0, 10)]),
    reg(
        "COOLCONF",
        0x42,
        W,
        &[
            Field::new("semin", 0, 4),
            Field::new("seup", 5, 2),
            Field::new("semax", 8, 4),
            Field::new("sedn", 13, 2),
            Field::bit("seimin", 15),
        ],
    ),
    reg("MSCNT", 0x6A, R, &[Field::new("mscnt", 0, 10)]),
    reg(
        "CHOPCONF",
        0x6C,
        RW,
        &[
            Field::new("toff", 0, 4),
            Field::new("hstrt", 4, 3),
            Field::new("hend", 7, 4),
            Field::new("tbl", 15, 2),
            Field::bit("vsense", 17),
            Field::new("mres", 24, 4),
            Field::bit("intpol", 28),
            Field::bit("dedge", 29),
            Field::bit("diss2g", 30),
            Field::bit("diss2vs", 31),
        ],
    ),
    reg(
        "DRV_STATUS",
        0x6F,
        R,
        &[
            Field::bit("otpw", 0),
            Field::bit("ot", 1),
            Field::bit("s2ga", 2),
            Field::bit("s2gb", 3),
            Field::bit("s2vsa", 4),
            Field::bit("s2vsb", 5),
            Field::bit("ola", 6),
            Field::bit("olb", 7),
            Field::bit("t120", 8),
            Field::bit("t143", 9),
            Field::bit("t150", 10),
            Field::bit("t157", 11),
            Field::new("cs_actual", 16, 5),
            Field::bit("stealth", 30),
            Field::bit("stst", 31),
        ],
    ),
    reg(
        "PWMCONF",
        0x70,
        RW,
        &[
            Field::new("pwm_ofs", 0, 8),
            Field::new("pwm_grad", 8, 8),
            Field::new("pwm_freq", 16, 2),
            Field::bit("pwm_autoscale", 18),
            Field::bit("pwm_autograd", 19),
            Field::new("freewheel", 20, 2),
            Field::new("pwm_reg", 24, 4),
            Field::new("pwm_lim", 28, 4),
        ],
    ),
];

// ---------------------------------------------------------------------------
// TMC2240
// ---------------------------------------------------------------------------

static TMC2240: [RegisterDef; 22] = [
    reg(
        "GCONF",
        0x00,
        RW,
        &[
            Field::bit("fast_standstill", 1),
            Field::bit("en_pwm_mode", 2),
            Field::bit("multistep_filt", 3),
            Field::bit("shaft", 4),
            Field::bit("diag0_error", 5),
            Field::bit("diag0_otpw", 6),
            Field::bit("diag0_stall", 7),
            Field::bit("diag1_stall", 8),
            Field::bit("diag1_index", 9),
            Field::bit("diag0_pushpull", 12),
            Field::bit("diag1_pushpull", 13),
            Field::bit("small_hysteresis", 14),
            Field::bit("stop_enable", 15),
            Field::bit("direct_mode", 16),
        ],
    ),
    reg(
        "GSTAT",
        GSTAT,
        RW,
        &[
            Field::bit("reset", 0),
            Field::bit("drv_err", 1),
            Field::bit("uv_cp", 2),
            Field::bit("register_reset", 3),
            Field::bit("vm_uvlo", 4),
        ],
    ),
    reg("IFCNT", IFCNT, R, &[Field::new("ifcnt", 0, 8)]),
    reg(
        "IOIN",
        0x04,
        R,
        &[
            Field::bit("step", 0),
            Field::bit("dir", 1),
            Field::bit("encb", 2),
            Field::bit("enca", 3),
            Field::bit("drv_enn", 4),
            Field::bit("encn", 5),
            Field::bit("uart_en", 6),
            Field::bit("comp_a", 8),
            Field::bit("comp_b", 9),
            Field::bit("comp_a1_a2", 10),
            Field::bit("comp_b1_b2", 11),
            Field::bit("output", 12),
            Field::bit("ext_res_det", 13),
            Field::bit("ext_clk", 14),
            Field::bit("adc_err", 15),
            Field::new("silicon_rv", 16, 3),
            Field::new("version", 24, 8),
        ],
    ),
    reg(
        "DRV_CONF",
        0x0A,
        RW,
        &[
            Field::new("current_range", 0, 2),
            Field::new("slope_control", 4, 2),
        ],
    ),
    reg("GLOBAL_SCALER", 0x0B, RW, &[Field::new("global_scaler", 0, 8)]),
    reg(
        "IHOLD_IRUN",
        0x10,
        RW,
        &[
            Field::new("ihold", 0, 5),
            Field::new("irun", 8, 5),
            Field::new("iholddelay", 16, 4),
            Field::new("irundelay", 24, 4),
        ],
    ),
    reg("TPOWERDOWN", 0x11, RW, &[Field::new("tpowerdown", 0, 8)]),
    reg("TSTEP", 0x12, R, &[Field::new("tstep", 0, 20)]),
    reg("TPWMTHRS", 0x13, RW, &[Field::new("tpwmthrs", 0, 20)]),
    reg("TCOOLTHRS", 0x14, RW, &[Field::new("tcoolthrs", 0, 20)]),
    reg("THIGH", 0x15, RW, &[Field::new("thigh", 0, 20)]),
    reg(
        "ADC_VSUPPLY_AIN",
        0x50,
        R,
        &[
            Field::new("adc_vsupply", 0, 13),
            Field::new("adc_ain", 16, 13),
        ],
    ),
    reg("ADC_TEMP", 0x51, R, &[Field::new("adc_temp", 0, 13)]),
    reg("MSCNT", 0x6A, R, &[Field::new("mscnt", 0, 10)]),
    reg(
        "CHOPCONF",
        0x6C,
        RW,
        &[
            Field::new("toff", 0, 4),
            Field::new("hstrt", 4, 3),
            Field::new("hend", 7, 4),
            Field::new("tbl", 15, 2),
            Field::new("mres", 24, 4),
            Field::bit("intpol", 28),
            Field::bit("dedge", 29),
            Field::bit("diss2g", 30),
            Field::bit("diss2vs", 31),
        ],
    ),
    reg(
        "COOLCONF",
        0x6D,
        RW,
        &[
            Field::new("semin", 0, 4),
            Field::new("seup", 5, 2),
            Field::new("semax", 8, 4),
            Field::new("sedn", 13, 2),
            Field::bit("seimin", 15),
            Field::signed("sgt", 16, 7),
            Field::bit("sfilt", 24),
        ],
    ),
    reg(
        "DRV_STATUS",
        0x6F,
        R,
        &[
            Field::new("sg_result", 0, 10),
            Field::bit("s2vsa", 12),
            Field::bit("s2vsb", 13),
            Field::bit("stealth", 14),
            Field::bit("fsactive", 15),
            Field::new("cs_actual", 16, 5),
            Field::bit("stallguard", 24),
            Field::bit("ot", 25),
            Field::bit("otpw", 26),
            Field::bit("s2ga", 27),
            Field::bit("s2gb", 28),
            Field::bit("ola", 29),
            Field::bit("olb", 30),
            Field::bit("stst", 31),
        ],
    ),
    reg(
        "PWMCONF",
        0x70,
        RW,
        &[
            Field::new("pwm_ofs", 0, 8),
            Field::new("pwm_grad", 8, 8),
            Field::new("pwm_freq", 16, 2),
            Field::bit("pwm_autoscale", 18),
            Field::bit("pwm_autograd", 19),
            Field::new("freewheel", 20, 2),
            Field::bit("pwm_meas_sd_enable", 22),
            Field::bit("pwm_dis_reg_stst", 23),
            Field::new("pwm_reg", 24, 4),
            Field::new("pwm_lim", 28, 4),
        ],
    ),
    reg(
        "SG4_THRS",
        0x74,
        RW,
        &[
            Field::new("sg4_thrs", 0, 8),
            Field::bit("sg4_filt_en", 8),
            Field::bit("sg_angle_offset", 9),
        ],
    ),
    reg("SG4_RESULT", 0x75, R, &[Field::new("sg4_result", 0, 10)]),
    reg(
        "SG4_IND",
        0x76,
        R,
        &[
            Field::new("sg4_ind_0", 0, 8),
            Field::new("sg4_ind_1", 8, 8),
            Field::new("sg4_ind_2", 16, 8),
            Field::new("sg4_ind_3", 24, 8),
        ],
    ),
];
