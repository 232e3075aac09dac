//! LM83 register map and temperature encoding.
//!
//! The chip reports every temperature and limit as a plain two's complement
//! byte in whole degrees Celsius.

/// Manufacturer ID register; reads 0x01 on National Semiconductor parts.
pub const REG_R_MAN_ID: u8 = 0xFE;
pub const REG_R_CONFIG: u8 = 0x03;
pub const REG_W_CONFIG: u8 = 0x09;
pub const REG_R_STATUS1: u8 = 0x02;
pub const REG_R_STATUS2: u8 = 0x35;

/// Manufacturer ID of National Semiconductor.
pub const NATIONAL_MAN_ID: u8 = 0x01;

/// Bits that always read back as zero on a genuine LM83.
pub const STATUS1_ZERO_MASK: u8 = 0xA8;
pub const STATUS2_ZERO_MASK: u8 = 0x48;
pub const CONFIG_ZERO_MASK: u8 = 0x41;

/// High limit programmed on every channel at attach.
pub const INIT_HIGH: i8 = 127;

/// Candidate addresses, selected on the chip by two three-level pins.
pub const NORMAL_ADDRESSES: [u16; 9] = [
    0x18, 0x19, 0x1a, 0x29, 0x2a, 0x2b, 0x4c, 0x4d, 0x4e,
];

/// One of the four temperature channels of the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Local,
    Remote1,
    Remote2,
    Remote3,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Local,
        Channel::Remote1,
        Channel::Remote2,
        Channel::Remote3,
    ];

    /// Position of this channel in the cache arrays.
    pub const fn index(self) -> usize {
        match self {
            Channel::Local => 0,
            Channel::Remote1 => 1,
            Channel::Remote2 => 2,
            Channel::Remote3 => 3,
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Control-surface name, `temp1` through `temp4`.
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Local => "temp1",
            Channel::Remote1 => "temp2",
            Channel::Remote2 => "temp3",
            Channel::Remote3 => "temp4",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Channel::Local => "local",
            Channel::Remote1 => "remote1",
            Channel::Remote2 => "remote2",
            Channel::Remote3 => "remote3",
        }
    }

    pub const fn temp_reg(self) -> u8 {
        match self {
            Channel::Local => 0x00,
            Channel::Remote1 => 0x30,
            Channel::Remote2 => 0x01,
            Channel::Remote3 => 0x31,
        }
    }

    pub const fn high_read_reg(self) -> u8 {
        match self {
            Channel::Local => 0x05,
            Channel::Remote1 => 0x38,
            Channel::Remote2 => 0x07,
            Channel::Remote3 => 0x3A,
        }
    }

    pub const fn high_write_reg(self) -> u8 {
        match self {
            Channel::Local => 0x0B,
            Channel::Remote1 => 0x50,
            Channel::Remote2 => 0x0D,
            Channel::Remote3 => 0x52,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decodes a register byte: values above 127 are negative.
pub const fn temp_from_reg(val: u8) -> i8 {
    val as i8
}

/// Encodes a temperature into its register byte; negatives wrap to 128..=255.
pub const fn temp_to_reg(val: i8) -> u8 {
    val as u8
}
