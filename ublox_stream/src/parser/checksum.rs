/// UBX [Fletcher-16 checksum](https://en.wikipedia.org/wiki/Fletcher%27s_checksum),
/// run over class, id, length and body
#[derive(Default, Clone, Copy)]
pub struct UbxChecksum {
    ck_a: u8,
    ck_b: u8,
}

impl UbxChecksum {
    pub const fn new() -> Self {
        Self { ck_a: 0, ck_b: 0 }
    }

    pub const fn update(&mut self, byte: u8) {
        self.ck_a = self.ck_a.wrapping_add(byte);
        self.ck_b = self.ck_b.wrapping_add(self.ck_a);
    }

    pub const fn update_slice(&mut self, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            self.update(bytes[i]);
            i += 1;
        }
    }

    /// `(CK_A, CK_B)` in wire order
    pub const fn finalize(self) -> (u8, u8) {
        (self.ck_a, self.ck_b)
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// NMEA checksum: XOR of every character between `$` and `*`
#[derive(Default, Clone, Copy)]
pub struct NmeaChecksum(u8);

impl NmeaChecksum {
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn update(&mut self, byte: u8) {
        self.0 ^= byte;
    }

    pub const fn finalize(self) -> u8 {
        self.0
    }

    /// The two upper-case hex characters that follow `*`
    pub const fn hex_digits(self) -> [u8; 2] {
        [
            HEX_DIGITS[(self.0 >> 4) as usize],
            HEX_DIGITS[(self.0 & 0x0f) as usize],
        ]
    }
}

const fn crc24q_table() -> [u32; 256] {
    const POLY: u32 = 0x0186_4cfb;
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= POLY;
            }
            bit += 1;
        }
        table[i] = crc & 0x00ff_ffff;
        i += 1;
    }
    table
}

static CRC24Q_TABLE: [u32; 256] = crc24q_table();

/// RTCM3 CRC-24Q, MSB first.
///
/// Running the check bytes of a valid frame through the register leaves it at zero.
#[derive(Default, Clone, Copy)]
pub struct Crc24Q(u32);

impl Crc24Q {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn update(&mut self, byte: u8) {
        let idx = ((self.0 >> 16) & 0xff) as usize;
        self.0 = ((self.0 << 8) | byte as u32) ^ CRC24Q_TABLE[idx];
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.update(*b);
        }
    }

    pub const fn finalize(self) -> u32 {
        self.0 & 0x00ff_ffff
    }
}
