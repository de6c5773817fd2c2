#![allow(dead_code)]

/// Writes values MSB first at arbitrary bit widths.
#[derive(Default)]
pub struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    pub fn put(mut self, value: u64, nbits: usize) -> Self {
        for i in (0..nbits).rev() {
            self.bits.push(value >> i & 1 == 1);
        }
        self
    }

    pub fn bytes(self) -> Vec<u8> {
        assert_eq!(self.bits.len() % 8, 0, "not a whole number of bytes");
        self.bits
            .chunks(8)
            .map(|c| c.iter().fold(0u8, |acc, b| acc << 1 | u8::from(*b)))
            .collect()
    }
}

/// Primary and secondary header for a packet with `apid` and a `total_len` bytes.
pub fn header(apid: u16, seq: u16, total_len: usize) -> BitWriter {
    BitWriter::default()
        .put(0, 3) // version
        .put(0, 1) // type
        .put(1, 1) // secondary header
        .put(u64::from(apid), 11)
        .put(3, 2) // unsegmented
        .put(u64::from(seq), 14)
        .put((total_len - 7) as u64, 16)
        .put(0, 2) // spare, rt/pb
        .put(1, 6) // flash page
        .put(2, 14) // flash block
        .put(1, 1) // time valid
        .put(2024, 11)
        .put(60, 9)
        .put(23, 5)
        .put(59, 6)
        .put(58, 6)
        .put(500_000, 20)
}
