//! Layer III 位流读取器.
//!
//! 按 MSB first 从字节切片读取. 越过切片末尾时读出 0 而不是报错,
//! 与输入缓冲尾部的保护区行为一致; 调用方通过 `position` 自行检查边界.

#[derive(Debug, Clone, Copy)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// 当前位位置
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// 当前位位置
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 切片总位数
    pub fn len_bits(&self) -> usize {
        self.data.len() * 8
    }

    /// 跳到指定位位置
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// 读取 n 位 (n <= 32)
    pub fn read_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 32);
        let mut value = 0u64;
        let mut remaining = n;
        while remaining > 0 {
            let byte_idx = self.pos >> 3;
            let bit_off = (self.pos & 7) as u32;
            let byte = self.data.get(byte_idx).copied().unwrap_or(0);
            let take = remaining.min(8 - bit_off);
            let chunk = (u32::from(byte) >> (8 - bit_off - take)) & ((1 << take) - 1);
            value = (value << take) | u64::from(chunk);
            self.pos += take as usize;
            remaining -= take;
        }
        value as u32
    }

    /// 读取 1 位
    pub fn read_bit(&mut self) -> bool {
        self.read_bits(1) != 0
    }
}
