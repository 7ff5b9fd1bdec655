//! 比特流写入器.
//!
//! 按大端位序 (MSB first) 组装位字段, 用于构造帧头、边信息等位级结构,
//! 例如测试与基准中使用的合成码流.

/// 比特流写入器
///
/// # 示例
/// ```
/// use retro_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0x7FF, 11);
/// bw.write_bits(0b11, 2);
/// bw.write_bits(0b001, 3);
/// assert_eq!(bw.finish(), vec![0xFF, 0xF9]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    /// 已完成的字节
    data: Vec<u8>,
    /// 尚未凑满一个字节的位, 低位对齐
    acc: u32,
    /// acc 中的有效位数 (0-7)
    pending: u32,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定字节容量创建写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            acc: 0,
            pending: 0,
        }
    }

    /// 已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.pending as usize
    }

    /// 是否已字节对齐
    pub fn is_aligned(&self) -> bool {
        self.pending == 0
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(u32::from(bit), 1);
    }

    /// 写入 value 的低 n 位 (n 最多 32), 高位在前
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        let mut remaining = n.min(32);
        while remaining > 0 {
            let take = remaining.min(8 - self.pending);
            let shift = remaining - take;
            let chunk = (value >> shift) & ((1u32 << take) - 1);
            self.acc = (self.acc << take) | chunk;
            self.pending += take;
            remaining -= take;
            if self.pending == 8 {
                self.data.push(self.acc as u8);
                self.acc = 0;
                self.pending = 0;
            }
        }
    }

    /// 写入整字节序列, 要求当前已字节对齐
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.is_aligned() {
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
        }
    }

    /// 用 0 填充到字节边界
    pub fn align(&mut self) {
        if self.pending > 0 {
            self.write_bits(0, 8 - self.pending);
        }
    }

    /// 结束写入, 不足一个字节的部分以 0 补齐
    pub fn finish(mut self) -> Vec<u8> {
        self.align();
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_across_bytes() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        bw.write_bits(0x1FF, 9);
        bw.write_bits(0b0110, 4);
        assert_eq!(bw.bits_written(), 16);
        assert_eq!(bw.finish(), vec![0b1011_1111, 0b1111_0110]);
    }

    #[test]
    fn test_write_32_bits() {
        let mut bw = BitWriter::new();
        bw.write_bits(0xDEAD_BEEF, 32);
        assert_eq!(bw.finish(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_partial_byte_padded() {
        let mut bw = BitWriter::new();
        bw.write_bit(true);
        assert!(!bw.is_aligned());
        assert_eq!(bw.finish(), vec![0x80]);
    }

    #[test]
    fn test_write_bytes_unaligned() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 4);
        bw.write_bytes(&[0xAB]);
        assert_eq!(bw.finish(), vec![0x0A, 0xB0]);
    }
}
