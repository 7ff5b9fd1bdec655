//! 比特储备库 (Bit Reservoir).
//!
//! 帧的主数据可以从前面若干帧的剩余字节开始 (main_data_begin 向前偏移),
//! 这里缓存历史主数据并拼接出当前帧连续的主数据视图.

use super::error::StreamErrorKind;

/// 储备库最多保留的历史字节数
pub const MAX_RESERVOIR_BYTES: usize = 2048;

#[derive(Debug, Default, Clone)]
pub struct BitReservoir {
    buf: Vec<u8>,
}

impl BitReservoir {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_RESERVOIR_BYTES * 2),
        }
    }

    /// 当前缓存的历史字节数
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 追加当前帧主数据, 返回从 main_data_begin 开始的连续视图
    ///
    /// 历史字节不足时返回 `BadDataPtr`, 但本帧主数据仍会进入储备库供后续帧引用.
    pub fn assemble(
        &mut self,
        main_data_begin: usize,
        frame_main_data: &[u8],
    ) -> Result<&[u8], StreamErrorKind> {
        let underflow = main_data_begin > self.buf.len();
        if !underflow {
            let start = self.buf.len() - main_data_begin;
            self.buf.drain(..start);
        }
        self.buf.extend_from_slice(frame_main_data);
        if self.buf.len() > MAX_RESERVOIR_BYTES {
            let excess = self.buf.len() - MAX_RESERVOIR_BYTES;
            self.buf.drain(..excess);
        }
        if underflow {
            return Err(StreamErrorKind::BadDataPtr);
        }
        Ok(&self.buf)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_begin_uses_frame_only() {
        let mut res = BitReservoir::new();
        assert_eq!(res.assemble(0, &[1, 2, 3]).unwrap(), &[1, 2, 3]);
        assert_eq!(res.assemble(0, &[4, 5]).unwrap(), &[4, 5]);
    }

    #[test]
    fn test_begin_reaches_into_previous_frame() {
        let mut res = BitReservoir::new();
        res.assemble(0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(res.assemble(2, &[5, 6]).unwrap(), &[3, 4, 5, 6]);
    }

    #[test]
    fn test_underflow_still_fills() {
        let mut res = BitReservoir::new();
        assert_eq!(res.assemble(3, &[7, 8]), Err(StreamErrorKind::BadDataPtr));
        assert_eq!(res.len(), 2);
        assert_eq!(res.assemble(2, &[9]).unwrap(), &[7, 8, 9]);
    }

    #[test]
    fn test_history_bounded() {
        let mut res = BitReservoir::new();
        for _ in 0..10 {
            let _ = res.assemble(MAX_RESERVOIR_BYTES + 1, &[0u8; 1000]);
        }
        assert_eq!(res.len(), MAX_RESERVOIR_BYTES);
        res.clear();
        assert!(res.is_empty());
    }
}
