//! 输入缓冲区 (Bitstream Reader).
//!
//! 在文件之上维护固定容量的滑动窗口. 补充数据前先把未消费的尾部移到缓冲区开头,
//! 保证跨越补充边界的帧不会丢失. 底层读取到达 EOF 后在末尾追加一次全零保护区,
//! 使最后一帧也能完成解析.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;
use retro_core::{RetroError, RetroResult};

/// 缓冲区容量
pub const INPUT_BUFFER_SIZE: usize = 8192;

/// EOF 后追加的保护区字节数
pub const BUFFER_GUARD: usize = 8;

/// 可读且可回到开头的字节源
pub trait MediaSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> MediaSource for T {}

pub struct InputBuffer {
    source: Box<dyn MediaSource>,
    buf: Vec<u8>,
    /// 未消费数据起点
    start: usize,
    /// 有效数据终点
    end: usize,
    /// 是否已追加保护区 (底层已读完)
    guard_added: bool,
}

impl InputBuffer {
    /// 打开文件并填充缓冲区
    pub fn open(path: impl AsRef<Path>) -> RetroResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("打开输入文件: {}", path.display());
        Self::from_source(Box::new(file))
    }

    /// 从任意字节源创建并填充缓冲区
    pub fn from_source(source: Box<dyn MediaSource>) -> RetroResult<Self> {
        let mut input = Self {
            source,
            buf: vec![0; INPUT_BUFFER_SIZE + BUFFER_GUARD],
            start: 0,
            end: 0,
            guard_added: false,
        };
        input.rewind()?;
        Ok(input)
    }

    /// 回到流开头 (跳过 ID3v2 标签) 并重新填充
    pub fn rewind(&mut self) -> RetroResult<()> {
        self.start = 0;
        self.end = 0;
        self.guard_added = false;
        self.skip_id3v2()?;
        self.refill()?;
        Ok(())
    }

    /// 未消费的数据 (EOF 后包含保护区)
    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// 未消费的字节数
    pub fn available(&self) -> usize {
        self.end - self.start
    }

    /// 未消费的真实数据字节数 (不含保护区)
    pub fn payload_len(&self) -> usize {
        let guard = if self.guard_added { BUFFER_GUARD } else { 0 };
        self.available().saturating_sub(guard)
    }

    /// 底层数据是否已全部读入
    pub fn is_eof(&self) -> bool {
        self.guard_added
    }

    /// 标记 n 个字节已消费
    pub fn consume(&mut self, n: usize) {
        self.start += n.min(self.available());
    }

    /// 补充数据, 返回新增字节数 (含首次追加的保护区)
    ///
    /// 返回 0 表示底层已读完且保护区也已追加, 即流真正结束.
    pub fn refill(&mut self) -> RetroResult<usize> {
        if self.guard_added {
            return Ok(0);
        }
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.end >= INPUT_BUFFER_SIZE {
            return Err(RetroError::Internal("输入缓冲区已满, 无法补充".into()));
        }

        let added = read_full(&mut *self.source, &mut self.buf[self.end..INPUT_BUFFER_SIZE])?;
        self.end += added;
        if added > 0 {
            return Ok(added);
        }

        self.buf[self.end..self.end + BUFFER_GUARD].fill(0);
        self.end += BUFFER_GUARD;
        self.guard_added = true;
        debug!("输入到达 EOF, 追加 {} 字节保护区", BUFFER_GUARD);
        Ok(BUFFER_GUARD)
    }

    /// 确保至少有 min_bytes 个未消费字节, 无法满足时返回 false
    pub fn ensure(&mut self, min_bytes: usize) -> RetroResult<bool> {
        let min_bytes = min_bytes.min(INPUT_BUFFER_SIZE);
        while self.available() < min_bytes {
            if self.refill()? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn skip_id3v2(&mut self) -> RetroResult<()> {
        self.source.seek(SeekFrom::Start(0))?;
        let mut head = [0u8; 10];
        let n = read_full(&mut *self.source, &mut head)?;
        let mut skip = 0u64;
        if n == head.len() && &head[..3] == b"ID3" && head[6..10].iter().all(|&b| b < 0x80) {
            let size = head[6..10]
                .iter()
                .fold(0u64, |acc, &b| (acc << 7) | u64::from(b));
            let footer = if head[5] & 0x10 != 0 { 10 } else { 0 };
            skip = 10 + size + footer;
            debug!("跳过 ID3v2 标签: {} 字节", skip);
        }
        self.source.seek(SeekFrom::Start(skip))?;
        Ok(())
    }
}

/// 尽量读满 dst, 返回实际读取的字节数 (小于 dst 长度表示到达 EOF)
fn read_full(source: &mut dyn MediaSource, dst: &mut [u8]) -> RetroResult<usize> {
    let mut total = 0;
    while total < dst.len() {
        match source.read(&mut dst[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}
