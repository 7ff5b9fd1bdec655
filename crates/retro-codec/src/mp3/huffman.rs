//! Huffman 频谱数据解码.
//!
//! 码表以 (码字, 码长) 形式给出, 首次使用时构建二叉解码树.

use std::sync::OnceLock;

use super::bitreader::BitReader;
use super::error::StreamErrorKind;
use super::side_info::GranuleChannel;
use super::tables::{BIG_VALUE_TABLES, COUNT1_TABLES, HuffSpec};

const LEAF: u16 = 0x8000;

/// 二叉解码树, 节点的两个子项或为子节点下标, 或为带 LEAF 标记的符号
#[derive(Debug)]
pub struct HuffTree {
    nodes: Vec<[u16; 2]>,
    dim: usize,
}

impl HuffTree {
    fn build(spec: &HuffSpec) -> Self {
        let mut nodes = vec![[0u16; 2]];
        for (symbol, (&code, &len)) in spec.codes.iter().zip(spec.bits).enumerate() {
            if len == 0 {
                continue;
            }
            let mut node = 0usize;
            for depth in (0..len).rev() {
                // 表 13 与 16-23 的码长可达 17-19 位, 按 u32 移位
                let bit = ((u32::from(code) >> depth) & 1) as usize;
                if depth == 0 {
                    nodes[node][bit] = LEAF | symbol as u16;
                } else {
                    if nodes[node][bit] == 0 {
                        nodes.push([0; 2]);
                        nodes[node][bit] = (nodes.len() - 1) as u16;
                    }
                    node = usize::from(nodes[node][bit]);
                }
            }
        }
        Self {
            nodes,
            dim: spec.dim,
        }
    }

    /// 解码一个符号, 码字不存在时返回 None
    pub fn decode(&self, br: &mut BitReader<'_>) -> Option<usize> {
        let mut node = 0usize;
        for _ in 0..32 {
            let next = self.nodes[node][usize::from(br.read_bit())];
            if next & LEAF != 0 {
                return Some(usize::from(next & !LEAF));
            }
            if next == 0 {
                return None;
            }
            node = usize::from(next);
        }
        None
    }

    /// 每个分量的取值个数
    pub fn dim(&self) -> usize {
        self.dim
    }
}

struct Trees {
    big_values: Vec<Option<(HuffTree, u32)>>,
    count1: [HuffTree; 2],
}

fn trees() -> &'static Trees {
    static TREES: OnceLock<Trees> = OnceLock::new();
    TREES.get_or_init(|| Trees {
        big_values: BIG_VALUE_TABLES
            .iter()
            .map(|entry| entry.map(|(spec, linbits)| (HuffTree::build(&spec), linbits)))
            .collect(),
        count1: [
            HuffTree::build(&COUNT1_TABLES[0]),
            HuffTree::build(&COUNT1_TABLES[1]),
        ],
    })
}

/// 解码一个颗粒声道的 576 个量化值
///
/// `end_bit` 为本声道 part2_3 数据的结束位置. 返回最后一个非零值之后的下标.
pub fn decode_spectrum(
    br: &mut BitReader<'_>,
    gc: &GranuleChannel,
    end_bit: usize,
    out: &mut [i32; 576],
) -> Result<usize, StreamErrorKind> {
    let trees = trees();
    out.fill(0);

    let big_end = (gc.big_values * 2).min(576);
    let mut i = 0;
    while i < big_end {
        let (table, region_end) = if i < gc.region1_start {
            (gc.table_select[0], gc.region1_start)
        } else if i < gc.region2_start {
            (gc.table_select[1], gc.region2_start)
        } else {
            (gc.table_select[2], 576)
        };
        let region_end = region_end.min(big_end);

        match &trees.big_values[usize::from(table)] {
            None if table == 0 => i = region_end.max(i + 2),
            None => return Err(StreamErrorKind::BadHuffTable),
            Some((tree, linbits)) => {
                while i < region_end {
                    let symbol = tree.decode(br).ok_or(StreamErrorKind::BadHuffTable)?;
                    out[i] = read_value(br, (symbol / tree.dim()) as u32, *linbits);
                    out[i + 1] = read_value(br, (symbol % tree.dim()) as u32, *linbits);
                    i += 2;
                }
            }
        }
    }
    if br.position() > end_bit {
        return Err(StreamErrorKind::BadPart3Len);
    }

    let quad_tree = &trees.count1[usize::from(gc.count1table_select)];
    while i + 4 <= 576 && br.position() < end_bit {
        let symbol = quad_tree.decode(br).ok_or(StreamErrorKind::BadHuffTable)?;
        let mut quad = [0i32; 4];
        for (k, v) in quad.iter_mut().enumerate() {
            let magnitude = ((symbol >> (3 - k)) & 1) as i32;
            *v = if magnitude != 0 && br.read_bit() {
                -magnitude
            } else {
                magnitude
            };
        }
        // 越过结束位置的最后一组属于填充位, 丢弃
        if br.position() > end_bit {
            break;
        }
        out[i..i + 4].copy_from_slice(&quad);
        i += 4;
    }
    br.seek(end_bit);

    Ok(out.iter().rposition(|&v| v != 0).map_or(0, |p| p + 1))
}

fn read_value(br: &mut BitReader<'_>, mut value: u32, linbits: u32) -> i32 {
    if linbits > 0 && value == 15 {
        value += br.read_bits(linbits);
    }
    if value != 0 && br.read_bit() {
        -(value as i32)
    } else {
        value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_core::bitwriter::BitWriter;

    fn is_prefix_free(spec: &HuffSpec) -> bool {
        let codes: Vec<(u32, u8)> = spec
            .codes
            .iter()
            .zip(spec.bits)
            .map(|(&c, &l)| (u32::from(c), l))
            .collect();
        for (i, &(ca, la)) in codes.iter().enumerate() {
            for &(cb, lb) in &codes[i + 1..] {
                let l = la.min(lb);
                if (ca >> (la - l)) == (cb >> (lb - l)) {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn test_all_tables_prefix_free_and_complete() {
        let specs = BIG_VALUE_TABLES
            .iter()
            .flatten()
            .map(|(s, _)| *s)
            .chain(COUNT1_TABLES.iter().copied());
        for spec in specs {
            assert_eq!(spec.codes.len(), spec.dim * spec.dim);
            assert!(is_prefix_free(&spec));
            // Kraft 和为 1 表示码树完整
            let kraft: f64 = spec.bits.iter().map(|&l| 0.5f64.powi(i32::from(l))).sum();
            assert!((kraft - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_long_codes_decode() {
        // 表 13 码长最长 19 位, 表 16-23 最长 17 位
        for (index, longest) in [(13usize, 19u8), (16, 17), (23, 17)] {
            let (spec, _) = BIG_VALUE_TABLES[index].unwrap();
            let tree = HuffTree::build(&spec);
            assert_eq!(spec.bits.iter().copied().max(), Some(longest));

            for (symbol, (&code, &len)) in spec.codes.iter().zip(spec.bits).enumerate() {
                if len != longest {
                    continue;
                }
                let mut bw = BitWriter::new();
                bw.write_bits(u32::from(code), u32::from(len));
                bw.write_bits(0, 8);
                let data = bw.finish();
                let mut br = BitReader::new(&data);
                assert_eq!(tree.decode(&mut br), Some(symbol), "表 {index} 符号 {symbol}");
                assert_eq!(br.position(), usize::from(len));
            }
        }
    }

    #[test]
    fn test_every_table_decodes_all_symbols() {
        for (spec, _) in BIG_VALUE_TABLES.iter().flatten() {
            let tree = HuffTree::build(spec);
            for (symbol, (&code, &len)) in spec.codes.iter().zip(spec.bits).enumerate() {
                let mut bw = BitWriter::new();
                bw.write_bits(u32::from(code), u32::from(len));
                bw.write_bits(0, 8);
                let data = bw.finish();
                let mut br = BitReader::new(&data);
                assert_eq!(tree.decode(&mut br), Some(symbol));
            }
        }
    }

    #[test]
    fn test_decode_big_values_with_linbits() {
        // 表 16 (linbits=1): 符号 (15, 0) 后跟 1 个 linbit 与符号位
        let (spec, _) = BIG_VALUE_TABLES[16].unwrap();
        let sym = 15 * 16;
        let mut bw = BitWriter::new();
        bw.write_bits(u32::from(spec.codes[sym]), u32::from(spec.bits[sym]));
        bw.write_bits(1, 1);
        bw.write_bit(true);
        let end = bw.bits_written();
        let data = bw.finish();

        let gc = GranuleChannel {
            big_values: 1,
            table_select: [16, 0, 0],
            region1_start: 576,
            region2_start: 576,
            ..GranuleChannel::default()
        };
        let mut out = [0i32; 576];
        let mut br = BitReader::new(&data);
        let len = decode_spectrum(&mut br, &gc, end, &mut out).unwrap();
        assert_eq!(out[0], -16);
        assert_eq!(out[1], 0);
        assert_eq!(len, 1);
        assert_eq!(br.position(), end);
    }

    #[test]
    fn test_decode_count1_quads() {
        // 表 B: 码字 = 15 - 符号; 符号 0b1010 -> v=1, x=1
        let mut bw = BitWriter::new();
        bw.write_bits(15 - 0b1010, 4);
        bw.write_bit(false);
        bw.write_bit(true);
        bw.write_bits(15, 4);
        let end = bw.bits_written();
        let data = bw.finish();
        let gc = GranuleChannel {
            count1table_select: true,
            region1_start: 576,
            region2_start: 576,
            ..GranuleChannel::default()
        };
        let mut out = [0i32; 576];
        let mut br = BitReader::new(&data);
        let len = decode_spectrum(&mut br, &gc, end, &mut out).unwrap();
        assert_eq!(&out[..8], &[1, 0, -1, 0, 0, 0, 0, 0]);
        assert_eq!(len, 3);
    }

    #[test]
    fn test_invalid_table_rejected() {
        let gc = GranuleChannel {
            big_values: 2,
            table_select: [4, 0, 0],
            region1_start: 576,
            region2_start: 576,
            ..GranuleChannel::default()
        };
        let mut out = [0i32; 576];
        let data = [0u8; 4];
        let mut br = BitReader::new(&data);
        assert_eq!(
            decode_spectrum(&mut br, &gc, 32, &mut out),
            Err(StreamErrorKind::BadHuffTable)
        );
    }

    #[test]
    fn test_overrunning_quad_discarded() {
        // 表 A: 第一组 "1" 为全零; 第二组 "000000" 越过结束位置, 应被丢弃
        let data = [0b1000_0000u8, 0x00];
        let gc = GranuleChannel {
            region1_start: 576,
            region2_start: 576,
            ..GranuleChannel::default()
        };
        let mut out = [7i32; 576];
        let mut br = BitReader::new(&data);
        let len = decode_spectrum(&mut br, &gc, 3, &mut out).unwrap();
        assert_eq!(len, 0);
        assert!(out.iter().all(|&v| v == 0));
        assert_eq!(br.position(), 3);
    }
}
