//! 定点采样运算.
//!
//! 采样使用 Q4.28 有符号定点数表示 (28 位小数), 可表示 [-8.0, 8.0) 的幅度.
//! 合成滤波器在此格式下运算, 最终转换为 16 位有符号 PCM.

/// Q4.28 定点采样
pub type Fixed = i32;

/// 小数位数
pub const FRAC_BITS: u32 = 28;

/// 定点数 1.0
pub const ONE: Fixed = 1 << FRAC_BITS;

/// 最大可表示值
pub const MAX: Fixed = i32::MAX;

/// 最小可表示值
pub const MIN: Fixed = i32::MIN;

/// 浮点转定点, 超出范围时饱和
///
/// 只用于构建常数表; 解码运算本身全部在整数域完成.
pub fn from_f64(value: f64) -> Fixed {
    // f64 -> i32 的 `as` 转换在 Rust 中本身即饱和, NaN 映射为 0
    (value * f64::from(ONE)).round() as i32
}

/// 定点转浮点
pub fn to_f64(value: Fixed) -> f64 {
    f64::from(value) / f64::from(ONE)
}

/// 定点乘法, 结果饱和到 i32 范围
pub fn mul(a: Fixed, b: Fixed) -> Fixed {
    saturate((i64::from(a) * i64::from(b)) >> FRAC_BITS)
}

/// 将 64 位中间值饱和到定点范围
pub fn saturate(value: i64) -> Fixed {
    value.clamp(i64::from(MIN), i64::from(MAX)) as i32
}

/// 定点采样转 16 位 PCM
///
/// 先加半个 LSB 舍入, 再钳位到 [-1.0, 1.0) 后截断, 保证结果永不回绕.
/// 中间运算在 i64 中进行, 即使输入为 `i32::MAX` 也不会溢出.
pub fn to_pcm16(sample: Fixed) -> i16 {
    let rounded = i64::from(sample) + (1i64 << (FRAC_BITS - 16));
    let clamped = rounded.clamp(-i64::from(ONE), i64::from(ONE) - 1);
    (clamped >> (FRAC_BITS + 1 - 16)) as i16
}
