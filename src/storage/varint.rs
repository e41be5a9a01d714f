//! LEB128 无符号 varint + zigzag 有符号映射。
//!
//! 时间戳 delta、UTC offset、长度前缀都走这里，小值只占 1 字节。

/// u64 的 LEB128 最多 10 字节
pub const MAX_VARINT_LEN: usize = 10;

pub fn put_uvarint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

pub fn put_ivarint(out: &mut Vec<u8>, v: i64) {
    put_uvarint(out, zigzag_encode(v));
}

/// 返回 (值, 消耗字节数)；输入截断或超过 10 字节 / 溢出 u64 时返回 None
pub fn read_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &b) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        let low = (b & 0x7F) as u64;
        if i == MAX_VARINT_LEN - 1 && low > 1 {
            return None;
        }
        value |= low << (7 * i);
        if b & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

pub fn read_ivarint(buf: &[u8]) -> Option<(i64, usize)> {
    read_uvarint(buf).map(|(v, n)| (zigzag_decode(v), n))
}

#[inline]
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_values_use_expected_widths() {
        let cases: [(u64, usize); 5] = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (u64::MAX, MAX_VARINT_LEN),
        ];
        for (v, width) in cases {
            let mut buf = Vec::new();
            put_uvarint(&mut buf, v);
            assert_eq!(buf.len(), width, "width of {v}");
            assert_eq!(read_uvarint(&buf), Some((v, width)));
        }
    }

    #[test]
    fn zigzag_keeps_small_negatives_small() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MIN)), i64::MIN);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MAX)), i64::MAX);
    }

    #[test]
    fn truncated_and_overlong_inputs_are_rejected() {
        assert_eq!(read_uvarint(&[0x80, 0x80]), None);
        assert_eq!(read_uvarint(&[]), None);
        // 第 10 字节只允许 0/1
        let overlong = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        assert_eq!(read_uvarint(&overlong), None);
    }
}
