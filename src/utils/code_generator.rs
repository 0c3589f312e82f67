use rand::Rng;
use std::collections::HashSet;

/// 生成兑换码用的受限字母表: 去掉了易混淆字符 0/O、1/I/L
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// 生成一个兑换码 (大写字母数字, 不含易混淆字符)
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// 批量生成兑换码, 进程内去重; 存储层唯一约束负责跨批次去重
pub fn generate_code_batch(count: usize, len: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(count);
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let code = generate_code(len);
        if seen.insert(code.clone()) {
            out.push(code);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_length_and_alphabet() {
        let code = generate_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_alphabet_excludes_ambiguous_characters() {
        for c in [b'0', b'O', b'1', b'I', b'L'] {
            assert!(!CODE_ALPHABET.contains(&c));
        }
    }

    #[test]
    fn test_batch_codes_are_unique_in_process() {
        let codes = generate_code_batch(500, 8);
        assert_eq!(codes.len(), 500);
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 500);
    }
}
