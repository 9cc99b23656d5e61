use subtle::ConstantTimeEq;

/// 常量时间比较设备密钥；任一为空视为不匹配。
pub fn verify_device_secret(expected: &str, presented: &str) -> bool {
    if expected.is_empty() || presented.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
