//! 设备上行二进制帧。
//!
//! 布局（大端）：
//!
//! | 偏移 | 长度 | 字段 |
//! |---|---|---|
//! | 0 | 4 | 魔数 `MJPG` |
//! | 4 | 8 | 采集时间戳（epoch ms） |
//! | 12 | 2 | 宽 |
//! | 14 | 2 | 高 |
//! | 16 | .. | 载荷（JPEG） |
//!
//! 服务端转发时不解析帧内容，这里只提供编码与校验。

pub const FRAME_HEADER_LEN: usize = 16;
pub const MJPEG_MAGIC: [u8; 4] = *b"MJPG";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("unknown frame magic")]
    BadMagic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub captured_at_ms: u64,
    pub width: u16,
    pub height: u16,
}

impl FrameHeader {
    /// 解析帧头，返回帧头与载荷切片。
    pub fn parse(frame: &[u8]) -> Result<(Self, &[u8]), FrameError> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(FrameError::TooShort(frame.len()));
        }
        if frame[0..4] != MJPEG_MAGIC {
            return Err(FrameError::BadMagic);
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&frame[4..12]);
        let header = Self {
            captured_at_ms: u64::from_be_bytes(ts),
            width: u16::from_be_bytes([frame[12], frame[13]]),
            height: u16::from_be_bytes([frame[14], frame[15]]),
        };
        Ok((header, &frame[FRAME_HEADER_LEN..]))
    }

    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        out.extend_from_slice(&MJPEG_MAGIC);
        out.extend_from_slice(&self.captured_at_ms.to_be_bytes());
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}

/// 长度是否足以容纳帧头。
pub fn has_header(frame: &[u8]) -> bool {
    frame.len() >= FRAME_HEADER_LEN
}
