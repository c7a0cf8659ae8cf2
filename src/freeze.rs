//! パッドのセーブステート（freeze）形式
//!
//! 固定長・リトルエンディアン:
//!
//! ```text
//! offset   0  [u8; 8]   "LinPad" (NUL埋め)
//! offset   8  u32       version = (revision << 8) | build
//! offset  12  QueryInfo 48 bytes
//!             port, slot, last_byte, current_command, num_bytes, query_done,
//!             response[42]
//! offset  60  PadFreezeData[2][4]  24 bytes each
//!             mode, mode_lock, config, vibrate[8], umask[3],
//!             vibrate_index[2], current_vibrate[2], next_vibrate[2],
//!             analog[4] (lx, ly, rx, ry)
//! offset 252  [u8; 2]   ポートごとのアクティブスロット
//! size   254
//! ```
//!
//! バージョンが違うものは読み込まない（移行はしない）。

use thiserror::Error;

use crate::protocol::{PadMode, PadState, QueryInfo, RESPONSE_LEN};

/// 形式タグ
pub const FREEZE_FORMAT: [u8; 8] = *b"LinPad\0\0";

const REVISION: u32 = 3;
const BUILD: u32 = 0;

/// 現在の形式バージョン
pub const PAD_SAVE_STATE_VERSION: u32 = (REVISION << 8) | BUILD;

pub const PORTS: usize = 2;
pub const SLOTS: usize = 4;

pub const QUERY_INFO_SIZE: usize = 6 + RESPONSE_LEN;
pub const PAD_FREEZE_DATA_SIZE: usize = 24;

pub const FORMAT_OFFSET: usize = 0;
pub const VERSION_OFFSET: usize = 8;
pub const QUERY_OFFSET: usize = 12;
pub const PADS_OFFSET: usize = QUERY_OFFSET + QUERY_INFO_SIZE;
pub const SLOTS_OFFSET: usize = PADS_OFFSET + PORTS * SLOTS * PAD_FREEZE_DATA_SIZE;

/// freezeブロック全体のサイズ
pub const FREEZE_SIZE: usize = SLOTS_OFFSET + PORTS;

/// ポート・スロットのPadFreezeDataの位置
pub const fn pad_offset(port: usize, slot: usize) -> usize {
    PADS_OFFSET + (port * SLOTS + slot) * PAD_FREEZE_DATA_SIZE
}

/// 要求された操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeAction {
    /// サイズ問い合わせ
    Size,
    /// 現在の状態 → バッファ
    Save,
    /// バッファ → 現在の状態
    Load,
}

impl TryFrom<u32> for FreezeAction {
    type Error = FreezeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FreezeAction::Load),
            1 => Ok(FreezeAction::Save),
            2 => Ok(FreezeAction::Size),
            other => Err(FreezeError::InvalidAction(other)),
        }
    }
}

/// freeze失敗の理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FreezeError {
    #[error("invalid freeze action {0}")]
    InvalidAction(u32),
    #[error("freeze buffer is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("unrecognized freeze format tag {0:02X?}")]
    BadFormat([u8; 8]),
    #[error("freeze version {found:#06x} does not match {expected:#06x}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("freeze data truncated")]
    Truncated,
}

/// 保存されたモードバイト
///
/// 読み込み時に未知の値を明示的に扱うため、`PadMode` とは別に持つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrozenMode {
    Known(PadMode),
    Unknown(u8),
}

impl FrozenMode {
    pub fn decode(raw: u8) -> Self {
        match PadMode::from_id(raw) {
            Some(mode) => FrozenMode::Known(mode),
            None => FrozenMode::Unknown(raw),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            FrozenMode::Known(mode) => mode.id(),
            FrozenMode::Unknown(raw) => raw,
        }
    }
}

/// 1ポート・1スロット分のスナップショット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadFreezeData {
    pub mode: FrozenMode,
    pub mode_lock: u8,
    pub config: u8,
    pub vibrate: [u8; 8],
    pub umask: [u8; 3],
    pub vibrate_index: [u8; 2],
    pub current_vibrate: [u8; 2],
    pub next_vibrate: [u8; 2],
    pub analog: [u8; 4],
}

impl From<&PadState> for PadFreezeData {
    fn from(pad: &PadState) -> Self {
        PadFreezeData {
            mode: FrozenMode::Known(pad.mode),
            mode_lock: pad.mode_lock,
            config: pad.config,
            vibrate: pad.vibrate,
            umask: pad.umask,
            vibrate_index: pad.vibrate_index,
            current_vibrate: pad.current_vibrate,
            next_vibrate: pad.next_vibrate,
            analog: pad.analog,
        }
    }
}

impl PadFreezeData {
    /// 既知のモードならパッド状態に変換
    pub fn to_pad_state(&self) -> Option<PadState> {
        let FrozenMode::Known(mode) = self.mode else {
            return None;
        };
        Some(PadState {
            mode,
            mode_lock: self.mode_lock,
            config: self.config,
            vibrate: self.vibrate,
            umask: self.umask,
            vibrate_index: self.vibrate_index,
            current_vibrate: self.current_vibrate,
            next_vibrate: self.next_vibrate,
            analog: self.analog,
        })
    }
}

/// freezeブロック全体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadFullFreezeData {
    pub format: [u8; 8],
    pub version: u32,
    pub query: QueryInfo,
    pub pads: [[PadFreezeData; SLOTS]; PORTS],
    pub slots: [u8; PORTS],
}

impl PadFullFreezeData {
    /// 現在の状態からスナップショットを作る
    pub fn capture(query: &QueryInfo, pads: &[[PadState; SLOTS]; PORTS], slots: &[u8; PORTS]) -> Self {
        PadFullFreezeData {
            format: FREEZE_FORMAT,
            version: PAD_SAVE_STATE_VERSION,
            query: query.clone(),
            pads: std::array::from_fn(|port| std::array::from_fn(|slot| PadFreezeData::from(&pads[port][slot]))),
            slots: *slots,
        }
    }

    /// バッファに書き込む（サイズが合わなければ何もしない）
    pub fn encode_into(&self, buffer: &mut [u8]) -> Result<(), FreezeError> {
        check_size(buffer.len())?;
        let mut w = StateWriter::new(buffer);
        w.write_bytes(&self.format);
        w.write_u32(self.version);
        write_query(&mut w, &self.query);
        for port in &self.pads {
            for pad in port {
                write_pad(&mut w, pad);
            }
        }
        w.write_bytes(&self.slots);
        Ok(())
    }

    /// バッファから読み出す（形式タグとバージョンを検証）
    pub fn decode(buffer: &[u8]) -> Result<Self, FreezeError> {
        check_size(buffer.len())?;
        let mut r = StateReader::new(buffer);
        let format: [u8; 8] = r.read_array()?;
        if format != FREEZE_FORMAT {
            return Err(FreezeError::BadFormat(format));
        }
        let version = r.read_u32()?;
        if version != PAD_SAVE_STATE_VERSION {
            return Err(FreezeError::VersionMismatch {
                expected: PAD_SAVE_STATE_VERSION,
                found: version,
            });
        }
        let query = read_query(&mut r)?;
        let mut pads: Vec<PadFreezeData> = Vec::with_capacity(PORTS * SLOTS);
        for _ in 0..PORTS * SLOTS {
            pads.push(read_pad(&mut r)?);
        }
        let slots: [u8; PORTS] = r.read_array()?;
        Ok(PadFullFreezeData {
            format,
            version,
            query,
            pads: std::array::from_fn(|port| std::array::from_fn(|slot| pads[port * SLOTS + slot].clone())),
            slots,
        })
    }
}

fn check_size(actual: usize) -> Result<(), FreezeError> {
    if actual != FREEZE_SIZE {
        return Err(FreezeError::SizeMismatch {
            expected: FREEZE_SIZE,
            actual,
        });
    }
    Ok(())
}

fn write_query(w: &mut StateWriter, query: &QueryInfo) {
    w.write_u8(query.port);
    w.write_u8(query.slot);
    w.write_u8(query.last_byte);
    w.write_u8(query.current_command);
    w.write_u8(query.num_bytes);
    w.write_u8(query.query_done);
    w.write_bytes(&query.response);
}

fn read_query(r: &mut StateReader) -> Result<QueryInfo, FreezeError> {
    Ok(QueryInfo {
        port: r.read_u8()?,
        slot: r.read_u8()?,
        last_byte: r.read_u8()?,
        current_command: r.read_u8()?,
        num_bytes: r.read_u8()?,
        query_done: r.read_u8()?,
        response: r.read_array()?,
    })
}

fn write_pad(w: &mut StateWriter, pad: &PadFreezeData) {
    w.write_u8(pad.mode.raw());
    w.write_u8(pad.mode_lock);
    w.write_u8(pad.config);
    w.write_bytes(&pad.vibrate);
    w.write_bytes(&pad.umask);
    w.write_bytes(&pad.vibrate_index);
    w.write_bytes(&pad.current_vibrate);
    w.write_bytes(&pad.next_vibrate);
    w.write_bytes(&pad.analog);
}

fn read_pad(r: &mut StateReader) -> Result<PadFreezeData, FreezeError> {
    Ok(PadFreezeData {
        mode: FrozenMode::decode(r.read_u8()?),
        mode_lock: r.read_u8()?,
        config: r.read_u8()?,
        vibrate: r.read_array()?,
        umask: r.read_array()?,
        vibrate_index: r.read_array()?,
        current_vibrate: r.read_array()?,
        next_vibrate: r.read_array()?,
        analog: r.read_array()?,
    })
}

// ─── Binary Writer / Reader ───────────────────────────────────

/// 固定長バッファへの書き込みカーソル
///
/// 呼び出し側でサイズを検証済みなので、はみ出した分は捨てる。
struct StateWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> StateWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        buf.fill(0);
        Self { buf, pos: 0 }
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_bytes(&mut self, data: &[u8]) {
        let end = (self.pos + data.len()).min(self.buf.len());
        let len = end.saturating_sub(self.pos);
        self.buf[self.pos..end].copy_from_slice(&data[..len]);
        self.pos = end;
    }
}

struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FreezeError> {
        let end = self.pos.checked_add(len).ok_or(FreezeError::Truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or(FreezeError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, FreezeError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, FreezeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FreezeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }
}
